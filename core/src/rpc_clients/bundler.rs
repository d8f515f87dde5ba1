use alloy::primitives::{Address, B256, U256};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{PackedUserOperation, UserOperationReceipt};
use alloy::transports::{IntoBoxTransport, TransportResult};
use serde::{Deserialize, Serialize};

/// A JSON-RPC client for an ERC-4337 bundler
#[derive(Debug, Clone)]
pub struct BundlerClient {
    inner: RpcClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseropGasEstimation {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(default, alias = "paymasterVerificationGas")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, alias = "paymasterPostOpGas")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceTier {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Fee tiers reported by `pimlico_getUserOperationGasPrice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserOpGasPrice {
    pub slow: GasPriceTier,
    pub standard: GasPriceTier,
    pub fast: GasPriceTier,
}

impl BundlerClient {
    /// Create a new bundler client with the given transport
    pub fn new(transport: impl IntoBoxTransport) -> Self {
        let client = RpcClient::builder().transport(transport, false);

        Self { inner: client }
    }

    pub fn from_rpc_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    /// Get a user operation receipt by hash
    pub async fn get_user_op_receipt(
        &self,
        user_op_hash: B256,
    ) -> TransportResult<Option<UserOperationReceipt>> {
        self.inner
            .request("eth_getUserOperationReceipt", [user_op_hash])
            .await
    }

    pub async fn get_user_op_gas_price(&self) -> TransportResult<UserOpGasPrice> {
        self.inner
            .request_noparams("pimlico_getUserOperationGasPrice")
            .await
    }

    /// Estimate the gas for a user operation
    pub async fn estimate_user_op_gas(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<UseropGasEstimation> {
        self.inner
            .request(
                "eth_estimateUserOperationGas",
                (user_op.clone(), entrypoint),
            )
            .await
    }

    pub async fn send_user_op(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<B256> {
        self.inner
            .request("eth_sendUserOperation", (user_op.clone(), entrypoint))
            .await
    }
}

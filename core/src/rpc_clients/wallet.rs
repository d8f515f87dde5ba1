use alloy::primitives::{Address, Bytes, U64, U256};
use alloy::rpc::client::RpcClient;
use alloy::transports::{IntoBoxTransport, RpcError, TransportErrorKind, TransportResult};

use crate::calls::{Capabilities, CallsStatus, SendCallsRequest, SendCallsResponse};
use crate::error::{AlloyRpcErrorToFlowError, FlowError};

/// EIP-1193 "method not supported" provider error code.
pub const UNSUPPORTED_METHOD_CODE: i64 = 4200;
/// EIP-1193 "user rejected request" provider error code.
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC client for a wallet's EIP-1193 endpoint.
#[derive(Debug, Clone)]
pub struct WalletClient {
    inner: RpcClient,
}

impl WalletClient {
    pub fn new(transport: impl IntoBoxTransport) -> Self {
        let client = RpcClient::builder().transport(transport, false);

        Self { inner: client }
    }

    pub fn from_rpc_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    /// Prompts the user for account access.
    pub async fn request_accounts(&self) -> TransportResult<Vec<Address>> {
        self.inner.request_noparams("eth_requestAccounts").await
    }

    /// Accounts already authorized for this origin, without prompting.
    pub async fn accounts(&self) -> TransportResult<Vec<Address>> {
        self.inner.request_noparams("eth_accounts").await
    }

    pub async fn chain_id(&self) -> TransportResult<u64> {
        let chain_id: U64 = self.inner.request_noparams("eth_chainId").await?;
        Ok(chain_id.to::<u64>())
    }

    pub async fn get_balance(&self, address: Address) -> TransportResult<U256> {
        self.inner
            .request("eth_getBalance", (address, "latest"))
            .await
    }

    pub async fn get_code(&self, address: Address) -> TransportResult<Bytes> {
        self.inner.request("eth_getCode", (address, "latest")).await
    }

    pub async fn get_capabilities(
        &self,
        address: Address,
        chain_ids: Vec<U64>,
    ) -> TransportResult<Capabilities> {
        self.inner
            .request("wallet_getCapabilities", (address, chain_ids))
            .await
    }

    /// Submits a batch and returns the wallet's opaque batch id.
    pub async fn send_calls(&self, request: &SendCallsRequest) -> TransportResult<String> {
        let response: SendCallsResponse = self
            .inner
            .request("wallet_sendCalls", [request.clone()])
            .await?;

        Ok(response.into_id())
    }

    pub async fn get_calls_status(&self, batch_id: &str) -> TransportResult<CallsStatus> {
        self.inner
            .request("wallet_getCallsStatus", [batch_id.to_string()])
            .await
    }
}

/// Wallet failures the user can act on, as opposed to plain transport noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletRpcError {
    UnsupportedMethod { message: String },
    AccountUpgradeRequired { message: String },
    UserRejected { message: String },
    Other { code: Option<i64>, message: String },
}

/// Maps wallet JSON-RPC errors onto [`WalletRpcError`] by code and message.
pub struct WalletErrorClassifier;

impl WalletErrorClassifier {
    pub fn classify(error: &RpcError<TransportErrorKind>) -> WalletRpcError {
        match error {
            RpcError::ErrorResp(payload) => Self::classify_payload(payload.code, &payload.message),
            other => WalletRpcError::Other {
                code: None,
                message: other.to_string(),
            },
        }
    }

    fn classify_payload(code: i64, message: &str) -> WalletRpcError {
        let msg_lower = message.to_lowercase();

        if code == UNSUPPORTED_METHOD_CODE || msg_lower.contains("unsupported method") {
            WalletRpcError::UnsupportedMethod {
                message: message.to_string(),
            }
        } else if msg_lower.contains("account upgrade required") {
            WalletRpcError::AccountUpgradeRequired {
                message: message.to_string(),
            }
        } else if code == USER_REJECTED_CODE {
            WalletRpcError::UserRejected {
                message: message.to_string(),
            }
        } else {
            WalletRpcError::Other {
                code: Some(code),
                message: message.to_string(),
            }
        }
    }

    /// Error for a failed `wallet_sendCalls`.
    pub fn submission_error(error: &RpcError<TransportErrorKind>) -> FlowError {
        match Self::classify(error) {
            WalletRpcError::UnsupportedMethod { message } => FlowError::UnsupportedMethod {
                method: "wallet_sendCalls".to_string(),
                message,
            },
            WalletRpcError::AccountUpgradeRequired { message } => {
                FlowError::AccountUpgradeRequired { message }
            }
            WalletRpcError::UserRejected { message } | WalletRpcError::Other { message, .. } => {
                FlowError::SubmissionFailed { message }
            }
        }
    }

    /// Error for a failed read-only wallet method; only "unsupported" gets its own variant.
    pub fn query_error(error: &RpcError<TransportErrorKind>, method: &str) -> FlowError {
        match Self::classify(error) {
            WalletRpcError::UnsupportedMethod { message } => FlowError::UnsupportedMethod {
                method: method.to_string(),
                message,
            },
            _ => error.to_flow_wallet_error(method),
        }
    }
}

use alloy::primitives::{Address, U64};
use batchwire_core::{
    calls::Capabilities,
    error::{AlloyRpcErrorToFlowError, FlowError},
    rpc_clients::{WalletClient, WalletErrorClassifier},
};

use crate::delegation::DelegationStatus;

/// Asks the connected wallet what it can do on a chain.
#[derive(Debug, Clone)]
pub struct CapabilityProber {
    client: WalletClient,
}

impl CapabilityProber {
    pub fn new(client: WalletClient) -> Self {
        Self { client }
    }

    /// `wallet_getCapabilities` for one account and chain.
    ///
    /// Wallets without EIP-5792 fail with `UnsupportedMethod`.
    #[tracing::instrument(skip(self))]
    pub async fn probe(&self, address: Address, chain_id: u64) -> Result<Capabilities, FlowError> {
        let capabilities = self
            .client
            .get_capabilities(address, vec![U64::from(chain_id)])
            .await
            .map_err(|e| WalletErrorClassifier::query_error(&e, "wallet_getCapabilities"))?;

        tracing::debug!(
            supports_atomic = capabilities.supports_atomic(chain_id),
            chains = capabilities.chains().count(),
            "capabilities probed"
        );
        Ok(capabilities)
    }

    /// EIP-7702 state of the account, used to explain "account upgrade required".
    pub async fn delegation(&self, address: Address) -> Result<DelegationStatus, FlowError> {
        let code = self
            .client
            .get_code(address)
            .await
            .map_err(|e| e.to_flow_wallet_error("eth_getCode"))?;

        Ok(DelegationStatus::from_code(&code))
    }
}

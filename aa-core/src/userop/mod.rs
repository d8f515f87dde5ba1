use alloy::{
    primitives::{Address, U256, aliases::U192},
    sol,
};
use batchwire_core::{
    chain::Chain,
    error::{ContractErrorToFlowError, FlowError},
};

pub mod builder;

pub use builder::{FeeTier, PaymasterFields, UserOpBuilder, UserOpBuilderConfig};

sol! {
    #[sol(rpc)]
    contract EntryPointNonces {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// Next entrypoint nonce of `sender` on the default key.
pub async fn fetch_nonce(
    chain: &impl Chain,
    entrypoint: Address,
    sender: Address,
) -> Result<U256, FlowError> {
    EntryPointNonces::new(entrypoint, chain.provider().clone())
        .getNonce(sender, U192::ZERO)
        .call()
        .await
        .map_err(|e| e.to_flow_error(chain.chain_id(), Some(entrypoint)))
}

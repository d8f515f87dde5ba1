use alloy::{
    primitives::{Address, B256, U256},
    sol,
    sol_types::{Eip712Domain, SolStruct, eip712_domain},
};
use batchwire_core::{
    chain::Chain,
    error::{ContractErrorToFlowError, FlowError},
};

sol! {
    #[sol(rpc)]
    contract Eip2612Token {
        function name() external view returns (string);
        function version() external view returns (string);
        function nonces(address owner) external view returns (uint256);
    }
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// An EIP-2612 permit together with the token's signing domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitData {
    pub domain: Eip712Domain,
    pub message: Permit,
}

impl PermitData {
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }
}

/// Reads the token's domain and nonce and builds a permit for `spender`.
///
/// The deadline is `U256::MAX`: the paymaster validates during the ERC-4337
/// validation phase, where block time is not readable.
pub async fn eip2612_permit(
    chain: &impl Chain,
    token: Address,
    owner: Address,
    spender: Address,
    value: U256,
) -> Result<PermitData, FlowError> {
    let contract = Eip2612Token::new(token, chain.provider().clone());
    let to_error = |e: alloy::contract::Error| e.to_flow_error(chain.chain_id(), Some(token));

    let name = contract.name().call().await.map_err(to_error)?;
    let version = contract.version().call().await.map_err(to_error)?;
    let nonce = contract.nonces(owner).call().await.map_err(to_error)?;

    Ok(PermitData {
        domain: eip712_domain! {
            name: name,
            version: version,
            chain_id: chain.chain_id(),
            verifying_contract: token,
        },
        message: Permit {
            owner,
            spender,
            value,
            nonce,
            deadline: U256::MAX,
        },
    })
}

//! Counterfactual addresses for accounts deployed as EIP-1167 clones.
//!
//! With a known clone target the address is pure CREATE2 arithmetic. Otherwise
//! the factory is asked over `eth_call`.

use alloy::{
    primitives::{Address, B256, Bytes, hex, keccak256},
    sol,
    sol_types::{SolCall, SolValue},
};
use batchwire_core::{
    chain::Chain,
    constants::{DEFAULT_FACTORY_ADDRESS_V0_7, DEFAULT_IMPLEMENTATION_ADDRESS_V0_7},
    error::{ContractErrorToFlowError, FlowError},
};

sol! {
    #[sol(rpc)]
    contract AccountFactory {
        function createAccount(address admin, bytes salt) returns (address);
        function getAddress(address _adminSigner, bytes _data) view returns (address);
        function accountImplementation() view returns (address);
    }
}

const CLONE_PREFIX: [u8; 20] = hex!("3d602d80600a3d3981f3363d3d373d3d3d363d73");
const CLONE_SUFFIX: [u8; 15] = hex!("5af43d82803e903d91602b57fd5bf3");

/// Which factory deploys smart accounts, and with what salt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorySettings {
    pub factory: Address,
    /// Clone target. When unset it is only known for the default factory.
    pub implementation: Option<Address>,
    pub salt: Bytes,
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            factory: DEFAULT_FACTORY_ADDRESS_V0_7,
            implementation: Some(DEFAULT_IMPLEMENTATION_ADDRESS_V0_7),
            salt: Bytes::new(),
        }
    }
}

/// Where an owner's account lives and what code it will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub address: Address,
    pub implementation: Address,
}

impl FactorySettings {
    /// Settings for `factory`. The default factory keeps its known implementation.
    pub fn for_factory(factory: Address, implementation: Option<Address>) -> Self {
        let implementation = implementation.or(
            (factory == DEFAULT_FACTORY_ADDRESS_V0_7).then_some(DEFAULT_IMPLEMENTATION_ADDRESS_V0_7),
        );
        Self {
            factory,
            implementation,
            salt: Bytes::new(),
        }
    }

    pub fn with_salt(mut self, salt: Bytes) -> Self {
        self.salt = salt;
        self
    }

    /// Calldata the entrypoint forwards to the factory to deploy `owner`'s account.
    pub fn init_calldata(&self, owner: Address) -> Bytes {
        AccountFactory::createAccountCall {
            admin: owner,
            salt: self.salt.clone(),
        }
        .abi_encode()
        .into()
    }

    /// Local prediction, or `None` when the clone target must be read from the factory.
    pub fn predict(&self, owner: Address) -> Option<ResolvedAccount> {
        self.implementation.map(|implementation| ResolvedAccount {
            address: clone_address(self.factory, implementation, account_salt(owner, &self.salt)),
            implementation,
        })
    }

    pub async fn resolve<C: Chain>(
        &self,
        chain: &C,
        owner: Address,
    ) -> Result<ResolvedAccount, FlowError> {
        if let Some(resolved) = self.predict(owner) {
            return Ok(resolved);
        }

        let contract = AccountFactory::new(self.factory, chain.provider().clone());
        let to_error =
            |e: alloy::contract::Error| e.to_flow_error(chain.chain_id(), Some(self.factory));

        let address = contract
            .getAddress(owner, self.salt.clone())
            .call()
            .await
            .map_err(to_error)?;
        let implementation = contract
            .accountImplementation()
            .call()
            .await
            .map_err(to_error)?;

        tracing::debug!(factory = %self.factory, %implementation, "factory queried for account");

        Ok(ResolvedAccount {
            address,
            implementation,
        })
    }
}

/// CREATE2 salt the factory derives from the owner and the caller's salt bytes.
pub fn account_salt(owner: Address, salt: &Bytes) -> B256 {
    keccak256((owner, salt).abi_encode_params())
}

/// CREATE2 address of a minimal proxy to `implementation` deployed by `factory`.
pub fn clone_address(factory: Address, implementation: Address, salt: B256) -> Address {
    let init_code = [
        CLONE_PREFIX.as_slice(),
        implementation.as_slice(),
        CLONE_SUFFIX.as_slice(),
    ]
    .concat();

    factory.create2(salt, keccak256(&init_code))
}

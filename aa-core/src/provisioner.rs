use std::{fmt, sync::Arc};

use alloy::{
    primitives::{Address, B256, Bytes},
    signers::local::PrivateKeySigner,
};
use batchwire_core::{chain::Chain, error::FlowError};

use crate::{
    factory::FactorySettings,
    signer::{OwnerSigner, SmartAccountSigner, SmartAccountSignerBuilder},
    smart_account::SmartAccountHandle,
};

const MAX_KEY_ATTEMPTS: usize = 8;

/// A freshly generated owner key. The key itself is never formatted.
#[derive(Clone)]
pub struct DerivedAccount {
    pub signer: PrivateKeySigner,
    pub address: Address,
}

impl fmt::Debug for DerivedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAccount")
            .field("signer", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

impl DerivedAccount {
    pub fn owner_signer(&self) -> OwnerSigner {
        Arc::new(self.signer.clone())
    }
}

/// Generates a random secp256k1 owner key.
pub fn derive_account() -> Result<DerivedAccount, FlowError> {
    for _ in 0..MAX_KEY_ATTEMPTS {
        let bytes: [u8; 32] = rand::random();
        // Zero and values above the curve order are not valid scalars.
        if let Ok(signer) = PrivateKeySigner::from_bytes(&B256::from(bytes)) {
            let address = signer.address();
            tracing::info!(%address, "generated owner key");
            return Ok(DerivedAccount { signer, address });
        }
    }

    Err(FlowError::SigningError {
        message: "Could not generate a valid private key".to_string(),
    })
}

/// Binds owner keys to counterfactual smart accounts of one factory.
#[derive(Clone)]
pub struct Provisioner<C: Chain> {
    chain: C,
    settings: FactorySettings,
}

impl<C: Chain + Clone> Provisioner<C> {
    pub fn new(chain: C) -> Self {
        Self {
            chain,
            settings: FactorySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FactorySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Targets another factory, keeping the salt. Without `implementation` the factory is queried.
    pub fn with_factory(mut self, factory: Address, implementation: Option<Address>) -> Self {
        let salt = std::mem::take(&mut self.settings.salt);
        self.settings = FactorySettings::for_factory(factory, implementation).with_salt(salt);
        self
    }

    pub fn with_salt(mut self, salt: Bytes) -> Self {
        self.settings.salt = salt;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn settings(&self) -> &FactorySettings {
        &self.settings
    }

    /// Computes the smart account `owner` controls; nothing is deployed.
    pub async fn bind_smart_account(&self, owner: Address) -> Result<SmartAccountHandle, FlowError> {
        let resolved = self.settings.resolve(&self.chain, owner).await?;

        tracing::debug!(
            %owner,
            account = %resolved.address,
            factory = %self.settings.factory,
            "smart account bound"
        );

        Ok(SmartAccountHandle {
            address: resolved.address,
            owner,
            factory_address: self.settings.factory,
            implementation_address: resolved.implementation,
            salt_data: self.settings.salt.clone(),
            init_calldata: self.settings.init_calldata(owner),
        })
    }

    /// Binds the account of a caller-supplied owner and returns its signer.
    pub async fn with_owner(&self, owner: OwnerSigner) -> Result<SmartAccountSigner<C>, FlowError> {
        let account = self.bind_smart_account(owner.address()).await?;
        SmartAccountSignerBuilder::new(owner, account, self.chain.clone())
            .build()
            .await
    }

    /// Generates a throwaway owner key and binds its account.
    pub async fn provision_generated(
        &self,
    ) -> Result<(DerivedAccount, SmartAccountSigner<C>), FlowError> {
        let derived = derive_account()?;
        let signer = self.with_owner(derived.owner_signer()).await?;
        Ok((derived, signer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{hex, primitives::bytes, sol_types::SolValue};
    use serde_json::json;
    use batchwire_core::{
        chain::NodeChain,
        constants::{DEFAULT_FACTORY_ADDRESS_V0_7, DEFAULT_IMPLEMENTATION_ADDRESS_V0_7},
        rpc_clients::mock::ScriptedTransport,
    };

    fn chain(transport: &ScriptedTransport) -> NodeChain {
        NodeChain::from_parts(
            84532,
            "http://node.invalid".parse().unwrap(),
            "http://bundler.invalid".parse().unwrap(),
            transport.provider(),
            transport.bundler_client(),
        )
    }

    #[test]
    fn derived_account_debug_hides_key() {
        let derived = derive_account().unwrap();
        let rendered = format!("{derived:?}");

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&alloy::hex::encode(derived.signer.to_bytes())));
        assert_eq!(derived.signer.address(), derived.address);
    }

    #[test]
    fn derived_keys_differ() {
        assert_ne!(
            derive_account().unwrap().address,
            derive_account().unwrap().address
        );
    }

    #[tokio::test]
    async fn default_factory_binds_without_node_calls() {
        let transport = ScriptedTransport::new();
        let provisioner = Provisioner::new(chain(&transport));
        let owner = Address::repeat_byte(0x22);

        let account = provisioner.bind_smart_account(owner).await.unwrap();

        assert_eq!(account.owner, owner);
        assert_eq!(account.factory_address, DEFAULT_FACTORY_ADDRESS_V0_7);
        assert_eq!(account.implementation_address, DEFAULT_IMPLEMENTATION_ADDRESS_V0_7);
        assert_eq!(
            Some(account.address),
            FactorySettings::default().predict(owner).map(|r| r.address)
        );
        assert!(!account.init_calldata.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn configured_factory_is_queried_for_account() {
        let transport = ScriptedTransport::new();
        let factory = Address::repeat_byte(0x0f);
        let predicted = Address::repeat_byte(0xac);
        let implementation = Address::repeat_byte(0x1e);
        transport.push_success("eth_call", hex::encode_prefixed(predicted.abi_encode()));
        transport.push_success("eth_call", hex::encode_prefixed(implementation.abi_encode()));

        let provisioner = Provisioner::new(chain(&transport))
            .with_salt(bytes!("0x0102"))
            .with_factory(factory, None);
        let owner = Address::repeat_byte(0x22);
        let account = provisioner.bind_smart_account(owner).await.unwrap();

        assert_eq!(account.address, predicted);
        assert_eq!(account.factory_address, factory);
        assert_eq!(account.implementation_address, implementation);
        assert_eq!(account.salt_data, bytes!("0x0102"));
        assert_eq!(
            account.init_calldata,
            FactorySettings::for_factory(factory, None)
                .with_salt(bytes!("0x0102"))
                .init_calldata(owner)
        );

        let calls = transport.calls_to("eth_call");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].params[0]["to"], json!(factory));
    }

    #[tokio::test]
    async fn configured_factory_with_implementation_binds_locally() {
        let transport = ScriptedTransport::new();
        let factory = Address::repeat_byte(0x0f);
        let implementation = Address::repeat_byte(0x1e);
        let settings = FactorySettings::for_factory(factory, Some(implementation))
            .with_salt(bytes!("0x0102"));

        let provisioner = Provisioner::new(chain(&transport)).with_settings(settings.clone());
        let owner = Address::repeat_byte(0x22);
        let account = provisioner.bind_smart_account(owner).await.unwrap();

        assert_eq!(account.factory_address, factory);
        assert_eq!(account.implementation_address, implementation);
        assert_eq!(Some(account.address), settings.predict(owner).map(|r| r.address));
        assert_ne!(
            Some(account.address),
            FactorySettings::default().predict(owner).map(|r| r.address)
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn factory_revert_fails_binding() {
        let transport = ScriptedTransport::new();
        transport.push_error("eth_call", 3, "execution reverted");

        let provisioner =
            Provisioner::new(chain(&transport)).with_factory(Address::repeat_byte(0x0f), None);
        let result = provisioner.bind_smart_account(Address::repeat_byte(0x22)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn owner_mismatch_is_rejected_by_signer() {
        let transport = ScriptedTransport::new();
        let provisioner = Provisioner::new(chain(&transport));
        let owner = derive_account().unwrap();
        let mut account = provisioner.bind_smart_account(owner.address).await.unwrap();
        account.owner = Address::repeat_byte(0x01);

        let result = SmartAccountSignerBuilder::new(owner.owner_signer(), account, provisioner.chain().clone())
            .build()
            .await;
        assert!(matches!(result, Err(FlowError::ValidationError { .. })));
    }
}

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256, Bytes, hex},
    signers::Signer,
    sol,
    sol_types::{Eip712Domain, SolStruct, SolValue, eip712_domain},
};
use batchwire_core::{chain::Chain, error::FlowError};

use crate::smart_account::{SmartAccount, SmartAccountHandle};

/// The EOA key that owns a smart account.
pub type OwnerSigner = Arc<dyn Signer + Send + Sync>;

sol! {
    #[sol(rpc)]
    contract AccountImplementationContract {
        function getMessageHash(bytes32 _hash) external view returns (bytes32);
    }
}

sol! {
    struct AccountMessage {
        bytes message;
    }
}

/// ERC-6492 magic suffix
pub const ERC6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// Wraps a signature so verifiers can deploy the account before checking it.
pub fn wrap_erc6492(factory: Address, factory_calldata: Bytes, signature: Bytes) -> Bytes {
    let mut wrapped = (factory, factory_calldata, signature).abi_encode_params();
    wrapped.extend_from_slice(&ERC6492_MAGIC_SUFFIX);
    wrapped.into()
}

/// Returns the inner signature of an ERC-6492 envelope, or the input unchanged.
pub fn unwrap_erc6492(signature: &Bytes) -> Result<Bytes, FlowError> {
    let Some(body) = signature.strip_suffix(&ERC6492_MAGIC_SUFFIX) else {
        return Ok(signature.clone());
    };

    let (_factory, _calldata, inner) = <(Address, Bytes, Bytes)>::abi_decode_params(body)
        .map_err(|e| FlowError::ValidationError {
            message: format!("Malformed ERC-6492 signature: {e}"),
        })?;

    Ok(inner)
}

pub struct SmartAccountSignerBuilder<C: Chain> {
    owner: OwnerSigner,
    account: SmartAccountHandle,
    chain: C,
}

impl<C: Chain + Clone> SmartAccountSignerBuilder<C> {
    pub fn new(owner: OwnerSigner, account: SmartAccountHandle, chain: C) -> Self {
        Self {
            owner,
            account,
            chain,
        }
    }

    /// Detects whether the account implementation expects `AccountMessage` wrapping.
    pub async fn build(self) -> Result<SmartAccountSigner<C>, FlowError> {
        if self.owner.address() != self.account.owner {
            return Err(FlowError::ValidationError {
                message: format!(
                    "Signer {} does not own smart account {}",
                    self.owner.address(),
                    self.account.address
                ),
            });
        }

        let supports_712_factory = self.check_712_factory_support().await;
        tracing::debug!(
            account = %self.account.address,
            supports_712_factory,
            "smart account signer ready"
        );

        Ok(SmartAccountSigner {
            owner: self.owner,
            account: self.account,
            chain: self.chain,
            supports_712_factory,
        })
    }

    async fn check_712_factory_support(&self) -> bool {
        let implementation = AccountImplementationContract::new(
            self.account.implementation_address,
            self.chain.provider().clone(),
        );

        match implementation.getMessageHash(B256::ZERO).call().await {
            Ok(response) => response != B256::ZERO,
            Err(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct SmartAccountSigner<C: Chain> {
    owner: OwnerSigner,
    account: SmartAccountHandle,
    chain: C,
    supports_712_factory: bool,
}

impl<C: Chain + Clone> SmartAccountSigner<C> {
    pub fn account(&self) -> &SmartAccountHandle {
        &self.account
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Owner signature over a user operation hash, EIP-191 prefixed.
    pub async fn sign_user_op_hash(&self, user_op_hash: B256) -> Result<Bytes, FlowError> {
        let signature = self.owner.sign_message(user_op_hash.as_slice()).await?;
        Ok(Bytes::from(signature.as_bytes()))
    }

    /// ERC-1271 signature over an EIP-712 struct, ERC-6492 wrapped while undeployed.
    pub async fn sign_typed<T: SolStruct>(
        &self,
        value: &T,
        domain: &Eip712Domain,
    ) -> Result<Bytes, FlowError> {
        self.sign_typed_hash(value.eip712_signing_hash(domain)).await
    }

    pub async fn sign_typed_hash(&self, hash: B256) -> Result<Bytes, FlowError> {
        let is_deployed = self.account.is_deployed(&self.chain).await?;

        let digest = if self.supports_712_factory {
            self.account_message_hash(hash)
        } else {
            hash
        };
        let signature = Bytes::from(self.owner.sign_hash(&digest).await?.as_bytes());

        if is_deployed {
            Ok(signature)
        } else {
            Ok(wrap_erc6492(
                self.account.factory_address,
                self.account.init_calldata.clone(),
                signature,
            ))
        }
    }

    fn account_message_hash(&self, hash: B256) -> B256 {
        let domain = eip712_domain! {
            name: "Account",
            version: "1",
            chain_id: self.chain.chain_id(),
            verifying_contract: self.account.address,
        };

        AccountMessage {
            message: hash.abi_encode().into(),
        }
        .eip712_signing_hash(&domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, bytes};

    #[test]
    fn erc6492_round_trips_inner_signature() {
        let inner = bytes!("0x11223344");
        let wrapped = wrap_erc6492(
            address!("0x4bE0ddfebcA9A5A4a617dee4DeCe99E7c862dceb"),
            bytes!("0xabcdef"),
            inner.clone(),
        );

        assert!(wrapped.ends_with(&ERC6492_MAGIC_SUFFIX));
        assert_eq!(unwrap_erc6492(&wrapped).unwrap(), inner);
    }

    #[test]
    fn plain_signatures_pass_through() {
        let plain = Bytes::from(vec![7u8; 65]);
        assert_eq!(unwrap_erc6492(&plain).unwrap(), plain);
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        let mut broken = vec![0u8; 10];
        broken.extend_from_slice(&ERC6492_MAGIC_SUFFIX);
        assert!(matches!(
            unwrap_erc6492(&Bytes::from(broken)),
            Err(FlowError::ValidationError { .. })
        ));
    }
}

pub mod factory;
pub mod paymaster;
pub mod provisioner;
pub mod signer;
pub mod smart_account;
pub mod userop;

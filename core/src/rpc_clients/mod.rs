pub mod bundler;
pub mod transport;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use bundler::{BundlerClient, GasPriceTier, UserOpGasPrice, UseropGasEstimation};
pub use wallet::{WalletClient, WalletErrorClassifier, WalletRpcError};

pub mod batch;
pub mod capabilities;
pub mod connection;
pub mod delegation;
pub mod discovery;
pub mod provider;

pub use batch::CallBatchBuilder;
pub use capabilities::CapabilityProber;
pub use connection::{CapabilityRefresh, Connection, ConnectionManager, ConnectionState};
pub use discovery::{ProviderAnnouncer, ProviderDetail, ProviderInfo, ProviderRegistry};
pub use provider::{EventWatcher, ProviderEvent, WalletProvider};

pub mod confirm;
pub mod explorer;
pub mod send;

pub use confirm::{PollConfig, PollHandle, PollOutcome};
pub use explorer::{ChainMetadataSource, HttpChainMetadata, StaticChainMetadata};
pub use send::{BatchHandle, BatchSubmitter};

pub mod calls;
pub mod chain;
pub mod constants;
pub mod error;
pub mod rpc_clients;
pub mod transaction;

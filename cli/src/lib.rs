pub mod commands;
pub mod config;
pub mod render;
pub mod session;

pub use crate::config::{BatchwireConfig, LogFormat};
pub use crate::session::Session;

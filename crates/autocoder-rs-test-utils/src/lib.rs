//! Test helpers shared across autocoder crates.

pub mod config;
pub mod frames;
pub mod transport;

pub use config::fast_config;
pub use transport::{ConnectPlan, ScriptedConnector, ServerEnd};

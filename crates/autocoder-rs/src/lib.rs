//! Public SDK surface for autocoder.
//!
//! This crate re-exports the sync building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

pub mod features;

/// Re-export for convenience.
pub use autocoder_rs_config as config;
/// Re-export for convenience.
pub use autocoder_rs_protocol as protocol;
pub use autocoder_rs_sync as sync;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// Binaries should call this early in startup; it is a no-op without the
/// feature and when a logger is already installed.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}

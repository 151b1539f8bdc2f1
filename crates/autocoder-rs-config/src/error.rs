//! Error types for config loading and validation.

use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a layer from disk failed.
    #[error("failed to read config layer: {0}")]
    Io(#[from] std::io::Error),
    /// A layer is not valid JSON5.
    #[error("failed to parse {layer}: {source}")]
    Parse {
        layer: String,
        #[source]
        source: json5::Error,
    },
    /// Merged layers did not decode into the config model.
    #[error("failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),
    /// A key or value failed schema validation.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// Decoded values violate a cross-field rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

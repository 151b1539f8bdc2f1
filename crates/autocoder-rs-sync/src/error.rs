//! Error types for the sync client.

use crate::connection::ConnectionStatus;
use autocoder_rs_config::ConfigError;
use autocoder_rs_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by sync client operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A command was issued while the transport was not open. Never queued.
    #[error("not connected")]
    NotConnected,
    /// The transport could not be opened.
    #[error("failed to open transport: {0}")]
    TransportOpenFailure(String),
    /// Inbound text did not decode into a frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// Outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
    /// An outgoing message or attachment was rejected before sending.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// The configured server host does not form a valid URL.
    #[error("invalid server address {host}: {source}")]
    InvalidEndpoint {
        host: String,
        #[source]
        source: url::ParseError,
    },
    /// The client was built from a config that fails validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The connection ended up disconnected or failed before `start` could be sent.
    #[error("session start aborted: connection is {0}")]
    StartAborted(ConnectionStatus),
    /// The transport did not open within the start timeout.
    #[error("session start timed out after {0:?}")]
    StartTimedOut(Duration),
    /// The subscription was released and no longer accepts commands.
    #[error("subscription closed")]
    SubscriptionClosed,
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed(message) => SyncError::MalformedFrame(message),
            ProtocolError::Encode(err) => SyncError::Encode(err.to_string()),
        }
    }
}

/// Reasons an outgoing message is rejected without touching the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported attachment type {mime_type} for {filename}")]
    UnsupportedType { filename: String, mime_type: String },
    #[error("attachment {filename} is {size} bytes; the limit is {max_bytes}")]
    TooLarge {
        filename: String,
        size: u64,
        max_bytes: u64,
    },
    #[error("message has neither text nor attachments")]
    EmptyMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_text_maps_to_malformed_frame() {
        let err = autocoder_rs_protocol::decode_server_frame("{not json")
            .map(|_| ())
            .map_err(SyncError::from);
        assert!(matches!(err, Err(SyncError::MalformedFrame(_))));
    }

    #[test]
    fn config_errors_pass_through() {
        let err = SyncError::from(ConfigError::Invalid("log_capacity must be greater than zero".into()));
        assert_eq!(
            err.to_string(),
            "invalid config: log_capacity must be greater than zero"
        );
    }
}

//! Configuration schema for the sync client.

use serde::{Deserialize, Serialize};

/// Default reconnect base delay shared by every channel.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
/// Default reconnect attempts before a channel gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default backoff cap for the project event channel.
pub const DEFAULT_PROJECT_MAX_DELAY_MS: u64 = 30_000;
/// Default backoff cap for the assistant chat channel.
pub const DEFAULT_ASSISTANT_MAX_DELAY_MS: u64 = 10_000;

/// Root config for the sync client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default)]
    pub attachments: AttachmentsConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schema: None,
            server: ServerConfig::default(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            start_timeout_ms: default_start_timeout_ms(),
            channels: ChannelsConfig::default(),
            log_capacity: default_log_capacity(),
            attachments: AttachmentsConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }
}

/// Builder for assembling a `SyncConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    /// Replace the server address settings.
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Set the keepalive ping interval.
    pub fn keepalive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.keepalive_interval_ms = interval_ms;
        self
    }

    /// Set how long `start` waits for the transport to open.
    pub fn start_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.start_timeout_ms = timeout_ms;
        self
    }

    /// Replace the per-channel reconnect settings.
    pub fn channels(mut self, channels: ChannelsConfig) -> Self {
        self.config.channels = channels;
        self
    }

    /// Set the bounded event log capacity.
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.config.log_capacity = capacity;
        self
    }

    /// Replace the attachment validation limits.
    pub fn attachments(mut self, attachments: AttachmentsConfig) -> Self {
        self.config.attachments = attachments;
        self
    }

    /// Finalize and return the built `SyncConfig`.
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

/// Backend address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Use `wss://` (and `https://` for API calls).
    #[serde(default)]
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secure: false,
        }
    }
}

/// Reconnect overrides per channel. Unset fields fall back to channel defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub project: ReconnectOverrides,
    #[serde(default)]
    pub assistant: ReconnectOverrides,
}

impl ChannelsConfig {
    /// Effective reconnect settings for the project event channel.
    pub fn project_settings(&self) -> ReconnectSettings {
        self.project.resolve(DEFAULT_PROJECT_MAX_DELAY_MS)
    }

    /// Effective reconnect settings for the assistant chat channel.
    pub fn assistant_settings(&self) -> ReconnectSettings {
        self.assistant.resolve(DEFAULT_ASSISTANT_MAX_DELAY_MS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ReconnectOverrides {
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ReconnectOverrides {
    fn resolve(&self, default_max_delay_ms: u64) -> ReconnectSettings {
        ReconnectSettings {
            base_delay_ms: self.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS),
            max_delay_ms: self.max_delay_ms.unwrap_or(default_max_delay_ms),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

/// Fully resolved reconnect settings for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

/// Limits applied to outgoing image attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    #[serde(default = "default_max_attachment_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_attachment_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_keepalive_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_start_timeout_ms() -> u64 {
    10_000
}

fn default_log_capacity() -> usize {
    100
}

fn default_max_attachment_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/png".to_string()]
}

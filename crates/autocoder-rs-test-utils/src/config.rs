use autocoder_rs_config::{ServerConfig, SyncConfig};

/// Default config pointed at a fake host, with a short start timeout.
pub fn fast_config() -> SyncConfig {
    SyncConfig::builder()
        .server(ServerConfig {
            host: "test.local:8888".to_string(),
            secure: false,
        })
        .start_timeout_ms(5_000)
        .build()
}

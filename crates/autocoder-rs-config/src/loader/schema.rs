//! Schema validation helpers for JSON5 configuration layers.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
///
/// Every layer is partial, so this only checks the keys that are present.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "server",
            "keepalive_interval_ms",
            "connect_timeout_ms",
            "start_timeout_ms",
            "channels",
            "log_capacity",
            "attachments",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("server") {
        validate_server(value, layer, "server")?;
    }
    for key in [
        "keepalive_interval_ms",
        "connect_timeout_ms",
        "start_timeout_ms",
        "log_capacity",
    ] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, key)?;
        }
    }
    if let Some(value) = map.get("channels") {
        validate_channels(value, layer, "channels")?;
    }
    if let Some(value) = map.get("attachments") {
        validate_attachments(value, layer, "attachments")?;
    }
    Ok(())
}

/// Validate the "server" block.
fn validate_server(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["host", "secure"], layer, path)?;
    if let Some(value) = map.get("host") {
        expect_string(value, layer, &join_path(path, "host"))?;
    }
    if let Some(value) = map.get("secure") {
        expect_bool(value, layer, &join_path(path, "secure"))?;
    }
    Ok(())
}

/// Validate the "channels" block and each channel's reconnect overrides.
fn validate_channels(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["project", "assistant"], layer, path)?;
    for (name, channel) in map {
        let channel_path = join_path(path, name);
        let channel_map = expect_object(channel, layer, &channel_path)?;
        ensure_allowed_keys(
            channel_map,
            &["base_delay_ms", "max_delay_ms", "max_attempts"],
            layer,
            &channel_path,
        )?;
        for (key, value) in channel_map {
            expect_u64(value, layer, &join_path(&channel_path, key))?;
        }
    }
    Ok(())
}

/// Validate the "attachments" block.
fn validate_attachments(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["max_bytes", "allowed_mime_types"], layer, path)?;
    if let Some(value) = map.get("max_bytes") {
        expect_u64(value, layer, &join_path(path, "max_bytes"))?;
    }
    if let Some(value) = map.get("allowed_mime_types") {
        validate_string_array(value, layer, &join_path(path, "allowed_mime_types"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Durations and counts are non-negative integers.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(entries) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    for (idx, entry) in entries.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}

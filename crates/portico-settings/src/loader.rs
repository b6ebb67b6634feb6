//! Settings loading: file discovery, deep merge, env overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::PorticoSettings;

/// Resolve the settings file path.
///
/// `PORTICO_SETTINGS` wins when set; otherwise `portico.json` in the
/// working directory.
pub fn settings_path() -> PathBuf {
    std::env::var("PORTICO_SETTINGS")
        .map_or_else(|_| PathBuf::from("portico.json"), PathBuf::from)
}

/// Load settings from the default path with env overrides applied.
///
/// A missing file is not an error — defaults plus env overrides are
/// returned. A present-but-broken file is an error, so a typo in
/// production config fails loudly instead of silently reverting.
pub fn load_settings() -> Result<PorticoSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file path with env overrides applied.
pub fn load_settings_from_path(path: &Path) -> Result<PorticoSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate();
    Ok(settings)
}

/// Defaults deep-merged with the settings file, before env overrides.
fn read_file_layer(path: &Path) -> Result<PorticoSettings> {
    let defaults = serde_json::to_value(PorticoSettings::default())
        .expect("default settings always serialize");

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: Value = serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        deep_merge(defaults, file)
    } else {
        defaults
    };

    serde_json::from_value(merged).map_err(|e| SettingsError::Invalid {
        reason: e.to_string(),
    })
}

/// Recursively merge `overlay` onto `base`.
///
/// Objects merge key-by-key; any other value (including arrays, so a
/// configured route table replaces the default one wholesale) overwrites.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `PORTICO_*` overrides from an environment lookup.
///
/// The lookup is injected so tests can drive overrides without mutating
/// process-global env state.
fn apply_env_overrides(
    settings: &mut PorticoSettings,
    env: impl Fn(&str) -> Option<String>,
) {
    if let Some(port) = env("PORTICO_GATEWAY_PORT") {
        match port.parse() {
            Ok(port) => settings.gateway.port = port,
            Err(_) => tracing::warn!(value = %port, "ignoring bad PORTICO_GATEWAY_PORT"),
        }
    }
    if let Some(port) = env("PORTICO_PRESENCE_PORT") {
        match port.parse() {
            Ok(port) => settings.presence.port = port,
            Err(_) => tracing::warn!(value = %port, "ignoring bad PORTICO_PRESENCE_PORT"),
        }
    }
    if let Some(url) = env("PORTICO_AUTHORITY_URL") {
        settings.auth.authority_url = url;
    }
    if let Some(timeout) = env("PORTICO_AUTH_TIMEOUT_MS") {
        match timeout.parse() {
            Ok(timeout) => settings.auth.timeout_ms = timeout,
            Err(_) => tracing::warn!(value = %timeout, "ignoring bad PORTICO_AUTH_TIMEOUT_MS"),
        }
    }
    if let Some(level) = env("PORTICO_LOG_LEVEL") {
        settings.logging.level = level;
    }
}

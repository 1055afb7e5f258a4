// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session configuration
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Durations use humantime syntax (`"2s"`, `"500ms"`, `"1h"`).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use rps_core::{INTENT_KEY, SERVICE_TYPE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do with a payload from the peer that does not decode as a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Log and drop the payload; the session continues
    #[default]
    Ignore,
    /// Stop the session with an error
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service name, also the first segment of the wire protocol id
    pub service_type: String,
    /// Discovery filter key (and value)
    pub intent_key: String,
    /// How long a join attempt waits for the host to answer
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for probe and data requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long an idle connection to the session peer is kept open
    #[serde(with = "humantime_serde")]
    pub idle_connection_timeout: Duration,
    /// Multiaddr the node listens on
    pub listen_addr: String,
    pub decode_failure: DecodePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            intent_key: INTENT_KEY.to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            idle_connection_timeout: Duration::from_secs(60 * 60),
            listen_addr: "/ip4/0.0.0.0/tcp/0".to_string(),
            decode_failure: DecodePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Protocol id used by the request/response behaviour
    pub fn protocol_name(&self) -> String {
        format!("/{}/session/1.0.0", self.service_type)
    }
}

/// Platform config location, e.g. `~/.config/rps-p2p/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("io", "rps-p2p", "rps-p2p")
        .context("Failed to determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Read a config file
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str::<SessionConfig>(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load the explicit path if given, else the platform path if it exists,
/// else the defaults
pub fn load_or_default(path: Option<&Path>) -> Result<SessionConfig> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Ok(path) if path.exists() => load_config(&path),
        Ok(path) => {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(SessionConfig::default())
        }
        Err(e) => {
            tracing::debug!("Config directory unavailable ({}), using defaults", e);
            Ok(SessionConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.service_type, "rps-game");
        assert_eq!(config.intent_key, "rps-game-intent");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.decode_failure, DecodePolicy::Ignore);
        assert_eq!(config.protocol_name(), "/rps-game/session/1.0.0");
    }

    #[test]
    fn test_config_serialization() {
        let config = SessionConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("connect_timeout = \"2s\""));

        let deserialized: SessionConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "connect_timeout = \"500ms\"\ndecode_failure = \"fatal\"\n",
        )?;

        let config = load_or_default(Some(&config_path))?;
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.decode_failure, DecodePolicy::Fatal);
        assert_eq!(config.intent_key, INTENT_KEY);
        assert_eq!(config.request_timeout, Duration::from_secs(10));

        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        let err = load_config(&missing).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_bad_toml_is_error() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "connect_timeout = 5")?;

        let err = load_config(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        Ok(())
    }
}

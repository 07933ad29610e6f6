//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILEDRM_CONFIG` (environment variable)
//! 2. `~/.config/mailedrm/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailedrm\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever is loaded here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::convert::FailurePolicy;
use crate::export::hash::HashAlgorithm;
use crate::parser::mbox::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_BUFFER_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Export defaults.
    pub export: ExportConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Export defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// "best-effort" or "strict".
    pub failure_policy: FailurePolicy,
    /// "md5" or "sha256".
    pub hash_algorithm: HashAlgorithm,
    /// Subdirectory of the output directory for native files.
    /// Unset means natives sit next to the loadfile.
    pub natives_dir: Option<String>,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Read buffer size in bytes (default: 1 MB).
    pub read_buffer_size: usize,
    /// Maximum message size in bytes (default: 256 MB).
    pub max_message_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match parse_config(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Parse a TOML configuration document.
pub fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILEDRM_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailedrm").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailedrm")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.export.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(cfg.export.hash_algorithm, HashAlgorithm::Md5);
        assert!(cfg.export.natives_dir.is_none());
        assert_eq!(cfg.performance.max_message_size, 256 * 1024 * 1024);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.export.natives_dir = Some("natives".to_string());
        cfg.export.failure_policy = FailurePolicy::Strict;
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed = parse_config(&toml_str).expect("deserialize");
        assert_eq!(parsed.export.natives_dir.as_deref(), Some("natives"));
        assert_eq!(parsed.export.failure_policy, FailurePolicy::Strict);
        assert_eq!(
            parsed.performance.read_buffer_size,
            cfg.performance.read_buffer_size
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[export]
failure_policy = "strict"
hash_algorithm = "sha256"
"#;
        let cfg = parse_config(partial).expect("parse partial");
        assert_eq!(cfg.export.failure_policy, FailurePolicy::Strict);
        assert_eq!(cfg.export.hash_algorithm, HashAlgorithm::Sha256);
        // Other fields use defaults
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.performance.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let bad = "[export]\nfailure_policy = \"sometimes\"\n";
        assert!(parse_config(bad).is_err());
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailedrm-cache"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/mailedrm-cache"));
    }
}

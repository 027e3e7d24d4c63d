//! Engine configuration.
//!
//! [`SeawallConfig::load()`] reads the `[pagination]` section of
//! `config/seawall.toml` (optional) and overlays `SEAWALL__*` environment
//! variables, e.g. `SEAWALL__PAGINATION__MAX_PAGE_SIZE=500`.

use crate::pagination::DEFAULT_MAX_TOKEN_LEN;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/seawall.toml";
const ENV_PREFIX: &str = "SEAWALL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationConfig {
    /// Size used when a caller asks for a page without one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Fetch one extra row to tell whether another page exists
    #[serde(default = "default_probe_next")]
    pub probe_next: bool,
    /// Longest cursor token accepted, in hex characters
    #[serde(default = "default_max_cursor_token_len")]
    pub max_cursor_token_len: usize,
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    1000
}

fn default_probe_next() -> bool {
    true
}

fn default_max_cursor_token_len() -> usize {
    DEFAULT_MAX_TOKEN_LEN
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            probe_next: default_probe_next(),
            max_cursor_token_len: default_max_cursor_token_len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeawallConfig {
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl SeawallConfig {
    /// Load from `config/seawall.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from `path` (optional) overlaid by `SEAWALL__*` env vars.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file shouldn't hide a usable environment
                if std::path::Path::new(path).exists() {
                    log::warn!("failed to load {path}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        let config: SeawallConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pagination;
        if p.default_page_size == 0 || p.max_page_size == 0 {
            return Err(ConfigError::Message(
                "pagination page sizes must be greater than zero".to_string(),
            ));
        }
        if p.default_page_size > p.max_page_size {
            return Err(ConfigError::Message(format!(
                "default_page_size {} exceeds max_page_size {}",
                p.default_page_size, p.max_page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = SeawallConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.pagination, PaginationConfig::default());
        assert!(config.pagination.probe_next);
    }

    #[test]
    fn test_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pagination]\nmax_page_size = 50\nprobe_next = false").unwrap();

        let config = SeawallConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.pagination.max_page_size, 50);
        assert!(!config.pagination.probe_next);
        assert_eq!(config.pagination.default_page_size, 20);
    }

    #[test]
    fn test_inconsistent_sizes_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pagination]\ndefault_page_size = 100\nmax_page_size = 10").unwrap();
        assert!(SeawallConfig::load_from(file.path().to_str().unwrap()).is_err());
    }
}

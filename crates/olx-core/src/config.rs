//! Configuration for the access layer.
//!
//! [`OlxConfig`] is stored as TOML. Every section is `#[serde(default)]`, so a
//! partial file only overrides the values it names.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{OlxError, OlxResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OlxConfig {
    /// Network session behaviour.
    pub session: SessionConfig,

    /// Defaults for fault runs and result reads.
    pub faults: FaultConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Open networks read-only unless the caller says otherwise.
    pub default_read_only: bool,

    /// A bus name shared by several buses is an error rather than the first match.
    pub ambiguous_bus_names_fail: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_read_only: false,
            ambiguous_bus_names_fail: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Result tier scope when a run does not name one.
    pub default_tiers: u32,

    /// Runs discard earlier results unless told otherwise.
    pub clear_previous: bool,

    /// Operate time the engine reports for a device that does not trip.
    pub no_trip_seconds: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            default_tiers: 1,
            clear_previous: true,
            no_trip_seconds: 9999.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,

    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: false,
        }
    }
}

impl OlxConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> OlxResult<Self> {
        let path = path.as_ref();
        let load = || -> anyhow::Result<Self> {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
        };
        load().map_err(|err| OlxError::Config(format!("{err:#}")))
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> OlxResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> OlxResult<()> {
        let path = path.as_ref();
        let save = || -> anyhow::Result<()> {
            let contents = toml::to_string_pretty(self).context("serializing config")?;
            std::fs::write(path, contents)
                .with_context(|| format!("writing config {}", path.display()))
        };
        save().map_err(|err| OlxError::Config(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = OlxConfig::default();
        assert!(!config.session.default_read_only);
        assert!(config.session.ambiguous_bus_names_fail);
        assert_eq!(config.faults.default_tiers, 1);
        assert_eq!(config.faults.no_trip_seconds, 9999.0);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            [faults]
            default_tiers = 3

            [logging]
            filter = "olx_core=debug"
        "#;
        let config: OlxConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.faults.default_tiers, 3);
        assert!(config.faults.clear_previous);
        assert_eq!(config.logging.filter, "olx_core=debug");
        assert!(config.session.ambiguous_bus_names_fail);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = OlxConfig::default();
        config.session.default_read_only = true;
        config.faults.no_trip_seconds = 999.0;

        let file = NamedTempFile::new().unwrap();
        config.save_to(file.path()).unwrap();

        let loaded = OlxConfig::load_from(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_bad_file_is_a_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[faults]\ndefault_tiers = \"many\"").unwrap();
        let err = OlxConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, OlxError::Config(ref msg) if msg.contains("parsing config")));

        let missing = file.path().with_extension("absent");
        assert!(OlxConfig::load_from(&missing).is_err());
        assert_eq!(OlxConfig::load_or_default(&missing).unwrap(), OlxConfig::default());
    }
}

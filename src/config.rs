//! TOML configuration for the testdash server and CLI.
//!
//! Every field has a default, so an empty or missing file is valid. The file
//! is looked up from the `--config` flag, then `TESTDASH_CONFIG`, then
//! `./testdash.toml`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::Labeler;
use crate::retention::{RetentionPolicy, DEFAULT_KEEP_RUNS};

pub const CONFIG_ENV: &str = "TESTDASH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "testdash.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load the active configuration. Returns the path it came
    /// from, or `None` when the built-in defaults are in use. Runs before
    /// logging is set up, so it reports nothing itself.
    ///
    /// An explicitly named file (flag or env var) must exist; the working
    /// directory file is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = named {
            let config = Self::load(&path)?;
            return Ok((config, Some(path)));
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            let config = Self::load(&local)?;
            return Ok((config, Some(local)));
        }

        Ok((Self::default(), None))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention.keep_runs == 0 {
            bail!("retention.keep_runs must be at least 1");
        }
        if self.display.labeler().is_none() {
            bail!(
                "display.utc_offset_minutes must be within +/-1439, got {}",
                self.display.utc_offset_minutes
            );
        }
        if self.server.body_limit_bytes == 0 {
            bail!("server.body_limit_bytes must be positive");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind: String,
    /// Allow any origin. The dashboard frontend is usually served elsewhere.
    pub cors_permissive: bool,
    /// Largest accepted request body, covering batches and screenshots.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            cors_permissive: true,
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Screenshots live under `<artifact_root>/<run_id>/`.
    pub artifact_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/testdash.db"),
            artifact_root: PathBuf::from("uploads/screenshots"),
        }
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Distinct runs kept per framework.
    pub keep_runs: usize,
    /// Age below which an unreferenced screenshot directory is left alone.
    pub artifact_grace_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_runs: DEFAULT_KEEP_RUNS,
            artifact_grace_secs: 600,
        }
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        // clamp far below the chrono::Duration limit
        let grace = self.artifact_grace_secs.min(u64::from(u32::MAX)) as i64;
        RetentionPolicy {
            keep_runs: self.keep_runs,
            artifact_grace: chrono::Duration::seconds(grace),
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Offset from UTC used for run labels and day/week buckets.
    pub utc_offset_minutes: i32,
}

impl DisplayConfig {
    pub fn labeler(&self) -> Option<Labeler> {
        Labeler::with_offset_minutes(self.utc_offset_minutes)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert_eq!(cfg.server.body_limit_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/testdash.db"));
        assert_eq!(cfg.storage.artifact_root, PathBuf::from("uploads/screenshots"));
        assert_eq!(cfg.retention.keep_runs, 30);
        assert_eq!(cfg.retention.policy(), RetentionPolicy::default());
        assert_eq!(cfg.display.labeler(), Some(Labeler::default()));
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:8080"
cors_permissive = false
body_limit_bytes = 1048576

[storage]
db_path = "/var/lib/testdash/results.db"
artifact_root = "/var/lib/testdash/screenshots"

[retention]
keep_runs = 10
artifact_grace_secs = 0

[display]
utc_offset_minutes = 330

[logging]
level = "debug"
format = "json"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert!(!cfg.server.cors_permissive);
        assert_eq!(cfg.retention.policy().keep_runs, 10);
        assert_eq!(cfg.retention.policy().artifact_grace, chrono::Duration::zero());
        assert_eq!(cfg.display.labeler().unwrap().offset().local_minus_utc(), 330 * 60);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("[retention]\nkeep_runs = 5\n").unwrap();
        assert_eq!(cfg.retention.keep_runs, 5);
        assert_eq!(cfg.retention.artifact_grace_secs, 600);
        assert_eq!(cfg.server, ServerConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.retention.keep_runs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.display.utc_offset_minutes = 24 * 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("testdash.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9999\"\n").unwrap();

        let (cfg, from) = Config::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9999");
        assert_eq!(from.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(Config::load(Path::new("/nonexistent/testdash.toml")).is_err());
        assert!(Config::resolve(Some(Path::new("/nonexistent/testdash.toml"))).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg, back);
    }
}

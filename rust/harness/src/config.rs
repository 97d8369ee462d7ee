//! Configuration parsing for the experiment harness.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub harness: HarnessSettings,
}

/// Harness-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Program used to run the training entry point.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Training entry point passed as the first argument to `interpreter`.
    #[serde(default = "default_entry_script")]
    pub entry_script: PathBuf,
    /// Directory holding `<config_ref>.yaml` files.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Parent directory for per-run save directories.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Directory to change into before resolving any of the paths above.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Per-experiment timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between consecutive experiments.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    /// Where to write the JSON run report, if anywhere.
    #[serde(default)]
    pub report_file: Option<PathBuf>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            entry_script: default_entry_script(),
            config_dir: default_config_dir(),
            log_dir: default_log_dir(),
            work_dir: None,
            timeout_secs: default_timeout_secs(),
            wait_secs: default_wait_secs(),
            report_file: None,
        }
    }
}

impl HarnessSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_entry_script() -> PathBuf {
    PathBuf::from("benchmarks/baseline/main.py")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("benchmarks/baseline/configs")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_timeout_secs() -> u64 {
    14400
}

fn default_wait_secs() -> u64 {
    10
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub timeout_secs: Option<u64>,
    pub wait_secs: Option<u64>,
    pub report_file: Option<PathBuf>,
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::debug!(
                "No settings file at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply command-line overrides on top of file values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(timeout) = overrides.timeout_secs {
            self.harness.timeout_secs = timeout;
        }
        if let Some(wait) = overrides.wait_secs {
            self.harness.wait_secs = wait;
        }
        if overrides.report_file.is_some() {
            self.harness.report_file = overrides.report_file;
        }
        self
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn parse_config(toml_str: &str) -> HarnessConfig {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_harness.toml");
        std::fs::write(&path, toml_str).unwrap();
        HarnessConfig::load(&path).unwrap()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(
            r#"
[harness]
timeout_secs = 7200
"#,
        );
        assert_eq!(config.harness.timeout_secs, 7200);
        assert_eq!(config.harness.wait_secs, 10);
        assert_eq!(config.harness.interpreter, "python3");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("");
        assert_eq!(config.harness.timeout(), Duration::from_secs(14400));
        assert_eq!(config.harness.wait(), Duration::from_secs(10));
        assert_eq!(
            config.harness.config_dir,
            PathBuf::from("benchmarks/baseline/configs")
        );
        assert_eq!(config.harness.log_dir, PathBuf::from("log"));
        assert!(config.harness.work_dir.is_none());
    }

    #[test]
    fn test_paths() {
        let config = parse_config(
            r#"
[harness]
interpreter = "/opt/venv/bin/python"
entry_script = "train.py"
config_dir = "configs"
log_dir = "runs"
work_dir = "/srv/reid"
report_file = "runs/report.json"
"#,
        );
        assert_eq!(config.harness.interpreter, "/opt/venv/bin/python");
        assert_eq!(config.harness.entry_script, PathBuf::from("train.py"));
        assert_eq!(config.harness.work_dir, Some(PathBuf::from("/srv/reid")));
        assert_eq!(
            config.harness.report_file,
            Some(PathBuf::from("runs/report.json"))
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = HarnessConfig::parse("[harness]\ntimeout_secs = 100\nwait_secs = 5\n")
            .unwrap()
            .with_overrides(Overrides {
                timeout_secs: Some(30),
                wait_secs: None,
                report_file: None,
            });
        assert_eq!(config.harness.timeout_secs, 30);
        assert_eq!(config.harness.wait_secs, 5);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(
            HarnessConfig::load(&path),
            Err(ConfigError::Io(..))
        ));
        let config = HarnessConfig::load_or_default(&path).unwrap();
        assert_eq!(config.harness.timeout_secs, 14400);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            HarnessConfig::parse("[harness]\ntimeout_secs = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}

use crate::duplicate::DEFAULT_THRESHOLD;
use crate::error::{Result, SpecLedgerError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CACHE_DIR: &str = "SPECLEDGER_CACHE_DIR";
pub const ENV_AGENT: &str = "SPECLEDGER_AGENT";
pub const ENV_PROJECT_DIR: &str = "SPECLEDGER_PROJECT_DIR";

fn home() -> PathBuf {
    home::home_dir().unwrap_or_default()
}

fn default_artifact_path() -> String {
    paths::SPECLEDGER_DIR.to_string()
}

fn default_project_dir() -> PathBuf {
    home().join("demos")
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_cache_dir() -> PathBuf {
    home().join(paths::USER_CACHE_DIR)
}

fn default_agent() -> String {
    "claude".to_string()
}

/// User-level settings from `~/.config/specledger/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    #[serde(default = "default_project_dir")]
    pub default_project_dir: PathBuf,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_agent")]
    pub agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            default_project_dir: default_project_dir(),
            similarity_threshold: default_threshold(),
            cache_dir: default_cache_dir(),
            agent: default_agent(),
        }
    }
}

impl Config {
    /// Read `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// User config file overlaid with `SPECLEDGER_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(&paths::user_config_path()?)?;
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_AGENT).filter(|v| !v.is_empty()) {
            self.agent = v;
        }
        if let Some(v) = lookup(ENV_PROJECT_DIR).filter(|v| !v.is_empty()) {
            self.default_project_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SpecLedgerError::InvalidRecord(format!(
                "similarity_threshold must be between 0 and 1, got {}",
                self.similarity_threshold
            )));
        }
        if self.artifact_path.is_empty() {
            return Err(SpecLedgerError::InvalidRecord(
                "artifact_path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

use crate::constants;
use crate::error::{Result, SyncError};
use crate::pipeline::tasks::ArtifactPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog_url: String,
    pub output_dir: PathBuf,
    pub watermark_path: PathBuf,
    pub workers: usize,
    pub request_timeout_secs: u64,
    pub relevance_theme: String,
    pub relevance_keyword: String,
    pub media_type: String,
    pub artifact_policy: ArtifactPolicy,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: constants::CATALOG_URL.to_string(),
            output_dir: PathBuf::from(constants::OUTPUT_DIR),
            watermark_path: PathBuf::from(constants::WATERMARK_PATH),
            workers: constants::NUM_WORKERS,
            request_timeout_secs: constants::REQUEST_TIMEOUT_SECS,
            relevance_theme: constants::HOSPITAL_THEME.to_string(),
            relevance_keyword: constants::HOSPITAL_KEYWORD.to_string(),
            media_type: constants::CSV_MEDIA_TYPE.to_string(),
            artifact_policy: ArtifactPolicy::BestEffort,
            log_dir: PathBuf::from(constants::LOG_DIR),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `config.toml` when no path is given.
    ///
    /// The default file is optional; an explicitly requested one must exist and parse.
    /// Environment overrides are not applied; see [`Config::apply_env`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(constants::CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", constants::CONFIG_PATH);
                    Self::default()
                }
            }
        };
        Ok(config)
    }

    /// Apply `CMS_SYNC_*` variables from the process environment.
    ///
    /// Returns one message per rejected value so the caller can report them once
    /// logging is up.
    pub fn apply_env(&mut self) -> Vec<String> {
        let rejected = self.apply_overrides(|key| std::env::var(key).ok());
        self.workers = self.workers.max(1);
        rejected
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `CMS_SYNC_*` overrides. `lookup` is `std::env::var` outside of tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();
        if let Some(url) = lookup(constants::ENV_CATALOG_URL) {
            self.catalog_url = url;
        }
        if let Some(dir) = lookup(constants::ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(constants::ENV_WATERMARK_PATH) {
            self.watermark_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(constants::ENV_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.workers = n,
                Err(e) => rejected.push(format!(
                    "Ignoring {}={:?}: {}",
                    constants::ENV_WORKERS,
                    raw,
                    e
                )),
            }
        }
        rejected
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

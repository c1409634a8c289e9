//! Application configuration.
//!
//! Production loads `airlift.yaml`; development loads from the environment
//! (activated by `AIRLIFT_DEV_MODE` or a `.env` file).

use crate::artwork::ArtworkPolicy;
use crate::jobs::CleanupConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn default_worker_count() -> usize {
    4
}
fn default_attempt_timeout_secs() -> u64 {
    60
}
fn default_scratch_max_age_hours() -> u64 {
    24
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_mail_sender() -> String {
    "noreply@airlift.dev".to_string()
}
fn default_artwork_min_dimension() -> u32 {
    1400
}
fn default_artwork_max_dimension() -> u32 {
    1400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
    /// Max concurrently running jobs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Hard bound on a single platform submission attempt
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Directories the housekeeping sweep cleans
    #[serde(default)]
    pub scratch_dirs: Vec<PathBuf>,
    #[serde(default = "default_scratch_max_age_hours")]
    pub scratch_max_age_hours: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// HTTP mail API endpoint. None = log-only delivery.
    #[serde(default)]
    pub mail_endpoint: Option<String>,
    #[serde(default)]
    pub mail_api_key: Option<String>,
    #[serde(default = "default_mail_sender")]
    pub mail_sender: String,
    #[serde(default = "default_artwork_min_dimension")]
    pub artwork_min_dimension: u32,
    #[serde(default = "default_artwork_max_dimension")]
    pub artwork_max_dimension: u32,
    /// Reject artwork inputs above this dimension instead of downscaling
    #[serde(default)]
    pub artwork_max_input_dimension: Option<u32>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let dev_mode = std::env::var("AIRLIFT_DEV_MODE").is_ok() || dotenvy::dotenv().is_ok();
        if dev_mode {
            info!("Dev mode - loading configuration from environment");
            Ok(Self::from_env())
        } else {
            let path = path.unwrap_or_else(|| Path::new("airlift.yaml"));
            info!("Loading configuration from {}", path.display());
            Self::from_file(path)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn from_env() -> Self {
        AppConfig {
            database_path: env_path("AIRLIFT_DATABASE_PATH", "airlift.db"),
            storage_root: env_path("AIRLIFT_STORAGE_ROOT", "storage"),
            worker_count: env_parse("AIRLIFT_WORKER_COUNT", default_worker_count()),
            attempt_timeout_secs: env_parse(
                "AIRLIFT_ATTEMPT_TIMEOUT_SECS",
                default_attempt_timeout_secs(),
            ),
            scratch_dirs: std::env::var("AIRLIFT_SCRATCH_DIRS")
                .map(|dirs| dirs.split(':').map(PathBuf::from).collect())
                .unwrap_or_default(),
            scratch_max_age_hours: env_parse(
                "AIRLIFT_SCRATCH_MAX_AGE_HOURS",
                default_scratch_max_age_hours(),
            ),
            cleanup_interval_secs: env_parse(
                "AIRLIFT_CLEANUP_INTERVAL_SECS",
                default_cleanup_interval_secs(),
            ),
            mail_endpoint: std::env::var("AIRLIFT_MAIL_ENDPOINT").ok(),
            mail_api_key: std::env::var("AIRLIFT_MAIL_API_KEY").ok(),
            mail_sender: std::env::var("AIRLIFT_MAIL_SENDER")
                .unwrap_or_else(|_| default_mail_sender()),
            artwork_min_dimension: env_parse(
                "AIRLIFT_ARTWORK_MIN_DIMENSION",
                default_artwork_min_dimension(),
            ),
            artwork_max_dimension: env_parse(
                "AIRLIFT_ARTWORK_MAX_DIMENSION",
                default_artwork_max_dimension(),
            ),
            artwork_max_input_dimension: std::env::var("AIRLIFT_ARTWORK_MAX_INPUT_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn cleanup(&self) -> CleanupConfig {
        CleanupConfig {
            scratch_dirs: self.scratch_dirs.clone(),
            max_age: Duration::from_secs(self.scratch_max_age_hours * 3600),
            interval: Duration::from_secs(self.cleanup_interval_secs),
        }
    }

    pub fn artwork_policy(&self) -> ArtworkPolicy {
        ArtworkPolicy {
            min_dimension: self.artwork_min_dimension,
            max_dimensions: (self.artwork_max_dimension, self.artwork_max_dimension),
            max_input_dimension: self.artwork_max_input_dimension,
            ..ArtworkPolicy::default()
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// `load_config` module: reads the YAML run configuration and the secrets that
/// come from the environment.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`] (paths, upload endpoint, pipeline
///   tuning, optional audit database)
/// - Apply the `THREAD_POOL_SIZE` override to the worker count
/// - Read `DOCBATCH_USERNAME` / `DOCBATCH_PASSWORD` for the repository's basic auth
///
/// # Errors
/// Everything here returns `anyhow::Error` and is surfaced at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use docbatch_core::config::{PathsConfig, PipelineConfig};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const USERNAME_ENV: &str = "DOCBATCH_USERNAME";
pub const PASSWORD_ENV: &str = "DOCBATCH_PASSWORD";
pub const THREAD_POOL_SIZE_ENV: &str = "THREAD_POOL_SIZE";

const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub paths: PathsConfig,
    pub upload: UploadSection,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT_SECS
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditSection {
    /// SQLite URL, e.g. `sqlite://audit.db`. Without it audit rows only go to the log.
    pub database_url: Option<String>,
}

/// Basic-auth credentials for the document repository.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Loads the YAML config (no secrets in it) and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(raw) = env::var(THREAD_POOL_SIZE_ENV) {
        let workers: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("{THREAD_POOL_SIZE_ENV} must be a positive integer, got {raw:?}"))?;
        if workers == 0 {
            return Err(anyhow!("{THREAD_POOL_SIZE_ENV} must be at least 1"));
        }
        info!(workers, "Worker count overridden from environment");
        config.pipeline.workers = workers;
    }

    Ok(config)
}

/// Reads the repository credentials from the environment.
pub fn credentials_from_env() -> Result<Credentials> {
    let read = |key: &str| {
        env::var(key).map_err(|e| {
            error!(error = ?e, key, "Credential missing in environment");
            anyhow!("{key} must be set in the environment")
        })
    };
    Ok(Credentials {
        username: read(USERNAME_ENV)?,
        password: read(PASSWORD_ENV)?,
    })
}

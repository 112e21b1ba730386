use std::path::{Path, PathBuf};
use std::time::Duration;

use rtrain_worker::WorkerConfig;
use serde::Deserialize;

use crate::background::cleaner::CleanerConfig;

/// Default location of the server configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rtraind.conf";

/// Grace period added to the job timeout before a claim counts as abandoned.
const ABANDON_GRACE: Duration = Duration::from_secs(5 * 60);

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{var} has an invalid value '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// Server configuration.
///
/// Loaded from a TOML file whose keys mirror the field names; every key is
/// optional. A handful of environment variables override the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// sqlx connection string for the job store (default: `sqlite://rtrain.db`).
    pub database_url: String,
    /// Shared secret for Basic auth. `None` disables authentication.
    pub password: Option<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Largest accepted request body (default: 256 MiB).
    pub max_body_bytes: usize,
    /// How long finished jobs are kept, in seconds (default: 24 h).
    pub retention_secs: u64,
    /// Cleaner period in seconds (default: `30`).
    pub cleanup_interval_secs: u64,
    /// Per-job execution limit in seconds; `0` disables it (default: 24 h).
    pub job_timeout_secs: u64,
    /// Worker idle poll interval in milliseconds (default: `1000`).
    pub poll_interval_ms: u64,
    /// Minimum milliseconds between persisted progress updates (default: `500`).
    pub progress_interval_ms: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            database_url: "sqlite://rtrain.db".into(),
            password: None,
            request_timeout_secs: 30,
            max_body_bytes: 256 * 1024 * 1024,
            retention_secs: 24 * 3600,
            cleanup_interval_secs: 30,
            job_timeout_secs: 24 * 3600,
            poll_interval_ms: 1000,
            progress_interval_ms: 500,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load the file at `path`, then apply environment overrides.
    ///
    /// A missing file means defaults; a file that exists but cannot be read
    /// or parsed is an error.
    ///
    /// | Env Var            | Overrides       |
    /// |--------------------|-----------------|
    /// | `DATABASE_URL`     | `database_url`  |
    /// | `RTRAIND_PASSWORD` | `password`      |
    /// | `HOST`             | `host`          |
    /// | `PORT`             | `port`          |
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse the file at `path` without looking at the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.normalize();
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(password) = lookup("RTRAIND_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PORT",
                value: port,
            })?;
        }
        self.normalize();
        Ok(())
    }

    // An empty password is the same as none.
    fn normalize(&mut self) {
        if self.password.as_deref().is_some_and(str::is_empty) {
            self.password = None;
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Settings for the embedded worker.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            job_timeout: self.job_timeout(),
            ..WorkerConfig::default()
        }
    }

    /// Settings for the cleaner loop.
    pub fn cleaner_config(&self) -> CleanerConfig {
        CleanerConfig {
            interval: Duration::from_secs(self.cleanup_interval_secs.max(1)),
            retention: Duration::from_secs(self.retention_secs),
            abandon_after: self.job_timeout().map(|t| t + ABANDON_GRACE),
        }
    }
}

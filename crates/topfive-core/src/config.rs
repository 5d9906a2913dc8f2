use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_REFRESH_PATH: &str = "/auth/refresh/";
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = "topfive/0.1.0";

const ENV_API_URL: &str = "TOPFIVE_API_URL";
const ENV_REFRESH_PATH: &str = "TOPFIVE_REFRESH_PATH";
const ENV_REFRESH_TIMEOUT: &str = "TOPFIVE_REFRESH_TIMEOUT_SECS";

/// Settings shared by the auth client, the session layer and the transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    /// Path of the token refresh endpoint, relative to `base_url`.
    pub refresh_path: String,
    /// Upper bound for a single refresh call; waiters are bounded by it too.
    pub refresh_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// Defaults pointed at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|err| ConfigError::InvalidValue {
            key: "base_url",
            reason: err.to_string(),
        })?;
        Ok(Self {
            base_url,
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Defaults for a backend on the local machine.
    pub fn local() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Local defaults overlaid with `TOPFIVE_API_URL`, `TOPFIVE_REFRESH_PATH` and
    /// `TOPFIVE_REFRESH_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match non_blank_var(ENV_API_URL) {
            Some(raw) => Self::new(&raw).map_err(|err| match err {
                ConfigError::InvalidValue { reason, .. } => ConfigError::InvalidValue {
                    key: ENV_API_URL,
                    reason,
                },
                other => other,
            })?,
            None => Self::local()?,
        };

        if let Some(path) = non_blank_var(ENV_REFRESH_PATH) {
            config = config.with_refresh_path(path);
        }

        if let Some(raw) = non_blank_var(ENV_REFRESH_TIMEOUT) {
            let seconds = raw
                .parse::<u64>()
                .map_err(|err| ConfigError::InvalidValue {
                    key: ENV_REFRESH_TIMEOUT,
                    reason: err.to_string(),
                })?;
            config.refresh_timeout = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Resolve a request path against the base URL, keeping the base URL's own path.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))
    }

    /// Whether `path` addresses the token refresh endpoint. Whole segments are
    /// compared and the query string is ignored.
    pub fn is_refresh_path(&self, path: &str) -> bool {
        let wanted: Vec<&str> = segments(&self.refresh_path).collect();
        let path = path.split('?').next().unwrap_or_default();
        !wanted.is_empty() && segments(path).eq(wanted)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Application-specific configuration directory helpers.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs =
            ProjectDirs::from("app", "topfive", "topfive").ok_or(ConfigError::MissingProjectDirs)?;
        let config_dir = dirs.config_dir();
        fs::create_dir_all(config_dir).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(config_dir)?;
        Ok(Self {
            root: config_dir.to_path_buf(),
        })
    }

    /// Use an explicit directory instead of the platform default.
    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path to the persisted credential map.
    pub fn credentials_file(&self) -> PathBuf {
        self.root.join("credentials.json")
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Errors that can occur when resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for topfive")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

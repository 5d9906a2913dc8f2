use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;

use crate::config::ConfigLocator;

use super::AuthError;

/// Keys persisted by the client. Absence of both tokens means "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
    UserInfo,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::UserInfo,
    ];

    /// Name under which the value is persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::AccessToken => "accessToken",
            CredentialKey::RefreshToken => "refreshToken",
            CredentialKey::UserInfo => "userInfo",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key-value storage for session credentials.
///
/// Implementations fail only on storage-layer errors; a missing key is `Ok(None)`.
/// No atomicity is expected across keys.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, AuthError>;
    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), AuthError>;
    async fn delete(&self, key: CredentialKey) -> Result<(), AuthError>;
}

/// Filesystem-backed credential storage located in the user configuration directory.
pub struct FileCredentialStore {
    locator: ConfigLocator,
    write_lock: AsyncMutex<()>,
}

impl FileCredentialStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self {
            locator,
            write_lock: AsyncMutex::new(()),
        }
    }

    pub fn with_default_locator() -> Result<Self, AuthError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    /// Run envelope I/O on the blocking pool while the write lock is held.
    async fn with_envelope<T, F>(&self, op: F) -> Result<T, AuthError>
    where
        F: FnOnce(&Path) -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.locator.credentials_file();
        task::spawn_blocking(move || op(&path))
            .await
            .map_err(|err| AuthError::Store(format!("credential I/O task failed: {err}")))?
    }

    fn read_envelope(path: &Path) -> Result<CredentialEnvelope, AuthError> {
        if !path.exists() {
            return Ok(CredentialEnvelope::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_envelope(path: &Path, envelope: &CredentialEnvelope) -> Result<(), AuthError> {
        let payload = serde_json::to_string_pretty(envelope)?;
        Self::write_file(path, &payload)
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        self.with_envelope(move |path| {
            let envelope = Self::read_envelope(path)?;
            Ok(envelope.values.get(key.as_str()).cloned())
        })
        .await
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        let value = value.to_owned();
        self.with_envelope(move |path| {
            let mut envelope = Self::read_envelope(path)?;
            envelope.values.insert(key.as_str().to_owned(), value);
            Self::write_envelope(path, &envelope)
        })
        .await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), AuthError> {
        self.with_envelope(move |path| {
            let mut envelope = Self::read_envelope(path)?;
            if envelope.values.remove(key.as_str()).is_none() {
                return Ok(());
            }
            Self::write_envelope(path, &envelope)
        })
        .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialEnvelope {
    version: u32,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl Default for CredentialEnvelope {
    fn default() -> Self {
        Self {
            version: 1,
            values: BTreeMap::new(),
        }
    }
}

/// In-process credential storage for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with the given access and refresh tokens.
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let store = Self::new();
        {
            let mut values = store.values.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(access) = access {
                values.insert(CredentialKey::AccessToken, access.to_owned());
            }
            if let Some(refresh) = refresh {
                values.insert(CredentialKey::RefreshToken, refresh.to_owned());
            }
        }
        store
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialKey, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        Ok(self.values().get(&key).cloned())
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        self.values().insert(key, value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), AuthError> {
        self.values().remove(&key);
        Ok(())
    }
}

use super::{AuthError, CredentialKey, CredentialStore};

/// Snapshot of the persisted session tokens.
///
/// The credential store stays the source of truth; a snapshot is only valid until
/// the next suspension point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionCredentials {
    pub async fn load(store: &dyn CredentialStore) -> Result<Self, AuthError> {
        let access_token = store.get(CredentialKey::AccessToken).await?;
        let refresh_token = store.get(CredentialKey::RefreshToken).await?;
        Ok(Self {
            access_token,
            refresh_token,
        })
    }

    /// Whether there is anything to act on at all.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

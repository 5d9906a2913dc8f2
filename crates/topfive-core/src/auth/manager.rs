use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::http::{ApiRequest, Transport};
use crate::models::{LoginResponse, RegisterDetails, UserInfo};

use super::{AuthError, CredentialKey, CredentialStore, SignOutHook};

const LOGIN_PATH: &str = "/auth/login/";
const REGISTER_PATH: &str = "/auth/register/";

/// Observable session state for front-ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub authenticated: bool,
    pub user_info: Option<UserInfo>,
}

/// Owns the signed-in session: login, registration, logout, and the sign-out hook
/// the auth client escalates into.
///
/// Login and registration go straight to the transport; they carry no bearer and
/// must never trigger a refresh.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            store,
            transport,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Rebuild state from storage. Authenticated only when both the access token
    /// and the cached user info are present and readable.
    pub async fn restore(&self) -> Result<SessionState, AuthError> {
        let access = self.store.get(CredentialKey::AccessToken).await?;
        let user_info = self.store.get(CredentialKey::UserInfo).await?;

        let state = match (access, user_info) {
            (Some(_), Some(raw)) => match serde_json::from_str::<UserInfo>(&raw) {
                Ok(user_info) => SessionState {
                    authenticated: true,
                    user_info: Some(user_info),
                },
                Err(err) => {
                    warn!(error = %err, "stored user info is unreadable; treating as signed out");
                    SessionState::default()
                }
            },
            _ => SessionState::default(),
        };

        debug!(authenticated = state.authenticated, "session restored");
        self.state.send_replace(state.clone());
        Ok(state)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserInfo, AuthError> {
        #[derive(Serialize)]
        struct Credentials<'a> {
            username: &'a str,
            password: &'a str,
        }

        let request = ApiRequest::post(LOGIN_PATH).with_json(&Credentials { username, password })?;
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(AuthError::LoginRejected {
                status: response.status(),
                body: response.text(),
            });
        }

        let payload: LoginResponse = response.json()?;
        self.store
            .set(CredentialKey::AccessToken, &payload.access)
            .await?;
        self.store
            .set(CredentialKey::RefreshToken, &payload.refresh)
            .await?;
        self.store
            .set(
                CredentialKey::UserInfo,
                &serde_json::to_string(&payload.user_info)?,
            )
            .await?;

        info!(user = %payload.user_info.username, "logged in");
        self.state.send_replace(SessionState {
            authenticated: true,
            user_info: Some(payload.user_info.clone()),
        });
        Ok(payload.user_info)
    }

    pub async fn register(&self, details: &RegisterDetails) -> Result<Value, AuthError> {
        let request = ApiRequest::post(REGISTER_PATH).with_json(details)?;
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(AuthError::RegistrationRejected {
                status: response.status(),
                body: response.text(),
            });
        }
        info!(user = %details.username, "registered");
        Ok(response.json()?)
    }

    /// Forget every stored credential. Safe to call when already signed out.
    pub async fn logout(&self) -> Result<(), AuthError> {
        for key in CredentialKey::ALL {
            self.store.delete(key).await?;
        }
        self.state.send_replace(SessionState::default());
        info!("session cleared");
        Ok(())
    }
}

#[async_trait]
impl SignOutHook for SessionManager {
    async fn sign_out(&self) -> Result<(), AuthError> {
        self.logout().await
    }
}

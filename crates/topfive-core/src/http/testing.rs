//! In-process transport and hook doubles for exercising the refresh protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::auth::{AuthError, CredentialKey, CredentialStore, MemoryCredentialStore, SignOutHook};

use super::transport::{ApiRequest, ApiResponse, Transport, TransportError};

pub(crate) const REFRESH_PATH: &str = "/auth/refresh/";

#[derive(Debug, Clone)]
pub(crate) enum RefreshReply {
    Issue {
        access: String,
        refresh: Option<String>,
    },
    Fail(StatusCode),
    Stall,
}

impl RefreshReply {
    pub(crate) fn issue(access: &str) -> Self {
        Self::Issue {
            access: access.into(),
            refresh: None,
        }
    }

    pub(crate) fn rotate(access: &str, refresh: &str) -> Self {
        Self::Issue {
            access: access.into(),
            refresh: Some(refresh.into()),
        }
    }
}

/// Scripted backend:
/// - the refresh path answers with the configured [`RefreshReply`];
/// - `/public` and `/broken` ignore credentials (200 and 500);
/// - `/always-401` rejects every credential;
/// - `/flaky` rejects stale credentials and answers 500 to the valid one;
/// - everything else accepts only the current valid access token.
pub(crate) struct ScriptedTransport {
    valid_token: Mutex<String>,
    refresh_reply: Mutex<RefreshReply>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    refresh_calls: AtomicUsize,
    refresh_bodies: Mutex<Vec<Value>>,
    sent: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.into()),
            refresh_reply: Mutex::new(RefreshReply::Fail(StatusCode::UNAUTHORIZED)),
            refresh_gate: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn accept_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.into();
    }

    pub(crate) fn reply_to_refresh(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    /// Hold the next refresh call until the returned handle is notified.
    pub(crate) fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_bodies(&self) -> Vec<Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    /// Non-refresh requests in send order, with the bearer each one carried.
    pub(crate) fn sent(&self) -> Vec<(String, Option<String>)> {
        self.sent.lock().unwrap().clone()
    }

    async fn answer_refresh(&self, request: &ApiRequest) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_bodies
            .lock()
            .unwrap()
            .push(request.body.clone().unwrap_or(Value::Null));

        let gate = self.refresh_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.refresh_reply.lock().unwrap().clone();
        match reply {
            RefreshReply::Issue { access, refresh } => {
                let body = match refresh {
                    Some(refresh) => json!({ "access": access, "refresh": refresh }),
                    None => json!({ "access": access }),
                };
                ApiResponse::from_json(StatusCode::OK, &body).unwrap()
            }
            RefreshReply::Fail(status) => ApiResponse::new(status, "refresh rejected"),
            RefreshReply::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                ApiResponse::new(StatusCode::GATEWAY_TIMEOUT, Vec::new())
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        if request.path == REFRESH_PATH {
            return Ok(self.answer_refresh(request).await);
        }

        let bearer = request.bearer().map(str::to_owned);
        self.sent
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.clone()));

        let response = match request.path.as_str() {
            "/public" => ApiResponse::from_json(StatusCode::OK, &json!({ "path": "/public" })),
            "/broken" => Ok(ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom")),
            "/always-401" => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "denied")),
            path => {
                let valid = self.valid_token.lock().unwrap().clone();
                if bearer.as_deref() == Some(valid.as_str()) && path == "/flaky" {
                    Ok(ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "replay failed"))
                } else if bearer.as_deref() == Some(valid.as_str()) {
                    ApiResponse::from_json(StatusCode::OK, &json!({ "path": path }))
                } else {
                    Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "token expired"))
                }
            }
        };
        response.map_err(TransportError::from)
    }
}

/// Sign-out hook that only counts invocations.
#[derive(Default)]
pub(crate) struct CountingHook {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingHook {
    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignOutHook for CountingHook {
    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AuthError::Store("session layer unavailable".into()));
        }
        Ok(())
    }
}

/// Sign-out hook that stays inside `sign_out` until released.
#[derive(Default)]
pub(crate) struct GatedHook {
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedHook {
    /// Resolves once a sign-out is in progress.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignOutHook for GatedHook {
    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Credential store whose reads or writes fail at the storage layer.
pub(crate) struct FailingStore {
    inner: MemoryCredentialStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingStore {
    pub(crate) fn failing_reads(inner: MemoryCredentialStore) -> Self {
        Self {
            inner,
            fail_reads: true,
            fail_writes: false,
        }
    }

    pub(crate) fn failing_writes(inner: MemoryCredentialStore) -> Self {
        Self {
            inner,
            fail_reads: false,
            fail_writes: true,
        }
    }
}

#[async_trait]
impl CredentialStore for FailingStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, AuthError> {
        if self.fail_reads {
            return Err(AuthError::Store(format!("cannot read {key}")));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        if self.fail_writes {
            return Err(AuthError::Store(format!("cannot write {key}")));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), AuthError> {
        if self.fail_writes {
            return Err(AuthError::Store(format!("cannot delete {key}")));
        }
        self.inner.delete(key).await
    }
}

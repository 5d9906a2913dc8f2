//! Single-flight coordination of access-credential refresh.
//!
//! At most one refresh call is on the wire at any instant. Every request that hits
//! an authorization failure while a cycle is running joins the cycle's waiter queue
//! and observes the same outcome as the request that started it. The cycle itself
//! runs as a spawned task, so a caller that stops waiting cannot strand the queue.
//!
//! ```text
//! Idle ──(first 401)──▶ Refreshing ──▶ Succeeded ──▶ Idle
//!                           │
//!                           └──▶ Failed ──▶ Escalated ──▶ Idle
//!
//! The queue stays open until escalation has returned.
//! ```

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::auth::{CredentialKey, CredentialStore, SignOutHook};

use super::transport::{ApiRequest, Transport};

/// Why a refresh cycle could not produce a new access credential.
///
/// One value is fanned out to every waiter of the failed cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("no refresh credential in storage")]
    Unavailable,
    #[error("refresh endpoint responded {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("credential storage failed during refresh: {0}")]
    Storage(String),
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),
    #[error("refresh did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("refresh cycle ended without an outcome")]
    Abandoned,
}

/// What a waiter is handed when its cycle completes. A waiter whose sender is
/// still queued is pending.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Resolved(String),
    Rejected(RefreshFailure),
}

enum CycleState {
    Idle,
    Refreshing {
        cycle: u64,
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

pub(crate) struct RefreshCoordinator {
    state: Mutex<CycleState>,
    sign_out: RwLock<Option<Arc<dyn SignOutHook>>>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    refresh_path: String,
    timeout: Duration,
    next_cycle: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        refresh_path: String,
        timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(CycleState::Idle),
            sign_out: RwLock::new(None),
            store,
            transport,
            refresh_path,
            timeout,
            next_cycle: AtomicU64::new(1),
        }
    }

    pub(crate) fn register_sign_out(&self, hook: Arc<dyn SignOutHook>) {
        let previous = self
            .sign_out
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(hook);
        if previous.is_some() {
            debug!("sign-out hook replaced");
        } else {
            debug!("sign-out hook registered");
        }
    }

    /// Wait for a new access credential, starting a cycle if none is running.
    pub(crate) async fn refreshed_credential(self: &Arc<Self>) -> Result<String, RefreshFailure> {
        let (sender, receiver) = oneshot::channel();
        if let Some(cycle) = self.join_or_start(sender) {
            tokio::spawn(Arc::clone(self).run_cycle(cycle));
        }

        match receiver.await {
            Ok(RefreshOutcome::Resolved(token)) => Ok(token),
            Ok(RefreshOutcome::Rejected(failure)) => Err(failure),
            Err(_) => Err(RefreshFailure::Abandoned),
        }
    }

    /// Check-then-set in one step. Returns the cycle id when the caller started it.
    fn join_or_start(&self, sender: oneshot::Sender<RefreshOutcome>) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            CycleState::Refreshing { cycle, waiters } => {
                waiters.push(sender);
                debug!(cycle = *cycle, waiters = waiters.len(), "joined refresh in flight");
                None
            }
            CycleState::Idle => {
                let cycle = self.next_cycle.fetch_add(1, Ordering::Relaxed);
                *state = CycleState::Refreshing {
                    cycle,
                    waiters: vec![sender],
                };
                Some(cycle)
            }
        }
    }

    /// Reset to idle and take the queue in the same step.
    fn finish(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match mem::replace(&mut *state, CycleState::Idle) {
            CycleState::Refreshing { waiters, .. } => waiters,
            CycleState::Idle => Vec::new(),
        }
    }

    fn current_hook(&self) -> Option<Arc<dyn SignOutHook>> {
        self.sign_out
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) {
        let outcome = match self.refresh().await {
            Ok(token) => {
                info!(cycle, "access credential refreshed");
                RefreshOutcome::Resolved(token)
            }
            Err(failure) => {
                error!(cycle, %failure, "access credential refresh failed");
                RefreshOutcome::Rejected(failure)
            }
        };

        // Stays `Refreshing` until sign-out returns; late failures join this cycle.
        if let RefreshOutcome::Rejected(failure) = &outcome {
            self.escalate(cycle, failure).await;
        }

        let waiters = self.finish();
        debug!(cycle, waiters = waiters.len(), "draining refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn refresh(&self) -> Result<String, RefreshFailure> {
        let refresh_token = self
            .store
            .get(CredentialKey::RefreshToken)
            .await
            .map_err(|err| RefreshFailure::Storage(err.to_string()))?
            .ok_or(RefreshFailure::Unavailable)?;

        let request = ApiRequest::post(self.refresh_path.clone())
            .with_json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .map_err(|err| RefreshFailure::Transport(err.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.transport.send(&request))
            .await
            .map_err(|_| RefreshFailure::TimedOut(self.timeout))?
            .map_err(|err| RefreshFailure::Transport(err.to_string()))?;

        if !response.is_success() {
            return Err(RefreshFailure::Rejected {
                status: response.status(),
                body: response.text(),
            });
        }

        let payload: RefreshResponse = response
            .json()
            .map_err(|err| RefreshFailure::MalformedResponse(err.to_string()))?;

        self.store
            .set(CredentialKey::AccessToken, &payload.access)
            .await
            .map_err(|err| RefreshFailure::Storage(err.to_string()))?;
        if let Some(rotated) = &payload.refresh {
            self.store
                .set(CredentialKey::RefreshToken, rotated)
                .await
                .map_err(|err| RefreshFailure::Storage(err.to_string()))?;
            debug!("refresh credential rotated");
        }

        Ok(payload.access)
    }

    async fn escalate(&self, cycle: u64, failure: &RefreshFailure) {
        match self.current_hook() {
            Some(hook) => {
                info!(cycle, "signing out after irrecoverable refresh failure");
                if let Err(err) = hook.sign_out().await {
                    warn!(cycle, error = %err, "sign-out hook failed");
                }
            }
            None => {
                error!(
                    cycle,
                    %failure,
                    "no sign-out hook registered; session cannot be torn down automatically"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            CycleState::Refreshing { waiters, .. } => waiters.len(),
            CycleState::Idle => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_refreshing(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            CycleState::Refreshing { .. }
        )
    }
}

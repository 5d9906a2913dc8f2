use async_trait::async_trait;

use super::AuthError;

/// Session-layer callback invoked when the auth client gives up on local recovery.
///
/// Clearing stored credentials and resetting session state is the hook's job; the
/// auth client only calls it, at most once per failed refresh cycle. Errors are
/// logged by the caller and never reach the request that triggered escalation.
#[async_trait]
pub trait SignOutHook: Send + Sync {
    async fn sign_out(&self) -> Result<(), AuthError>;
}

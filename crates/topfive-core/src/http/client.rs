use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthError, CredentialKey, CredentialStore, SignOutHook};
use crate::config::ClientConfig;

use super::refresh::{RefreshCoordinator, RefreshFailure};
use super::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError};

/// Errors returned by the authenticated API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("credential storage error: {0}")]
    Storage(#[from] AuthError),
    #[error("authorization failed on {path} and the session could not be refreshed: {source}")]
    RefreshFailed {
        path: String,
        #[source]
        source: RefreshFailure,
    },
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl ApiError {
    /// The refresh failure behind this error, if the request was escalated.
    pub fn refresh_failure(&self) -> Option<&RefreshFailure> {
        match self {
            ApiError::RefreshFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Per-request state carried across the replay.
struct RequestContext {
    request: ApiRequest,
    /// Set once the request has been sent to the refresh coordinator.
    retried: bool,
    /// Credential handed out by the refresh cycle; wins over the stored one.
    credential: Option<String>,
}

impl RequestContext {
    fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
            credential: None,
        }
    }
}

enum Disposition {
    Deliver,
    Exhausted,
    Refresh,
}

/// API client that attaches the stored access credential to every request and
/// transparently refreshes it, once, when the backend rejects it.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthClient {
    /// Build a client that talks HTTP through `reqwest`.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> ApiResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, store, transport))
    }

    /// Build a client over a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            config.refresh_path.clone(),
            config.refresh_timeout,
        ));
        Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                transport,
                coordinator,
            }),
        }
    }

    /// Inject the session layer's sign-out hook.
    pub fn with_sign_out(self, hook: Arc<dyn SignOutHook>) -> Self {
        self.register_sign_out(hook);
        self
    }

    /// Replace the sign-out hook. Re-registration is an update, not an error.
    pub fn register_sign_out(&self, hook: Arc<dyn SignOutHook>) {
        self.inner.coordinator.register_sign_out(hook);
    }

    /// Send a request through the auth middleware.
    ///
    /// Every HTTP response other than a refreshable authorization failure is
    /// returned unchanged, whatever its status. A refreshable failure suspends the
    /// request until the refresh cycle resolves, then replays it exactly once with
    /// the new credential.
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let mut context = RequestContext::new(request);
        loop {
            let outbound = self.decorate(&context).await?;
            let response = self.inner.transport.send(&outbound).await?;

            match self.inspect(&context, &response) {
                Disposition::Deliver => return Ok(response),
                Disposition::Exhausted => {
                    debug!(
                        path = %context.request.path,
                        retried = context.retried,
                        "authorization failure not eligible for refresh"
                    );
                    return Ok(response);
                }
                Disposition::Refresh => {
                    warn!(
                        path = %context.request.path,
                        status = %response.status(),
                        "access credential rejected; refreshing"
                    );
                    context.retried = true;
                    let token = self
                        .inner
                        .coordinator
                        .refreshed_credential()
                        .await
                        .map_err(|source| ApiError::RefreshFailed {
                            path: context.request.path.clone(),
                            source,
                        })?;
                    context.credential = Some(token);
                }
            }
        }
    }

    /// GET `path` and decode a successful JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.execute(ApiRequest::get(path)).await?;
        Self::decode(response)
    }

    /// POST a JSON body to `path` and decode a successful JSON body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).with_json(body)?;
        let response = self.execute(request).await?;
        Self::decode(response)
    }

    /// Outbound hook: attach the refreshed or stored access credential.
    async fn decorate(&self, context: &RequestContext) -> ApiResult<ApiRequest> {
        let mut outbound = context.request.clone();
        let token = match &context.credential {
            Some(token) => Some(token.clone()),
            None => self.inner.store.get(CredentialKey::AccessToken).await?,
        };
        match token {
            Some(token) => outbound.set_bearer(&token)?,
            None => debug!(path = %outbound.path, "no access credential stored"),
        }
        Ok(outbound)
    }

    /// Inbound hook: decide what an HTTP response means for this request.
    fn inspect(&self, context: &RequestContext, response: &ApiResponse) -> Disposition {
        if !response.is_auth_failure() {
            return Disposition::Deliver;
        }
        if context.retried || self.inner.config.is_refresh_path(&context.request.path) {
            return Disposition::Exhausted;
        }
        Disposition::Refresh
    }

    fn decode<T: DeserializeOwned>(response: ApiResponse) -> ApiResult<T> {
        if !response.is_success() {
            return Err(ApiError::HttpStatus {
                status: response.status(),
                body: response.text(),
            });
        }
        Ok(response.json()?)
    }
}

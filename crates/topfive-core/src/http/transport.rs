use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ClientConfig;

/// Failures sending a request or reading its response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport failure: {0}")]
    Other(String),
}

/// A request relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Bearer credential currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    pub fn set_bearer(&mut self, token: &str) -> Result<(), TransportError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// A fully-read HTTP response. Any status is a valid response at this layer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn from_json<T: Serialize + ?Sized>(
        status: StatusCode,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(status, serde_json::to_vec(body)?))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.is_empty() {
            serde_json::from_slice(b"null")
        } else {
            serde_json::from_slice(&self.body)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The status the backend uses for an expired or invalid access credential.
    pub fn is_auth_failure(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

/// Sends a request on the wire. The auth middleware is composed around this.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let http = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.config.endpoint(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse::new(status, body))
    }
}

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::http::TransportError;

/// Errors surfaced by credential storage and the session layer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("credential store error: {0}")]
    Store(String),
    #[error("login rejected {status}: {body}")]
    LoginRejected { status: StatusCode, body: String },
    #[error("registration rejected {status}: {body}")]
    RegistrationRejected { status: StatusCode, body: String },
}

mod client;
mod refresh;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use client::{ApiError, ApiResult, AuthClient};
pub use refresh::RefreshFailure;
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError};

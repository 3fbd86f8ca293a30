//! Error - Failures reported by the Exoscale API client

use exoform_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("operation {id} failed: {message}")]
    OperationFailed { id: String, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(e: ApiError) -> Self {
        let kind = match &e {
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::InvalidRequest(_) => ErrorKind::Validation,
            _ => ErrorKind::Remote,
        };
        ProviderError::new(e.to_string()).with_kind(kind)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_keeps_kind() {
        let err: ProviderError = ApiError::NotFound.into();
        assert!(err.is_not_found());

        let err: ProviderError = ApiError::InvalidRequest("bad port".to_string()).into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "invalid request: bad port");

        let err: ProviderError = ApiError::Http {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Remote);
    }
}

//! Error types for the request pipeline.
//!
//! # Design
//! Three failure classes stay distinct so callers can branch on them:
//! - `ApiError`: the server answered with a status outside [200, 300).
//! - `CancelError`: the caller cancelled the request before it settled.
//! - `TransportError`: no usable answer came back (connect, DNS, timeout).
//!
//! `RequestError` wraps all of them plus local (de)serialization failures.

use serde_json::Value;
use thiserror::Error;

use crate::descriptor::ApiRequestOptions;
use crate::http::HttpResponse;

/// Envelope describing the outcome of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult {
    pub url: String,
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub body: Option<Value>,
}

/// The server returned a non-success status.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub body: Option<Value>,
    pub request: ApiRequestOptions,
    pub message: String,
}

impl ApiError {
    pub fn new(request: &ApiRequestOptions, result: ApiResult, message: impl Into<String>) -> Self {
        Self {
            url: result.url,
            status: result.status,
            status_text: result.status_text,
            body: result.body,
            request: request.clone(),
            message: message.into(),
        }
    }
}

/// The request was cancelled before it settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CancelError {
    pub message: String,
}

impl CancelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        true
    }
}

impl Default for CancelError {
    fn default() -> Self {
        Self::new("Request aborted")
    }
}

/// Failure reported by a transport. When the transport treats some statuses
/// as errors it still attaches the response so the pipeline can classify it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub response: Option<HttpResponse>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    pub fn with_response(message: impl Into<String>, response: HttpResponse) -> Self {
        Self {
            message: message.into(),
            response: Some(response),
        }
    }
}

/// Every way a pipeline request can fail.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cancelled(#[from] CancelError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl RequestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn cancel_error_defaults_to_request_aborted() {
        let err = CancelError::default();
        assert_eq!(err.to_string(), "Request aborted");
        assert!(err.is_cancelled());
        assert!(RequestError::from(err).is_cancelled());
    }

    #[test]
    fn api_error_carries_envelope_and_request() {
        let request = ApiRequestOptions::new(HttpMethod::Get, "/api/users/preferences");
        let result = ApiResult {
            url: "http://api/api/users/preferences".to_string(),
            ok: false,
            status: 404,
            status_text: "Not Found".to_string(),
            body: Some(Value::String("missing".to_string())),
        };
        let err = ApiError::new(&request, result, "Not Found");
        assert_eq!(err.to_string(), "Not Found");
        assert_eq!(err.status, 404);
        assert_eq!(err.request.url, "/api/users/preferences");

        let wrapped = RequestError::from(err);
        assert_eq!(wrapped.status(), Some(404));
        assert!(!wrapped.is_cancelled());
    }
}

//! Wiring for the backend API: shared config and the service registry.

use std::sync::Arc;

use crate::client::HttpClient;
use crate::config::{ApiConfig, Credentials, Headers, Resolver};
use crate::error::TransportError;
use crate::session::AuthSession;
use crate::users::UserService;

pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";
pub const SPAN_ID_HEADER: &str = "X-B3-SpanId";

/// Fresh B3 tracing ids: a 32 and a 16 lowercase hex digit id.
pub fn b3_headers() -> Headers {
    let trace_id = format!("{:032x}", rand::random::<u128>());
    let span_id = format!("{:016x}", rand::random::<u64>());
    vec![
        (TRACE_ID_HEADER.to_string(), trace_id),
        (SPAN_ID_HEADER.to_string(), span_id),
    ]
}

/// Config for the backend: API version `0`, cookies included, the session's
/// token and new tracing ids on every call.
pub fn backend_api_config(base: impl Into<String>, session: Arc<AuthSession>) -> ApiConfig {
    ApiConfig::new(base)
        .with_version("0")
        .with_credentials(Credentials::Include)
        .with_token(Resolver::from_fn(move |_| {
            let token = session.user_token().unwrap_or_default();
            async move { token }
        }))
        .with_headers(Resolver::from_fn(|_| async { b3_headers() }))
}

/// Every backend service, built over one client.
#[derive(Debug, Clone)]
pub struct Apis {
    pub user: UserService,
}

impl Apis {
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        Ok(Self::with_client(HttpClient::new(config)?))
    }

    pub fn with_client(client: HttpClient) -> Self {
        Self {
            user: UserService::new(client),
        }
    }
}

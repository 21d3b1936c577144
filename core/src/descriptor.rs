//! Declarative description of a single HTTP call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RequestError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Literal request payload. Form payloads live in
/// [`ApiRequestOptions::form_data`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Serialized as JSON, sent as `application/json`.
    Json(Value),
    /// Sent verbatim as `text/plain`.
    Text(String),
    /// Sent verbatim without a content type unless a media type is given.
    Binary(Vec<u8>),
}

/// Hooks around the transport call. Every hook is optional.
#[async_trait]
pub trait ApiMiddleware: Send + Sync {
    /// Rewrite the outgoing request.
    async fn request(&self, request: HttpRequest) -> HttpRequest {
        request
    }

    /// Rewrite a response the transport delivered.
    async fn response(&self, response: HttpResponse) -> HttpResponse {
        response
    }

    /// Observe a transport failure that still carried a response.
    async fn failure(&self, _error: &TransportError) {}
}

/// Immutable descriptor for one API call, consumed by [`crate::request`].
#[derive(Clone)]
pub struct ApiRequestOptions {
    pub method: HttpMethod,
    /// Path template relative to the configured base, with `{name}` tokens.
    pub url: String,
    pub path: Map<String, Value>,
    pub cookies: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub query: Map<String, Value>,
    pub form_data: Option<Map<String, Value>>,
    pub body: Option<Body>,
    pub media_type: Option<String>,
    /// When set and present on the response, its value replaces the body.
    pub response_header: Option<String>,
    /// Status code to message overrides used when classifying failures.
    pub errors: BTreeMap<u16, String>,
    pub middleware: Vec<Arc<dyn ApiMiddleware>>,
}

impl ApiRequestOptions {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            path: Map::new(),
            cookies: Map::new(),
            headers: Map::new(),
            query: Map::new(),
            form_data: None,
            body: None,
            media_type: None,
            response_header: None,
            errors: BTreeMap::new(),
            middleware: Vec::new(),
        }
    }

    pub fn path(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.path.insert(name.to_string(), value.into());
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn cookie(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.cookies.insert(name.to_string(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn form_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.form_data
            .get_or_insert_with(Map::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json_body<T: Serialize>(self, body: &T) -> Result<Self, RequestError> {
        let value =
            serde_json::to_value(body).map_err(|e| RequestError::Serialization(e.to_string()))?;
        Ok(self.body(Body::Json(value)))
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn response_header(mut self, name: impl Into<String>) -> Self {
        self.response_header = Some(name.into());
        self
    }

    pub fn error(mut self, status: u16, message: impl Into<String>) -> Self {
        self.errors.insert(status, message.into());
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn ApiMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl fmt::Debug for ApiRequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("cookies", &self.cookies)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("form_data", &self.form_data)
            .field("body", &self.body)
            .field("media_type", &self.media_type)
            .field("response_header", &self.response_header)
            .field("errors", &self.errors)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

//! The request pipeline: descriptor + config in, classified result out.
//!
//! # Design
//! Each stage is a free function so it can be tested on its own:
//! `get_url` and `get_headers` build the request, `get_request_body` encodes
//! the payload, `send_request` runs middleware around the transport, and
//! `catch_error_codes` classifies the result. [`request`] chains them inside a
//! [`CancelableFuture`]. Nothing here retries.

use std::sync::{Arc, LazyLock};

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cancelable::CancelableFuture;
use crate::config::{ApiConfig, Resolver};
use crate::descriptor::{ApiRequestOptions, Body};
use crate::error::{ApiError, ApiResult, RequestError, TransportError};
use crate::http::{find_header, set_header, HttpRequest, HttpResponse, RequestBody};
use crate::transport::Transport;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid"));

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub fn base64(input: &str) -> String {
    STANDARD.encode(input)
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Encode query parameters as `?k=v&...`, or `""` when nothing remains.
///
/// Arrays repeat the key, objects nest with `parent[child]`, and null values
/// or empty strings are dropped.
pub fn get_query_string(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        push_query_pair(&mut pairs, key, value);
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

fn push_query_pair(pairs: &mut Vec<String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(text) if text.is_empty() => {}
        Value::Array(items) => {
            for item in items {
                push_query_pair(pairs, key, item);
            }
        }
        Value::Object(fields) => {
            for (child, item) in fields {
                push_query_pair(pairs, &format!("{key}[{child}]"), item);
            }
        }
        scalar => pairs.push(format!(
            "{}={}",
            urlencoding::encode(key),
            urlencoding::encode(&to_text(scalar))
        )),
    }
}

/// Resolve the URL template against the config and the path parameters.
///
/// Tokens without a matching path entry are kept verbatim.
pub fn get_url(config: &ApiConfig, options: &ApiRequestOptions) -> String {
    let template = options.url.replacen("{api-version}", &config.version, 1);
    let path = PLACEHOLDER.replace_all(&template, |caps: &Captures| {
        let name = &caps[1];
        match options.path.get(name) {
            Some(value) => {
                let raw = to_text(value);
                match &config.encode_path {
                    Some(encoder) => encoder(&raw),
                    None => urlencoding::encode(&raw).into_owned(),
                }
            }
            None => {
                debug!("Unresolved path parameter {name} in {}", options.url);
                caps[0].to_string()
            }
        }
    });

    format!("{}{}{}", config.base, path, get_query_string(&options.query))
}

/// Flatten the form payload into multipart fields.
pub fn get_form_data(options: &ApiRequestOptions) -> Option<Vec<(String, String)>> {
    let form = options.form_data.as_ref()?;
    let mut fields = Vec::new();
    for (key, value) in form {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                fields.extend(items.iter().map(|item| (key.clone(), to_text(item))));
            }
            other => fields.push((key.clone(), to_text(other))),
        }
    }
    Some(fields)
}

pub fn get_request_body(options: &ApiRequestOptions) -> RequestBody {
    if let Some(fields) = get_form_data(options) {
        return RequestBody::Multipart(fields);
    }

    match &options.body {
        None => RequestBody::Empty,
        Some(Body::Json(value)) => RequestBody::Text(value.to_string()),
        Some(Body::Text(text)) => RequestBody::Text(text.clone()),
        Some(Body::Binary(bytes)) => RequestBody::Bytes(bytes.clone()),
    }
}

async fn resolve_opt<T: Clone + Send + 'static>(
    resolver: &Option<Resolver<T>>,
    options: &ApiRequestOptions,
) -> Option<T> {
    match resolver {
        Some(resolver) => Some(resolver.resolve(options).await),
        None => None,
    }
}

/// Build the outgoing headers.
///
/// Config headers and per-call headers merge case-insensitively over
/// `Accept: application/json`. A bearer token takes precedence over basic
/// credentials.
pub async fn get_headers(config: &ApiConfig, options: &ApiRequestOptions) -> Vec<(String, String)> {
    let (token, username, password, additional) = tokio::join!(
        resolve_opt(&config.token, options),
        resolve_opt(&config.username, options),
        resolve_opt(&config.password, options),
        resolve_opt(&config.headers, options),
    );

    let mut headers = Vec::new();
    set_header(&mut headers, "Accept", "application/json");
    for (name, value) in additional.unwrap_or_default() {
        set_header(&mut headers, &name, value);
    }
    for (name, value) in &options.headers {
        if !value.is_null() {
            set_header(&mut headers, name, to_text(value));
        }
    }

    let token = token.filter(|token| !token.is_empty());
    let username = username.filter(|username| !username.is_empty());
    let password = password.filter(|password| !password.is_empty());
    if let Some(token) = token {
        set_header(&mut headers, "Authorization", format!("Bearer {token}"));
    } else if let (Some(username), Some(password)) = (username, password) {
        let credentials = base64(&format!("{username}:{password}"));
        set_header(&mut headers, "Authorization", format!("Basic {credentials}"));
    }

    // Form payloads get their boundary-carrying Content-Type from the transport.
    if find_header(&headers, "Content-Type").is_none() && options.form_data.is_none() {
        let content_type = if options.body.is_some() && options.media_type.is_some() {
            options.media_type.clone()
        } else {
            match &options.body {
                Some(Body::Json(_)) => Some("application/json".to_string()),
                Some(Body::Text(_)) => Some("text/plain".to_string()),
                _ => None,
            }
        };
        if let Some(content_type) = content_type {
            set_header(&mut headers, "Content-Type", content_type);
        }
    }

    let cookies: Vec<String> = options
        .cookies
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| format!("{name}={}", to_text(value)))
        .collect();
    if !cookies.is_empty() {
        set_header(&mut headers, "Cookie", cookies.join("; "));
    }

    headers
}

/// Run middleware around the transport call.
///
/// A failure that still carries a response is handed to the failure
/// middleware and then returned as a normal response so status
/// classification stays in one place.
pub async fn send_request(
    options: &ApiRequestOptions,
    mut request: HttpRequest,
    transport: &dyn Transport,
) -> Result<HttpResponse, TransportError> {
    for middleware in &options.middleware {
        request = middleware.request(request).await;
    }

    match transport.send(request).await {
        Ok(mut response) => {
            for middleware in &options.middleware {
                response = middleware.response(response).await;
            }
            Ok(response)
        }
        Err(error) => match error.response.clone() {
            Some(response) => {
                for middleware in &options.middleware {
                    middleware.failure(&error).await;
                }
                Ok(response)
            }
            None => Err(error),
        },
    }
}

pub fn get_response_header(response: &HttpResponse, name: Option<&str>) -> Option<String> {
    name.and_then(|name| response.header(name)).map(str::to_string)
}

/// Parse the response body. 204 and empty bodies have no body; anything that
/// is not JSON comes back as a JSON string.
pub fn get_response_body(response: &HttpResponse) -> Option<Value> {
    if response.status == 204 || response.body.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(&response.body)
            .unwrap_or_else(|_| Value::String(response.body.clone())),
    )
}

fn default_error_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "Im a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Content",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(message)
}

/// Turn a non-success result into an `ApiError`.
///
/// Message priority: the descriptor's override for the status, then the
/// default table, then a generic message.
pub fn catch_error_codes(options: &ApiRequestOptions, result: &ApiResult) -> Result<(), ApiError> {
    if result.ok {
        return Ok(());
    }

    let message = options
        .errors
        .get(&result.status)
        .cloned()
        .or_else(|| default_error_message(result.status).map(str::to_string))
        .unwrap_or_else(|| {
            let status_text = if result.status_text.is_empty() {
                "unknown"
            } else {
                result.status_text.as_str()
            };
            let body = result
                .body
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "Unexpected error: status: {}; status text: {status_text}; body: {body}",
                result.status
            )
        });

    Err(ApiError::new(options, result.clone(), message))
}

/// Run the whole pipeline for one descriptor and decode the body into `T`.
pub async fn execute<T: DeserializeOwned>(
    config: &ApiConfig,
    options: &ApiRequestOptions,
    transport: &dyn Transport,
) -> Result<T, RequestError> {
    let url = get_url(config, options);
    let request = HttpRequest {
        method: options.method,
        url: url.clone(),
        headers: get_headers(config, options).await,
        body: get_request_body(options),
    };

    debug!(method = %options.method, url = %url, "Sending API request");
    let response = send_request(options, request, transport).await?;

    let body = get_response_header(&response, options.response_header.as_deref())
        .map(Value::String)
        .or_else(|| get_response_body(&response));
    let result = ApiResult {
        url,
        ok: is_success(response.status),
        status: response.status,
        status_text: response.status_text,
        body,
    };
    catch_error_codes(options, &result)?;

    serde_json::from_value(result.body.unwrap_or(Value::Null))
        .map_err(|e| RequestError::Deserialization(e.to_string()))
}

/// Start a request on the Tokio runtime and return it as a cancelable
/// future.
pub fn request<T>(
    config: Arc<ApiConfig>,
    options: ApiRequestOptions,
    transport: Arc<dyn Transport>,
) -> CancelableFuture<T>
where
    T: DeserializeOwned + Send + 'static,
{
    CancelableFuture::spawn(async move { execute(&config, &options, transport.as_ref()).await })
}

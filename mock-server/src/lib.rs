//! In-memory stand-in for the Waste Plus backend user API.
//!
//! # Design
//! Preferences are stored per user, keyed by `PROVIDER\username` taken from
//! the bearer token's claims. The token payload is decoded without signature
//! checks; this server exists so client tests have a real HTTP peer.
//! A form echo endpoint reports multipart fields and the `Content-Type`
//! headers exactly as they arrived.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

pub type Preferences = Map<String, Value>;

pub type Db = Arc<RwLock<HashMap<String, Preferences>>>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing or malformed bearer token")]
    Unauthorized,
    #[error("Invalid form payload: {0}")]
    BadForm(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadForm(_) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route(
            "/api/users/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/api/forms/echo", post(echo_form))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn get_preferences(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<Preferences>, AppError> {
    let user_id = user_id(&headers)?;
    info!("Retrieving preferences for user: {user_id}");
    let prefs = db.read().await;
    Ok(Json(prefs.get(&user_id).cloned().unwrap_or_default()))
}

async fn update_preferences(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<Preferences>,
) -> Result<StatusCode, AppError> {
    let user_id = user_id(&headers)?;
    info!("Saving preferences for user: {user_id}");
    db.write().await.insert(user_id, input);
    Ok(StatusCode::ACCEPTED)
}

/// Echo the text fields of a multipart form together with every
/// `Content-Type` header the request carried.
async fn echo_form(headers: HeaderMap, mut multipart: Multipart) -> Result<Json<Value>, AppError> {
    let content_types: Vec<&str> = headers
        .get_all(CONTENT_TYPE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let mut fields = Map::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadForm(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadForm(e.to_string()))?;
        fields.insert(name, Value::String(value));
    }
    info!("Echoing form with {} fields", fields.len());

    Ok(Json(json!({ "contentTypes": content_types, "fields": fields })))
}

/// Resolve `PROVIDER\username` from the bearer token payload.
pub fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let payload = token.split('.').nth(1).ok_or(AppError::Unauthorized)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AppError::Unauthorized)?;
    let claims: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|_| AppError::Unauthorized)?;

    let username = claims
        .get("custom:idp_username")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or(AppError::Unauthorized)?;
    let provider = claims
        .get("custom:idp_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_uppercase();

    Ok(format!("{provider}\\{username}"))
}

/// Build an unsigned compact token carrying `claims`, for tests and demos.
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

//! Calls against the backend `/api/users` resource.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cancelable::CancelableFuture;
use crate::client::HttpClient;
use crate::descriptor::ApiRequestOptions;
use crate::error::RequestError;
use crate::http::HttpMethod;
use crate::preference::{PreferenceApi, UserPreference};

const PREFERENCES_URL: &str = "/api/users/preferences";

#[derive(Debug, Clone)]
pub struct UserService {
    client: HttpClient,
}

impl UserService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Stored preferences of the signed-in user. `None` when the server
    /// answers without a body.
    pub fn get_user_preferences(&self) -> CancelableFuture<Option<Map<String, Value>>> {
        self.client
            .do_request(ApiRequestOptions::new(HttpMethod::Get, PREFERENCES_URL))
    }

    pub fn update_user_preferences(&self, preferences: &UserPreference) -> CancelableFuture<()> {
        match ApiRequestOptions::new(HttpMethod::Put, PREFERENCES_URL).json_body(preferences) {
            Ok(options) => self.client.do_request(options),
            Err(e) => CancelableFuture::new(|settle, _| {
                settle.reject(e);
            }),
        }
    }
}

#[async_trait]
impl PreferenceApi for UserService {
    async fn fetch(&self) -> Result<Map<String, Value>, RequestError> {
        Ok(self.get_user_preferences().await?.unwrap_or_default())
    }

    async fn store(&self, preferences: &UserPreference) -> Result<(), RequestError> {
        self.update_user_preferences(preferences).await
    }
}

//! Process-wide API settings and per-request value resolvers.
//!
//! # Design
//! Token, credentials and extra headers may be fixed or computed for every
//! request (a token that refreshes, tracing ids that must be unique).
//! `Resolver<T>` covers both cases and is evaluated once per request by the
//! pipeline.

use std::env;
use std::fmt::{self, Display};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{info, warn};

use crate::descriptor::ApiRequestOptions;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub type Headers = Vec<(String, String)>;

pub type ResolverFn<T> = Arc<dyn Fn(&ApiRequestOptions) -> BoxFuture<'static, T> + Send + Sync>;

pub type PathEncoder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A literal value or an async function producing one per request.
#[derive(Clone)]
pub enum Resolver<T> {
    Value(T),
    Dynamic(ResolverFn<T>),
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&ApiRequestOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Resolver::Dynamic(Arc::new(move |options: &ApiRequestOptions| f(options).boxed()))
    }

    pub async fn resolve(&self, options: &ApiRequestOptions) -> T {
        match self {
            Resolver::Value(value) => value.clone(),
            Resolver::Dynamic(resolver) => resolver(options).await,
        }
    }
}

impl<T> From<T> for Resolver<T> {
    fn from(value: T) -> Self {
        Resolver::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolver::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Cookie policy for cross-origin calls.
///
/// Only `Include` changes behavior: it sets `with_credentials`, which turns
/// on the transport's cookie store. Outside a browser there is no origin to
/// compare against, so `SameOrigin` and `Omit` both send no stored cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    Include,
    #[default]
    Omit,
    SameOrigin,
}

/// Settings shared by every request a client makes.
#[derive(Clone)]
pub struct ApiConfig {
    pub base: String,
    pub version: String,
    pub with_credentials: bool,
    pub credentials: Credentials,
    pub token: Option<Resolver<String>>,
    pub username: Option<Resolver<String>>,
    pub password: Option<Resolver<String>>,
    pub headers: Option<Resolver<Headers>>,
    /// Encoder for path parameter values. Defaults to URI component
    /// percent-encoding.
    pub encode_path: Option<PathEncoder>,
    /// Deadline handed to the transport.
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            version: String::new(),
            with_credentials: false,
            credentials: Credentials::default(),
            token: None,
            username: None,
            password: None,
            headers: None,
            encode_path: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read base URL, version and timeout from the environment, falling back
    /// to local defaults.
    pub fn from_env() -> Self {
        let base: String = try_load("WASTE_PLUS_BACKEND_URL", "http://localhost:8080");
        let version: String = try_load("WASTE_PLUS_API_VERSION", "0");
        let timeout_ms: u64 = try_load("WASTE_PLUS_API_TIMEOUT_MS", "60000");

        Self::new(base)
            .with_version(version)
            .with_timeout(Duration::from_millis(timeout_ms))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.with_credentials = credentials == Credentials::Include;
        self.credentials = credentials;
        self
    }

    pub fn with_token(mut self, token: impl Into<Resolver<String>>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<Resolver<String>>,
        password: impl Into<Resolver<String>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_headers(mut self, headers: impl Into<Resolver<Headers>>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn with_path_encoder(mut self, encoder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.encode_path = Some(Arc::new(encoder));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base", &self.base)
            .field("version", &self.version)
            .field("with_credentials", &self.with_credentials)
            .field("credentials", &self.credentials)
            .field("token", &self.token.as_ref().map(|_| ".."))
            .field("username", &self.username.as_ref().map(|_| ".."))
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("headers", &self.headers)
            .field("encode_path", &self.encode_path.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Read `key` from the environment, logging and falling back to `default`
/// when it is missing or does not parse.
pub(crate) fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value: {e}, using default: {default}");
            parse_default(default)
        }
    }
}

fn parse_default<T: FromStr>(default: &str) -> T
where
    T::Err: Display,
{
    match default.parse() {
        Ok(value) => value,
        Err(e) => panic!("built-in default {default:?} does not parse: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn options() -> ApiRequestOptions {
        ApiRequestOptions::new(HttpMethod::Get, "/")
    }

    #[tokio::test]
    async fn literal_resolver_returns_value() {
        let resolver: Resolver<String> = "x".to_string().into();
        assert_eq!(resolver.resolve(&options()).await, "x");
    }

    #[tokio::test]
    async fn dynamic_resolver_runs_per_call() {
        let resolver = Resolver::from_fn(|options: &ApiRequestOptions| {
            let url = options.url.clone();
            async move { format!("token-for-{url}") }
        });
        assert_eq!(resolver.resolve(&options()).await, "token-for-/");
    }

    #[test]
    fn new_trims_trailing_slash() {
        let config = ApiConfig::new("http://api/");
        assert_eq!(config.base, "http://api");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.credentials, Credentials::Omit);
    }

    #[test]
    fn include_credentials_sets_flag() {
        let config = ApiConfig::new("http://api").with_credentials(Credentials::Include);
        assert!(config.with_credentials);
    }

    #[test]
    fn other_credential_policies_leave_cookie_store_off() {
        for credentials in [Credentials::SameOrigin, Credentials::Omit] {
            let config = ApiConfig::new("http://api")
                .with_credentials(Credentials::Include)
                .with_credentials(credentials);
            assert!(!config.with_credentials);
            assert_eq!(config.credentials, credentials);
        }
    }

    #[test]
    fn try_load_falls_back_on_invalid_value() {
        std::env::set_var("WASTE_PLUS_TEST_TIMEOUT", "soon");
        let value: u64 = try_load("WASTE_PLUS_TEST_TIMEOUT", "250");
        assert_eq!(value, 250);
        std::env::remove_var("WASTE_PLUS_TEST_TIMEOUT");
    }
}

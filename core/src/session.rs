//! Signed-in user state, refreshed from a token source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::auth::{parse_token, user_token_from_cookies, AuthError, FamLoginUser, IdpProvider, Jwt};
use crate::config::try_load;

pub const REVALIDATE_PERIOD: Duration = Duration::from_secs(3 * 60);

/// Where identity tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn load(&self) -> Result<Jwt, AuthError>;

    /// Start a hosted login with the given provider name.
    async fn sign_in(&self, _provider: &str) {}

    async fn sign_out(&self) {}
}

/// Reads the token the hosted login left in a cookie header.
#[derive(Debug, Default)]
pub struct CookieTokenSource {
    client_id: String,
    cookies: RwLock<String>,
}

impl CookieTokenSource {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            cookies: RwLock::new(String::new()),
        }
    }

    /// Client id from `WASTE_PLUS_USER_POOLS_WEB_CLIENT_ID`.
    pub fn from_env() -> Self {
        let client_id: String = try_load("WASTE_PLUS_USER_POOLS_WEB_CLIENT_ID", "");
        Self::new(client_id)
    }

    pub fn set_cookies(&self, header: impl Into<String>) {
        *self.cookies.write() = header.into();
    }

    pub fn token(&self) -> Option<String> {
        user_token_from_cookies(&self.cookies.read(), &self.client_id)
    }
}

#[async_trait]
impl TokenSource for CookieTokenSource {
    async fn load(&self) -> Result<Jwt, AuthError> {
        let token = self.token().ok_or(AuthError::MissingToken)?;
        Jwt::decode(&token)
    }

    async fn sign_out(&self) {
        self.cookies.write().clear();
    }
}

pub struct AuthSession {
    source: Arc<dyn TokenSource>,
    zone: String,
    user: RwLock<Option<FamLoginUser>>,
    loading: AtomicBool,
}

impl AuthSession {
    pub fn new(source: Arc<dyn TokenSource>, zone: impl Into<String>) -> Self {
        Self {
            source,
            zone: zone.into(),
            user: RwLock::new(None),
            loading: AtomicBool::new(true),
        }
    }

    /// Zone from `WASTE_PLUS_ZONE`.
    pub fn from_env(source: Arc<dyn TokenSource>) -> Self {
        let zone: String = try_load("WASTE_PLUS_ZONE", "TEST");
        Self::new(source, zone)
    }

    /// Deployment name used in login provider ids. Numeric or empty zones
    /// (pull request builds) map to `TEST`.
    pub fn app_env(&self) -> String {
        let zone = self.zone.trim();
        if zone.is_empty() || zone.parse::<f64>().is_ok() {
            "TEST".to_string()
        } else {
            zone.to_uppercase()
        }
    }

    pub fn login_provider(&self, provider: IdpProvider) -> String {
        let suffix = match provider {
            IdpProvider::Idir => "IDIR",
            IdpProvider::BceidBusiness => "BCEIDBUSINESS",
        };
        format!("{}-{suffix}", self.app_env())
    }

    pub async fn login(&self, provider: IdpProvider) -> String {
        let name = self.login_provider(provider);
        self.source.sign_in(&name).await;
        name
    }

    pub async fn logout(&self) {
        self.source.sign_out().await;
        *self.user.write() = None;
    }

    /// Reload the token and replace the current user. Any failure signs the
    /// user out.
    pub async fn refresh_user_state(&self) -> Option<FamLoginUser> {
        self.loading.store(true, Ordering::SeqCst);
        let user = match self.source.load().await {
            Ok(jwt) => parse_token(Some(&jwt)),
            Err(e) => {
                debug!("No user session: {e}");
                None
            }
        };
        *self.user.write() = user.clone();
        self.loading.store(false, Ordering::SeqCst);
        user
    }

    pub fn user(&self) -> Option<FamLoginUser> {
        self.user.read().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn user_token(&self) -> Option<String> {
        self.user.read().as_ref().and_then(|user| user.auth_token.clone())
    }

    pub fn clients(&self) -> Vec<String> {
        self.user
            .read()
            .as_ref()
            .map(FamLoginUser::clients)
            .unwrap_or_default()
    }

    /// Refresh the user every `period` until the handle is aborted.
    pub fn spawn_revalidation(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                session.refresh_user_state().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Scripted {
        token: Mutex<Option<Jwt>>,
        loads: AtomicUsize,
        signed_in: Mutex<Vec<String>>,
        signed_out: AtomicBool,
    }

    #[async_trait]
    impl TokenSource for Scripted {
        async fn load(&self) -> Result<Jwt, AuthError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.token.lock().clone().ok_or(AuthError::MissingToken)
        }

        async fn sign_in(&self, provider: &str) {
            self.signed_in.lock().push(provider.to_string());
        }

        async fn sign_out(&self) {
            self.signed_out.store(true, Ordering::SeqCst);
        }
    }

    fn scripted_with_user() -> Arc<Scripted> {
        let claims = json!({
            "custom:idp_name": "idir",
            "custom:idp_username": "jdoe",
            "cognito:groups": ["WASTE_PLUS_DISTRICT_7"],
        });
        let source = Scripted::default();
        *source.token.lock() = Some(Jwt::from_claims(claims.as_object().cloned().unwrap()));
        Arc::new(source)
    }

    #[tokio::test]
    async fn refresh_loads_and_parses_user() {
        let session = AuthSession::new(scripted_with_user(), "dev");
        assert!(session.is_loading());

        let user = session.refresh_user_state().await.unwrap();
        assert_eq!(user.user_name, "jdoe");
        assert!(session.is_logged_in());
        assert!(!session.is_loading());
        assert_eq!(session.clients(), vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn failed_load_clears_user() {
        let source = scripted_with_user();
        let session = AuthSession::new(source.clone(), "dev");
        session.refresh_user_state().await;
        assert!(session.is_logged_in());

        *source.token.lock() = None;
        assert!(session.refresh_user_state().await.is_none());
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn logout_signs_out_and_clears_user() {
        let source = scripted_with_user();
        let session = AuthSession::new(source.clone(), "dev");
        session.refresh_user_state().await;

        session.logout().await;
        assert!(session.user().is_none());
        assert!(source.signed_out.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn login_uses_zone_prefixed_provider() {
        let source = scripted_with_user();
        let session = AuthSession::new(source.clone(), "prod");
        assert_eq!(session.login(IdpProvider::Idir).await, "PROD-IDIR");
        assert_eq!(session.login_provider(IdpProvider::BceidBusiness), "PROD-BCEIDBUSINESS");
        assert_eq!(*source.signed_in.lock(), vec!["PROD-IDIR".to_string()]);

        assert_eq!(AuthSession::new(source.clone(), "123").app_env(), "TEST");
        assert_eq!(AuthSession::new(source, "").app_env(), "TEST");
    }

    #[tokio::test(start_paused = true)]
    async fn revalidation_refreshes_periodically() {
        let source = scripted_with_user();
        let session = Arc::new(AuthSession::new(source.clone(), "dev"));

        let handle = session.spawn_revalidation(REVALIDATE_PERIOD);
        tokio::time::sleep(REVALIDATE_PERIOD * 2 + Duration::from_secs(1)).await;
        handle.abort();

        assert!(source.loads.load(Ordering::SeqCst) >= 2);
        assert!(session.is_logged_in());
    }

    #[tokio::test]
    async fn cookie_source_decodes_stored_token() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"custom:idp_username":"jdoe","custom:idp_name":"IDIR"}"#);
        let token = format!("h.{payload}.s");
        let source = Arc::new(CookieTokenSource::new("client"));
        source.set_cookies(format!(
            "CognitoIdentityServiceProvider.client.LastAuthUser=jdoe; CognitoIdentityServiceProvider.client.jdoe.idToken={token}"
        ));

        let session = AuthSession::new(source.clone(), "dev");
        let user = session.refresh_user_state().await.unwrap();
        assert_eq!(user.provider_username.as_deref(), Some("IDIR\\jdoe"));
        assert_eq!(session.user_token(), Some(token));

        session.logout().await;
        assert!(source.load().await.is_err());
    }
}

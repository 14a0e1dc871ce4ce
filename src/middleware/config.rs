use axum_extra::extract::cookie::Key;

use super::backend::SharedBackend;
use super::error::AuthError;
use super::state::AuthState;
use crate::client::{AuthConfig, build_http_client};
use crate::session::SessionBackend;

/// Cookie and routing settings shared by config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__autholas_session".into(),
            session_ttl_days: 30,
            secure_cookies: true,
            auth_path: "/api/auth".into(),
        }
    }
}

/// Autholas web integration configuration.
///
/// Required field (`client`) is a constructor parameter.
///
/// Use [`from_env()`](AutholasAuthConfig::from_env) for convention-based setup,
/// or [`new()`](AutholasAuthConfig::new) with `with_*` methods for full control.
pub struct AutholasAuthConfig {
    pub(super) client: AuthConfig,
    pub(super) settings: AuthSettings,
}

impl AutholasAuthConfig {
    /// Create config with the required client configuration.
    ///
    /// All optional fields use sensible defaults. Override with `with_*` methods.
    #[must_use]
    pub fn new(client: AuthConfig) -> Self {
        Self {
            client,
            settings: AuthSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// Reads everything [`AuthConfig::from_env`] reads, plus:
    /// - `DEV_AUTH`: Set to `"1"` or `"true"` to disable secure cookies
    /// - `COOKIE_KEY`: Cookie encryption key bytes
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client = AuthConfig::from_env().map_err(|e| AuthError::Config(e.to_string()))?;

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        Ok(Self::new(client)
            .with_cookie_key(cookie_key)
            .with_secure_cookies(!dev_auth))
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Build the runtime state shared by the auth routes and the
    /// [`AuthSession`](super::AuthSession) extractor.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn into_state<B: SessionBackend>(self, backend: B) -> Result<AuthState, AuthError> {
        let http = build_http_client(&self.client).map_err(|e| AuthError::Config(e.to_string()))?;
        Ok(AuthState {
            config: self.client.into(),
            http,
            backend: SharedBackend::new(backend),
            settings: self.settings,
        })
    }
}

use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::catalog::{self, DisplayMessage, ErrorCode};
use crate::error::Error;
use crate::session::{
    DEFAULT_CLIENT_TYPE, DEFAULT_NAMESPACE, Session, SessionBackend, SessionStore, truthy,
};
use crate::types::{Credentials, SessionId};

const DEFAULT_API_URL: &str = "https://autholas.nicholasdevs.xyz/api/auth/php";
const DEFAULT_USER_AGENT: &str = "Autholas-PHP-Client/2.0";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_REDIRECTS: usize = 3;
const SUCCESS_MESSAGE: &str = "Authentication successful";

/// Autholas client configuration.
///
/// The API key is the only required field; everything else has a default
/// that can be overridden with the `with_*` methods.
///
/// ```rust,ignore
/// use autholas::AuthConfig;
///
/// let config = AuthConfig::new("my-api-key")
///     .with_api_url("https://auth.example.com/api/auth/php".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) api_key: String,
    pub(crate) api_url: Url,
    pub(crate) user_agent: String,
    pub(crate) client_type: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) timeout: Duration,
    pub(crate) max_redirects: usize,
    pub(crate) session_namespace: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.parse().expect("valid default URL"),
            user_agent: DEFAULT_USER_AGENT.into(),
            client_type: DEFAULT_CLIENT_TYPE.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            session_namespace: DEFAULT_NAMESPACE.into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `AUTHOLAS_API_KEY`
    ///
    /// # Optional env vars
    /// - `AUTHOLAS_API_URL`: Override the authentication endpoint
    /// - `AUTHOLAS_USER_AGENT`
    /// - `AUTHOLAS_CLIENT_TYPE`
    /// - `AUTHOLAS_CONNECT_TIMEOUT_SECS`
    /// - `AUTHOLAS_TIMEOUT_SECS`
    /// - `AUTHOLAS_SESSION_NAMESPACE`: Prefix for persisted session keys
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_key = lookup("AUTHOLAS_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("AUTHOLAS_API_KEY is required".into()))?;

        let mut config = Self::new(api_key);

        if let Some(url_str) = lookup("AUTHOLAS_API_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("AUTHOLAS_API_URL: {e}")))?;
            config = config.with_api_url(url);
        }
        if let Some(agent) = lookup("AUTHOLAS_USER_AGENT") {
            config = config.with_user_agent(agent);
        }
        if let Some(client_type) = lookup("AUTHOLAS_CLIENT_TYPE") {
            config = config.with_client_type(client_type);
        }
        if let Some(secs) = lookup("AUTHOLAS_CONNECT_TIMEOUT_SECS") {
            config = config.with_connect_timeout(parse_secs("AUTHOLAS_CONNECT_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("AUTHOLAS_TIMEOUT_SECS") {
            config = config.with_timeout(parse_secs("AUTHOLAS_TIMEOUT_SECS", &secs)?);
        }
        if let Some(ns) = lookup("AUTHOLAS_SESSION_NAMESPACE") {
            config = config.with_session_namespace(ns);
        }

        Ok(config)
    }

    /// Override the authentication endpoint.
    #[must_use]
    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = url;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Override the client-type tag sent with every request (default: `"php"`).
    #[must_use]
    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the whole-request timeout (default: 30 s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Override the prefix of persisted session keys (default: `"autholas"`).
    #[must_use]
    pub fn with_session_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.session_namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    #[must_use]
    pub fn session_namespace(&self) -> &str {
        &self.session_namespace
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"[redacted]")
            .field("api_url", &self.api_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("client_type", &self.client_type)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("session_namespace", &self.session_namespace)
            .finish()
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, Error> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}

/// Request body posted to the authentication endpoint.
#[derive(Serialize)]
struct AuthRequest<'a> {
    api_key: &'a str,
    username: &'a str,
    password: &'a str,
    client_type: &'a str,
}

/// Response body from the authentication endpoint.
///
/// Every field is optional on the wire, and loosely typed values are
/// accepted: flags follow the same truthiness rule as stored session values,
/// and text fields of the wrong type are treated as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthResponse {
    #[serde(deserialize_with = "lenient_bool")]
    success: bool,
    #[serde(deserialize_with = "string_or_number")]
    session_token: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    expires_at: Option<String>,
    user: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    client_type: Option<String>,
    #[serde(deserialize_with = "lenient_flag")]
    hwid_locked: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    message: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    error: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    error_code: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(lenient_flag(deserializer)?.unwrap_or(false))
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Null) | None => None,
        Some(value) => Some(truthy(&value)),
    })
}

/// Successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AuthSuccess {
    pub session_token: String,
    /// Opaque user record as returned by the service.
    pub user: Map<String, Value>,
    pub expires_at: Option<String>,
    pub client_type: String,
    pub hwid_locked: bool,
    pub message: String,
}

/// Failed authentication, resolved through the error catalog.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct AuthFailure {
    pub error_code: ErrorCode,
    /// Raw diagnostic text (server message or local description).
    pub error_message: String,
    pub title: String,
    pub display_message: DisplayMessage,
}

impl AuthFailure {
    fn new(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        let error_message = error_message.into();
        let info = catalog::lookup(&error_code, Some(&error_message));
        Self::resolved(error_code, error_message, info)
    }

    /// Failure whose code came from the service rather than from this client.
    fn reported(error_code: ErrorCode, error_message: impl Into<String>) -> Self {
        let error_message = error_message.into();
        let info = catalog::lookup_reported(&error_code, Some(&error_message));
        Self::resolved(error_code, error_message, info)
    }

    fn resolved(error_code: ErrorCode, error_message: String, info: catalog::ErrorInfo) -> Self {
        Self {
            error_code,
            error_message,
            title: info.title.to_owned(),
            display_message: info.message,
        }
    }

    /// Remediation hints for this failure.
    #[must_use]
    pub fn troubleshooting_tips(&self) -> &'static [&'static str] {
        catalog::troubleshooting_tips(&self.error_code)
    }
}

/// Outcome of [`AuthClient::authenticate`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    Success(AuthSuccess),
    Failure(AuthFailure),
}

impl AuthResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn success(&self) -> Option<&AuthSuccess> {
        match self {
            Self::Success(s) => Some(s),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}

/// Autholas authentication client.
///
/// One instance tracks one caller's authentication state: it is updated by
/// a successful [`authenticate`](Self::authenticate) and reset by
/// [`logout`](Self::logout). Failures leave it untouched.
pub struct AuthClient {
    config: AuthConfig,
    http: reqwest::Client,
    session: Session,
}

impl AuthClient {
    /// Create a client with its own HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialised.
    pub fn new(config: AuthConfig) -> Result<Self, Error> {
        let http = build_http_client(&config)?;
        Ok(Self::from_http_client(config, http))
    }

    /// Create a client over an existing transport, e.g. one shared by every
    /// request of a web server. Build it with [`build_http_client`] to keep
    /// the configured timeouts and redirect policy.
    #[must_use]
    pub fn from_http_client(config: AuthConfig, http: reqwest::Client) -> Self {
        Self {
            session: Session {
                client_type: config.client_type.clone(),
                ..Session::default()
            },
            config,
            http,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate `username`/`password` against the service.
    ///
    /// Issues at most one request; every outcome, including transport
    /// failures, is reported through the returned [`AuthResult`].
    pub async fn authenticate(&mut self, username: &str, password: &str) -> AuthResult {
        let credentials = Credentials::new(username, password);
        let Some((username, password)) = credentials.trimmed() else {
            return failure(
                ErrorCode::MissingCredentials,
                "Username and password are required",
            );
        };

        let request = AuthRequest {
            api_key: &self.config.api_key,
            username,
            password,
            client_type: &self.config.client_type,
        };

        tracing::debug!(username = %username, url = %self.config.api_url, "Sending authentication request");

        let response = match self
            .http
            .post(self.config.api_url.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.config.user_agent)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return connection_failure(&e),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return connection_failure(&e),
        };

        if status.as_u16() >= 400 {
            let parsed = serde_json::from_str::<AuthResponse>(&body).unwrap_or_default();
            let error_message = parsed
                .error
                .unwrap_or_else(|| format!("HTTP Error {}", status.as_u16()));
            let error_code = parsed
                .error_code
                .map_or(ErrorCode::HttpError, |c| ErrorCode::parse(&c));
            return reported_failure(error_code, error_message);
        }

        let parsed = match parse_body(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Authentication server returned malformed JSON");
                return failure(ErrorCode::InvalidResponse, "Invalid server response format");
            }
        };

        if !parsed.success {
            let error_code = parsed
                .error_code
                .map_or(ErrorCode::Unknown, |c| ErrorCode::parse(&c));
            let error_message = parsed.error.unwrap_or_else(|| "Unknown error".into());
            return reported_failure(error_code, error_message);
        }

        self.session = Session {
            token: parsed.session_token.unwrap_or_default(),
            expires_at: parsed.expires_at.filter(|s| !s.is_empty()),
            authenticated: true,
            client_type: parsed
                .client_type
                .unwrap_or_else(|| self.config.client_type.clone()),
            hwid_locked: parsed.hwid_locked.unwrap_or(false),
        };

        tracing::info!(
            username = %username,
            client_type = %self.session.client_type,
            "Authentication successful"
        );

        AuthResult::Success(AuthSuccess {
            session_token: self.session.token.clone(),
            user: match parsed.user {
                Some(Value::Object(user)) => user,
                _ => Map::new(),
            },
            expires_at: self.session.expires_at.clone(),
            client_type: self.session.client_type.clone(),
            hwid_locked: self.session.hwid_locked,
            message: parsed.message.unwrap_or_else(|| SUCCESS_MESSAGE.into()),
        })
    }

    /// Whether the current session is authenticated and unexpired.
    #[must_use]
    pub fn is_session_valid(&self) -> bool {
        self.session.is_valid()
    }

    #[must_use]
    pub fn session_token(&self) -> &str {
        &self.session.token
    }

    /// Expiry as sent by the server; `None` means no expiration.
    #[must_use]
    pub fn session_expires(&self) -> Option<&str> {
        self.session.expires_at.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.authenticated
    }

    #[must_use]
    pub fn client_type(&self) -> &str {
        &self.session.client_type
    }

    #[must_use]
    pub fn is_hwid_locked(&self) -> bool {
        self.session.hwid_locked
    }

    /// Snapshot of the current session state.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Bind `backend` to `id` using this client's key namespace.
    #[must_use]
    pub fn session_store<'a, B: SessionBackend>(
        &self,
        backend: &'a B,
        id: SessionId,
    ) -> SessionStore<'a, B> {
        SessionStore::with_namespace(backend, id, &self.config.session_namespace)
    }

    /// Reset local state and clear the persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store cannot be cleared. Local state
    /// is reset either way.
    pub async fn logout<B: SessionBackend>(&mut self, store: &SessionStore<'_, B>) -> Result<(), Error> {
        self.session = Session {
            client_type: self.config.client_type.clone(),
            ..Session::default()
        };
        store.clear().await?;
        tracing::info!(session_id = %store.id(), "Logged out");
        Ok(())
    }

    /// Persist the current session state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store rejects the write.
    pub async fn store_in_session<B: SessionBackend>(
        &self,
        store: &SessionStore<'_, B>,
    ) -> Result<(), Error> {
        store.save(&self.session).await
    }

    /// Adopt a previously persisted session, if any.
    ///
    /// Returns whether the adopted session is currently valid; `false` when
    /// nothing was stored (local state is then left as is).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the store cannot be read.
    pub async fn load_from_session<B: SessionBackend>(
        &mut self,
        store: &SessionStore<'_, B>,
    ) -> Result<bool, Error> {
        match store.load().await? {
            Some(session) => {
                self.session = session;
                Ok(self.is_session_valid())
            }
            None => Ok(false),
        }
    }

    /// Remediation hints for an error code.
    #[must_use]
    pub fn troubleshooting_tips(&self, code: &ErrorCode) -> &'static [&'static str] {
        catalog::troubleshooting_tips(code)
    }
}

/// Build the HTTP transport described by `config`.
///
/// TLS certificate and hostname verification stay enabled.
///
/// # Errors
///
/// Returns [`Error::Http`] if the TLS backend cannot be initialised.
pub fn build_http_client(config: &AuthConfig) -> Result<reqwest::Client, Error> {
    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()?;
    Ok(http)
}

/// Body of a non-error response. Valid JSON that is not an object is
/// treated as an empty (unsuccessful) response.
fn parse_body(body: &str) -> Result<AuthResponse, serde_json::Error> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::Object(_) => serde_json::from_value(value),
        _ => Ok(AuthResponse::default()),
    }
}

fn failure(error_code: ErrorCode, error_message: impl Into<String>) -> AuthResult {
    log_failure(AuthFailure::new(error_code, error_message))
}

fn reported_failure(error_code: ErrorCode, error_message: impl Into<String>) -> AuthResult {
    log_failure(AuthFailure::reported(error_code, error_message))
}

fn log_failure(failure: AuthFailure) -> AuthResult {
    tracing::warn!(error_code = %failure.error_code, "Authentication failed");
    AuthResult::Failure(failure)
}

fn connection_failure(e: &reqwest::Error) -> AuthResult {
    tracing::warn!(error = %e, timeout = e.is_timeout(), "Authentication request failed");
    failure(ErrorCode::ConnectionError, format!("Connection error: {e}"))
}

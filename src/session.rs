//! Authenticated-session state and its server-side persistence.
//!
//! A [`Session`] is the snapshot the client keeps after a successful login.
//! It is persisted through a [`SessionBackend`], a keyed store scoped by
//! [`SessionId`] that the consumer provides (or [`MemorySessionBackend`]).

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tokio::sync::RwLock;

use crate::error::Error;
use crate::types::SessionId;

/// Client type reported when the server does not send one.
pub const DEFAULT_CLIENT_TYPE: &str = "php";

/// Default key prefix for persisted session fields.
pub const DEFAULT_NAMESPACE: &str = "autholas";

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Authenticated session snapshot.
///
/// `authenticated == true` implies a non-empty `token` for any session this
/// crate produces; [`Session::is_valid`] checks it regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Server-supplied expiry. `None` (or empty) means no expiration.
    pub expires_at: Option<String>,
    pub authenticated: bool,
    pub client_type: String,
    pub hwid_locked: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: String::new(),
            expires_at: None,
            authenticated: false,
            client_type: DEFAULT_CLIENT_TYPE.to_owned(),
            hwid_locked: false,
        }
    }
}

impl Session {
    /// Whether the session is usable right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Whether the session is usable at `now`.
    ///
    /// An empty or missing expiry never expires. A non-empty expiry that
    /// cannot be parsed counts as expired.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        if !self.authenticated || self.token.is_empty() {
            return false;
        }
        match self.expires_at.as_deref() {
            None | Some("") => true,
            Some(raw) => parse_expiry(raw).is_some_and(|expires| now < expires),
        }
    }
}

/// Parse a server expiry timestamp.
///
/// Accepts RFC 3339, ISO 8601 with a `+hhmm` offset or with no offset at
/// all, `YYYY-MM-DD HH:MM:SS[.ffffff]`, `YYYY-MM-DD`, and integer Unix
/// seconds. Timestamps without an offset are read as UTC.
#[must_use]
pub fn parse_expiry(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    if let Ok(t) = OffsetDateTime::parse(
        raw,
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]][offset_hour sign:mandatory][offset_minute]"
        ),
    ) {
        return Some(t);
    }
    let naive = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    ];
    if let Some(t) = naive
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(raw, *format).ok())
    {
        return Some(t.assume_utc());
    }
    if let Ok(d) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(d.midnight().assume_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
}

/// Consumer-provided keyed session storage.
///
/// Each [`SessionId`] owns an independent key space. A scope is "active"
/// once [`start`](SessionBackend::start) has been called for it.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionBackend for RedisSessions {
///     async fn get(&self, id: &SessionId, key: &str) -> Result<Option<Value>, ...> {
///         let raw: Option<String> = self.conn().hget(id.as_str(), key).await?;
///         Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
///     }
///     // ...
/// }
/// ```
pub trait SessionBackend: Send + Sync + 'static {
    /// Whether a session scope exists for `id`.
    fn is_active(&self, id: &SessionId) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// Create the scope for `id` if it does not exist yet.
    fn start(&self, id: &SessionId) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn get(
        &self,
        id: &SessionId,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, BoxError>> + Send;

    fn set(
        &self,
        id: &SessionId,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn remove(&self, id: &SessionId, key: &str) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// In-process [`SessionBackend`].
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    scopes: RwLock<HashMap<SessionId, HashMap<String, Value>>>,
}

impl MemorySessionBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the whole scope for `id`.
    pub async fn destroy(&self, id: &SessionId) {
        self.scopes.write().await.remove(id);
    }
}

impl SessionBackend for MemorySessionBackend {
    async fn is_active(&self, id: &SessionId) -> Result<bool, BoxError> {
        Ok(self.scopes.read().await.contains_key(id))
    }

    async fn start(&self, id: &SessionId) -> Result<(), BoxError> {
        self.scopes.write().await.entry(id.clone()).or_default();
        Ok(())
    }

    async fn get(&self, id: &SessionId, key: &str) -> Result<Option<Value>, BoxError> {
        Ok(self
            .scopes
            .read()
            .await
            .get(id)
            .and_then(|scope| scope.get(key).cloned()))
    }

    async fn set(&self, id: &SessionId, key: &str, value: Value) -> Result<(), BoxError> {
        let mut scopes = self.scopes.write().await;
        let scope = scopes
            .get_mut(id)
            .ok_or_else(|| format!("session {id} is not active"))?;
        scope.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, id: &SessionId, key: &str) -> Result<(), BoxError> {
        if let Some(scope) = self.scopes.write().await.get_mut(id) {
            scope.remove(key);
        }
        Ok(())
    }
}

/// Fixed key names under a namespace.
#[derive(Debug, Clone)]
struct SessionKeys {
    token: String,
    authenticated: String,
    expires: String,
    client_type: String,
    hwid_locked: String,
}

impl SessionKeys {
    fn new(namespace: &str) -> Self {
        Self {
            token: format!("{namespace}_token"),
            authenticated: format!("{namespace}_authenticated"),
            expires: format!("{namespace}_expires"),
            client_type: format!("{namespace}_client_type"),
            hwid_locked: format!("{namespace}_hwid_locked"),
        }
    }

    fn all(&self) -> [&str; 5] {
        [
            &self.token,
            &self.authenticated,
            &self.expires,
            &self.client_type,
            &self.hwid_locked,
        ]
    }
}

/// One caller's view of a [`SessionBackend`].
pub struct SessionStore<'a, B> {
    backend: &'a B,
    id: SessionId,
    keys: SessionKeys,
}

impl<'a, B: SessionBackend> SessionStore<'a, B> {
    /// Bind `backend` to the scope `id` using the default namespace.
    #[must_use]
    pub fn new(backend: &'a B, id: SessionId) -> Self {
        Self::with_namespace(backend, id, DEFAULT_NAMESPACE)
    }

    #[must_use]
    pub fn with_namespace(backend: &'a B, id: SessionId, namespace: &str) -> Self {
        Self {
            backend,
            id,
            keys: SessionKeys::new(namespace),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Write every session field, starting the scope if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the backend fails.
    pub async fn save(&self, session: &Session) -> Result<(), Error> {
        let backend = self.backend;
        if !backend.is_active(&self.id).await.map_err(Error::session)? {
            backend.start(&self.id).await.map_err(Error::session)?;
        }

        let fields = [
            (&self.keys.token, Value::from(session.token.as_str())),
            (&self.keys.authenticated, Value::from(session.authenticated)),
            (
                &self.keys.expires,
                Value::from(session.expires_at.as_deref().unwrap_or_default()),
            ),
            (&self.keys.client_type, Value::from(session.client_type.as_str())),
            (&self.keys.hwid_locked, Value::from(session.hwid_locked)),
        ];
        for (key, value) in fields {
            backend
                .set(&self.id, key, value)
                .await
                .map_err(Error::session)?;
        }

        tracing::debug!(session_id = %self.id, "Session stored");
        Ok(())
    }

    /// Read the stored session, if one was saved as authenticated.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the backend fails.
    pub async fn load(&self) -> Result<Option<Session>, Error> {
        let backend = self.backend;
        if !backend.is_active(&self.id).await.map_err(Error::session)? {
            return Ok(None);
        }

        let authenticated = self.get(&self.keys.authenticated).await?;
        if !authenticated.as_ref().is_some_and(truthy) {
            return Ok(None);
        }

        let token = self.get_string(&self.keys.token).await?.unwrap_or_default();
        let expires_at = self
            .get_string(&self.keys.expires)
            .await?
            .filter(|s| !s.is_empty());
        let client_type = self
            .get_string(&self.keys.client_type)
            .await?
            .unwrap_or_else(|| DEFAULT_CLIENT_TYPE.to_owned());
        let hwid_locked = self
            .get(&self.keys.hwid_locked)
            .await?
            .as_ref()
            .is_some_and(truthy);

        Ok(Some(Session {
            token,
            expires_at,
            authenticated: true,
            client_type,
            hwid_locked,
        }))
    }

    /// Remove every session key. A no-op when the scope does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the backend fails.
    pub async fn clear(&self) -> Result<(), Error> {
        let backend = self.backend;
        if !backend.is_active(&self.id).await.map_err(Error::session)? {
            return Ok(());
        }
        for key in self.keys.all() {
            backend
                .remove(&self.id, key)
                .await
                .map_err(Error::session)?;
        }
        tracing::debug!(session_id = %self.id, "Session cleared");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        self.backend
            .get(&self.id, key)
            .await
            .map_err(Error::session)
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(match self.get(key).await? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }
}

/// Loose truthiness for flags written by other clients of the same store.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn authenticated(token: &str, expires_at: Option<&str>) -> Session {
        Session {
            token: token.into(),
            expires_at: expires_at.map(Into::into),
            authenticated: true,
            ..Session::default()
        }
    }

    #[test]
    fn default_session_is_invalid() {
        let session = Session::default();
        assert!(!session.is_valid());
        assert_eq!(session.client_type, "php");
    }

    #[test]
    fn authenticated_with_empty_token_is_invalid() {
        assert!(!authenticated("", None).is_valid());
    }

    #[test]
    fn missing_or_empty_expiry_never_expires() {
        let far_future = datetime!(9999-01-01 0:00 UTC);
        assert!(authenticated("abc", None).is_valid_at(far_future));
        assert!(authenticated("abc", Some("")).is_valid_at(far_future));
    }

    #[test]
    fn past_expiry_is_invalid() {
        assert!(!authenticated("abc", Some("2000-01-01T00:00:00Z")).is_valid());
    }

    #[test]
    fn future_expiry_is_valid_until_it_passes() {
        let session = authenticated("abc", Some("2030-06-01T12:00:00Z"));
        assert!(session.is_valid_at(datetime!(2030-06-01 11:59:59 UTC)));
        assert!(!session.is_valid_at(datetime!(2030-06-01 12:00:00 UTC)));
    }

    // Empty expiry means "forever", but garbage means "expired".
    #[test]
    fn unparseable_expiry_counts_as_expired() {
        let session = authenticated("abc", Some("not a date"));
        assert!(!session.is_valid_at(datetime!(1970-01-02 0:00 UTC)));
    }

    #[test]
    fn parse_expiry_formats() {
        assert_eq!(
            parse_expiry("2030-06-01T12:00:00+02:00"),
            Some(datetime!(2030-06-01 10:00 UTC))
        );
        assert_eq!(
            parse_expiry("2030-06-01 12:00:00"),
            Some(datetime!(2030-06-01 12:00 UTC))
        );
        assert_eq!(
            parse_expiry("2030-06-01"),
            Some(datetime!(2030-06-01 0:00 UTC))
        );
        assert_eq!(parse_expiry("0"), Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(parse_expiry("tomorrow-ish"), None);
    }

    #[test]
    fn parse_expiry_iso8601_without_offset_is_utc() {
        assert_eq!(
            parse_expiry("2099-01-01T00:00:00"),
            Some(datetime!(2099-01-01 0:00 UTC))
        );
        assert_eq!(
            parse_expiry("2099-01-01T00:00:00.250"),
            Some(datetime!(2099-01-01 0:00:00.25 UTC))
        );
    }

    #[test]
    fn parse_expiry_compact_offset() {
        assert_eq!(
            parse_expiry("2099-01-01T00:00:00+0000"),
            Some(datetime!(2099-01-01 0:00 UTC))
        );
        assert_eq!(
            parse_expiry("2099-01-01T02:00:00+0200"),
            Some(datetime!(2099-01-01 0:00 UTC))
        );
    }

    #[test]
    fn parse_expiry_fractional_seconds_with_space() {
        assert_eq!(
            parse_expiry("2099-01-01 00:00:00.000000"),
            Some(datetime!(2099-01-01 0:00 UTC))
        );
        assert_eq!(
            parse_expiry("2099-01-01 00:00:00.5"),
            Some(datetime!(2099-01-01 0:00:00.5 UTC))
        );
    }

    #[test]
    fn far_future_expiry_shapes_stay_valid() {
        let now = datetime!(2030-01-01 0:00 UTC);
        for raw in [
            "2099-01-01T00:00:00",
            "2099-01-01T00:00:00+0000",
            "2099-01-01 00:00:00.000000",
        ] {
            let session = Session {
                token: "abc".into(),
                expires_at: Some(raw.into()),
                authenticated: true,
                ..Session::default()
            };
            assert!(session.is_valid_at(now), "{raw}");
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let backend = MemorySessionBackend::new();
        let store = SessionStore::new(&backend, SessionId::from("s1"));
        let session = Session {
            token: "abc".into(),
            expires_at: Some("2030-01-01T00:00:00Z".into()),
            authenticated: true,
            client_type: "php".into(),
            hwid_locked: true,
        };

        store.save(&session).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn keys_use_namespace() {
        let backend = MemorySessionBackend::new();
        let id = SessionId::from("s1");
        let store = SessionStore::with_namespace(&backend, id.clone(), "app");
        store.save(&authenticated("tok", None)).await.unwrap();

        assert_eq!(
            backend.get(&id, "app_token").await.unwrap(),
            Some(Value::from("tok"))
        );
        assert_eq!(
            backend.get(&id, "app_authenticated").await.unwrap(),
            Some(Value::from(true))
        );
        assert_eq!(
            backend.get(&id, "app_expires").await.unwrap(),
            Some(Value::from(""))
        );
    }

    #[tokio::test]
    async fn clear_then_load_is_absent() {
        let backend = MemorySessionBackend::new();
        let store = SessionStore::new(&backend, SessionId::from("s1"));
        store.save(&authenticated("abc", None)).await.unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // idempotent
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn clear_without_scope_is_noop() {
        let backend = MemorySessionBackend::new();
        let store = SessionStore::new(&backend, SessionId::from("never-started"));
        store.clear().await.unwrap();
        assert!(!backend.is_active(store.id()).await.unwrap());
    }

    #[tokio::test]
    async fn load_without_scope_is_absent() {
        let backend = MemorySessionBackend::new();
        let store = SessionStore::new(&backend, SessionId::from("nobody"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unauthenticated_session_loads_as_absent() {
        let backend = MemorySessionBackend::new();
        let store = SessionStore::new(&backend, SessionId::from("s1"));
        store.save(&Session::default()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_fills_defaults_for_missing_fields() {
        let backend = MemorySessionBackend::new();
        let id = SessionId::from("s1");
        backend.start(&id).await.unwrap();
        backend
            .set(&id, "autholas_authenticated", Value::from(true))
            .await
            .unwrap();

        let loaded = SessionStore::new(&backend, id).load().await.unwrap().unwrap();
        assert_eq!(
            loaded,
            Session {
                authenticated: true,
                ..Session::default()
            }
        );
        assert!(!loaded.is_valid());
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let backend = MemorySessionBackend::new();
        let alice = SessionStore::new(&backend, SessionId::from("alice"));
        let bob = SessionStore::new(&backend, SessionId::from("bob"));
        alice.save(&authenticated("a-token", None)).await.unwrap();

        assert_eq!(bob.load().await.unwrap(), None);
        bob.clear().await.unwrap();
        assert!(alice.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn destroyed_scope_loads_as_absent() {
        let backend = MemorySessionBackend::new();
        let id = SessionId::from("s1");
        let store = SessionStore::new(&backend, id.clone());
        store.save(&authenticated("abc", None)).await.unwrap();

        backend.destroy(&id).await;
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[test]
    fn truthy_matches_loose_flags() {
        assert!(truthy(&Value::from(true)));
        assert!(truthy(&Value::from(1)));
        assert!(truthy(&Value::from("1")));
        assert!(!truthy(&Value::from(false)));
        assert!(!truthy(&Value::from(0)));
        assert!(!truthy(&Value::from("0")));
        assert!(!truthy(&Value::from("")));
        assert!(!truthy(&Value::Null));
    }
}

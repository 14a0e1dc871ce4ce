use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::backend::SharedBackend;
use super::config::AuthSettings;
use crate::client::{AuthClient, AuthConfig};
use crate::session::SessionStore;
use crate::types::SessionId;

/// Shared state for auth route handlers and the [`AuthSession`](super::AuthSession) extractor.
///
/// Embed it in your own state and implement `FromRef` to use the extractor
/// on your routes.
#[derive(Clone)]
pub struct AuthState {
    pub(super) config: Arc<AuthConfig>,
    pub(super) http: reqwest::Client,
    pub(super) backend: SharedBackend,
    pub(super) settings: AuthSettings,
}

impl AuthState {
    /// A fresh client for one request. Clients carry per-caller state and
    /// are never shared between requests.
    pub(super) fn client(&self) -> AuthClient {
        AuthClient::from_http_client((*self.config).clone(), self.http.clone())
    }

    pub(super) fn store(&self, id: SessionId) -> SessionStore<'_, SharedBackend> {
        SessionStore::with_namespace(&self.backend, id, self.config.session_namespace())
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.settings.cookie_key.clone()
    }
}

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;

use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use crate::session::Session;
use crate::types::SessionId;

/// Authenticated session extracted from the session cookie.
///
/// Use as an Axum extractor in route handlers. Returns `401 Unauthorized`
/// if no session is stored or the stored one has expired.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(auth: AuthSession) -> impl IntoResponse {
///     format!("Hello, {} client", auth.session.client_type)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(auth: Option<AuthSession>) -> impl IntoResponse {
///     match auth {
///         Some(_) => "Welcome back",
///         None => "Hello, guest",
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Session ID (from cookie).
    pub session_id: SessionId,
    /// Stored session, valid at extraction time.
    pub session: Session,
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.settings.cookie_key.clone());

        let session_id = cookies::get_session_id(&jar, &state.settings.session_cookie_name)
            .ok_or(AuthError::Unauthenticated)?;

        resolve_session(&state, session_id).await
    }
}

/// `Option<AuthSession>` yields `None` for anonymous or expired sessions;
/// store failures are still rejected.
impl<S> OptionalFromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Self as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(auth) => Ok(Some(auth)),
            Err(AuthError::Unauthenticated | AuthError::SessionExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Load and validate the session stored under `session_id`.
///
/// # Errors
///
/// [`AuthError::Unauthenticated`] if nothing is stored,
/// [`AuthError::SessionExpired`] if the stored session is no longer valid.
pub async fn resolve_session(
    state: &AuthState,
    session_id: SessionId,
) -> Result<AuthSession, AuthError> {
    let session = state
        .store(session_id.clone())
        .load()
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    if !session.is_valid() {
        tracing::debug!(session_id = %session_id, "Stored session expired");
        return Err(AuthError::SessionExpired);
    }

    Ok(AuthSession {
        session_id,
        session,
    })
}

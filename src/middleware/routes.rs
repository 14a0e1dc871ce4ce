use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;

use super::config::AutholasAuthConfig;
use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use super::types::{LoginFailureBody, LoginSuccessBody, SessionStatus};
use crate::catalog::ErrorCode;
use crate::client::{AuthFailure, AuthResult};
use crate::session::SessionBackend;
use crate::types::{Credentials, SessionId};

/// Create the Autholas authentication router.
///
/// # Errors
///
/// Returns [`AuthError::Config`] if the HTTP client cannot be built.
pub fn auth_routes<B>(config: AutholasAuthConfig, backend: B) -> Result<Router, AuthError>
where
    B: SessionBackend,
{
    let state = config.into_state(backend)?;
    Ok(auth_router(state))
}

/// Create the router over an existing [`AuthState`].
pub fn auth_router(state: AuthState) -> Router {
    let auth_path = state.settings.auth_path.clone();

    Router::new()
        .route(&format!("{auth_path}/login"), post(login))
        .route(&format!("{auth_path}/logout"), post(logout))
        .route(&format!("{auth_path}/session"), get(session_status))
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Json(credentials): Json<Credentials>,
) -> Result<(PrivateCookieJar, Response), AuthError> {
    let mut client = state.client();

    let success = match client
        .authenticate(&credentials.username, &credentials.password)
        .await
    {
        AuthResult::Success(success) => success,
        AuthResult::Failure(failure) => return Ok((jar, login_failure(&failure))),
    };

    // Drop whatever the previous cookie pointed at; a login always gets a fresh ID.
    if let Some(previous) = cookies::get_session_id(&jar, &state.settings.session_cookie_name) {
        if let Err(e) = state.store(previous).clear().await {
            tracing::warn!(error = %e, "Clearing previous session failed during login");
        }
    }

    let session_id = SessionId::generate();
    client
        .store_in_session(&state.store(session_id.clone()))
        .await?;

    let session_cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session_id,
        state.settings.session_ttl_days,
        state.settings.secure_cookies,
    );

    tracing::info!(session_id = %session_id, "Autholas login successful");

    let body = LoginSuccessBody {
        success: true,
        result: &success,
    };
    Ok((jar.add(session_cookie), Json(body).into_response()))
}

fn login_failure(failure: &AuthFailure) -> Response {
    let status = match failure.error_code {
        ErrorCode::MissingCredentials => StatusCode::BAD_REQUEST,
        ErrorCode::ConnectionError | ErrorCode::InvalidResponse => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNAUTHORIZED,
    };
    (status, Json(LoginFailureBody::new(failure))).into_response()
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, StatusCode) {
    if let Some(session_id) = cookies::get_session_id(&jar, &state.settings.session_cookie_name) {
        let mut client = state.client();
        if let Err(e) = client.logout(&state.store(session_id)).await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        }
    }

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), StatusCode::NO_CONTENT)
}

// ── Session status ─────────────────────────────────────────────────

async fn session_status(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
) -> Result<Json<SessionStatus>, AuthError> {
    let mut status = SessionStatus {
        authenticated: false,
        valid: false,
        client_type: None,
        hwid_locked: false,
        expires_at: None,
    };

    let Some(session_id) = cookies::get_session_id(&jar, &state.settings.session_cookie_name)
    else {
        return Ok(Json(status));
    };

    let mut client = state.client();
    let valid = client.load_from_session(&state.store(session_id)).await?;
    if client.is_authenticated() {
        status = SessionStatus {
            authenticated: true,
            valid,
            client_type: Some(client.client_type().to_owned()),
            hwid_locked: client.is_hwid_locked(),
            expires_at: client.session_expires().map(str::to_owned),
        };
    }

    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use axum_extra::extract::cookie::Key;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::AuthConfig;
    use crate::middleware::AuthSession;
    use crate::session::MemorySessionBackend;

    async fn test_state(template: ResponseTemplate) -> (MockServer, AuthState) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(template)
            .mount(&server)
            .await;
        let client = AuthConfig::new("test-key").with_api_url(server.uri().parse().unwrap());
        let state = AutholasAuthConfig::new(client)
            .with_cookie_key(Key::generate())
            .with_secure_cookies(false)
            .into_state(MemorySessionBackend::new())
            .unwrap();
        (server, state)
    }

    async fn test_router(template: ResponseTemplate) -> (MockServer, Router) {
        let (server, state) = test_state(template).await;
        (server, auth_router(state))
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"username": username, "password": password}).to_string(),
            ))
            .unwrap()
    }

    fn with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    /// `name=value` part of the response's session cookie.
    fn session_cookie(response: &Response) -> String {
        let raw = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap();
        raw.split(';').next().unwrap().to_owned()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn success_template() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "session_token": "tok-1",
            "expires_at": "",
            "user": {"username": "alice"},
        }))
    }

    #[tokio::test]
    async fn login_sets_cookie_and_session_reports_valid() {
        let (_server, router) = test_router(success_template()).await;

        let response = router.clone().oneshot(login_request("alice", "pw")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        assert!(cookie.starts_with("__autholas_session="));
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["session_token"], json!("tok-1"));
        assert_eq!(body["user"]["username"], json!("alice"));

        let response = router
            .oneshot(with_cookie("GET", "/api/auth/session", &cookie))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["authenticated"], json!(true));
        assert_eq!(body["valid"], json!(true));
        assert_eq!(body["client_type"], json!("php"));
    }

    #[tokio::test]
    async fn login_failure_returns_catalog_entry() {
        let (_server, router) = test_router(
            ResponseTemplate::new(401).set_body_json(json!({"error_code": "INVALID_CREDENTIALS"})),
        )
        .await;

        let response = router.oneshot(login_request("alice", "bad")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_code"], json!("INVALID_CREDENTIALS"));
        assert_eq!(body["title"], json!("Login Failed"));
        assert_eq!(body["tips"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn login_failure_escapes_server_text() {
        let (_server, router) = test_router(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error_code": "XYZ123",
            "error": "<script>x</script>",
        })))
        .await;

        let response = router.oneshot(login_request("alice", "pw")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["title"], json!("Authentication Error"));
        assert_eq!(body["message"], json!("&lt;script&gt;x&lt;/script&gt;"));
    }

    #[tokio::test]
    async fn blank_credentials_are_bad_request() {
        let (_server, router) = test_router(success_template()).await;

        let response = router.oneshot(login_request(" ", "pw")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], json!("MISSING_CREDENTIALS"));
    }

    #[tokio::test]
    async fn missing_password_field_is_bad_request() {
        let (server, router) = test_router(success_template()).await;

        let request = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username":"alice"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_code"], json!("MISSING_CREDENTIALS"));
        assert_eq!(body["title"], json!("Missing Information"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_is_bad_gateway() {
        let (_server, router) =
            test_router(ResponseTemplate::new(200).set_body_string("<html>")).await;

        let response = router.oneshot(login_request("alice", "pw")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let (_server, router) = test_router(success_template()).await;
        let response = router.clone().oneshot(login_request("alice", "pw")).await.unwrap();
        let cookie = session_cookie(&response);

        let response = router
            .clone()
            .oneshot(with_cookie("POST", "/api/auth/logout", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router
            .oneshot(with_cookie("GET", "/api/auth/session", &cookie))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["authenticated"], json!(false));
    }

    #[tokio::test]
    async fn session_without_cookie_is_anonymous() {
        let (_server, router) = test_router(success_template()).await;
        let response = router
            .oneshot(Request::get("/api/auth/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["authenticated"], json!(false));
        assert_eq!(body["valid"], json!(false));
    }

    #[tokio::test]
    async fn expired_session_is_reported_invalid() {
        let (_server, router) = test_router(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "session_token": "tok-1",
            "expires_at": "2000-01-01T00:00:00Z",
        })))
        .await;
        let response = router.clone().oneshot(login_request("alice", "pw")).await.unwrap();
        let cookie = session_cookie(&response);

        let response = router
            .oneshot(with_cookie("GET", "/api/auth/session", &cookie))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["authenticated"], json!(true));
        assert_eq!(body["valid"], json!(false));
    }

    #[tokio::test]
    async fn extractor_guards_protected_routes() {
        let (_server, state) = test_state(success_template()).await;
        let protected = Router::new()
            .route("/me", get(|auth: AuthSession| async move { auth.session.token }))
            .with_state(state.clone());
        let router = protected.merge(auth_router(state));

        let response = router
            .clone()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router.clone().oneshot(login_request("alice", "pw")).await.unwrap();
        let cookie = session_cookie(&response);

        let response = router
            .oneshot(with_cookie("GET", "/me", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"tok-1");
    }

    #[tokio::test]
    async fn optional_extractor_admits_guests() {
        let (_server, state) = test_state(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "session_token": "tok-1",
            "expires_at": "2000-01-01T00:00:00Z",
        })))
        .await;
        let greeting = Router::new()
            .route(
                "/hello",
                get(|auth: Option<AuthSession>| async move {
                    match auth {
                        Some(auth) => auth.session.token,
                        None => "guest".to_owned(),
                    }
                }),
            )
            .with_state(state.clone());
        let router = greeting.merge(auth_router(state));

        let response = router
            .clone()
            .oneshot(Request::get("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"guest");

        // Expired sessions read as anonymous rather than rejecting.
        let response = router.clone().oneshot(login_request("alice", "pw")).await.unwrap();
        let cookie = session_cookie(&response);
        let response = router
            .oneshot(with_cookie("GET", "/hello", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"guest");
    }
}

use serde::Serialize;

use crate::catalog::{DisplayMessage, ErrorCode};
use crate::client::{AuthFailure, AuthSuccess};

/// Body of a successful `POST {auth_path}/login`.
#[derive(Debug, Serialize)]
pub(super) struct LoginSuccessBody<'a> {
    pub(super) success: bool,
    #[serde(flatten)]
    pub(super) result: &'a AuthSuccess,
}

/// Body of a failed `POST {auth_path}/login`.
///
/// `message` is HTML-escaped where it carries server text.
#[derive(Debug, Serialize)]
pub(super) struct LoginFailureBody<'a> {
    pub(super) success: bool,
    pub(super) error_code: &'a ErrorCode,
    pub(super) error: &'a str,
    pub(super) title: &'a str,
    pub(super) message: &'a DisplayMessage,
    pub(super) tips: &'static [&'static str],
}

impl<'a> LoginFailureBody<'a> {
    pub(super) fn new(failure: &'a AuthFailure) -> Self {
        Self {
            success: false,
            error_code: &failure.error_code,
            error: &failure.error_message,
            title: &failure.title,
            message: &failure.display_message,
            tips: failure.troubleshooting_tips(),
        }
    }
}

/// Body of `GET {auth_path}/session`.
#[derive(Debug, Serialize)]
pub(super) struct SessionStatus {
    pub(super) authenticated: bool,
    pub(super) valid: bool,
    pub(super) client_type: Option<String>,
    pub(super) hwid_locked: bool,
    pub(super) expires_at: Option<String>,
}

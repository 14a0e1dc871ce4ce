//! Error-code catalog: maps Autholas error codes to user-facing text.
//!
//! The catalog is static and total. Known codes resolve to canned
//! `(title, message)` pairs; anything else falls back to a generic title
//! and the server's own message, carried as untrusted text.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Line-break marker embedded in catalog messages.
pub const LINE_BREAK: &str = "<br>";

/// Title used for codes the catalog does not know.
pub const FALLBACK_TITLE: &str = "Authentication Error";

const UNKNOWN_ERROR_MESSAGE: &str =
    "An unknown error occurred.<br>Please try again or contact support.";

const DEFAULT_TIPS: &[&str] = &[
    "Check your internet connection",
    "Verify your credentials are correct",
    "Contact support if the problem persists",
];

macro_rules! error_codes {
    ($($variant:ident => $wire:literal,)+) => {
        /// Error code reported by the Autholas service or produced locally.
        ///
        /// Codes introduced server-side after this release parse as
        /// [`ErrorCode::Unrecognized`] and keep their raw spelling.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum ErrorCode {
            $($variant,)+
            Unrecognized(String),
        }

        impl ErrorCode {
            /// Wire spelling of the code.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unrecognized(raw) => raw,
                }
            }
        }

        impl FromStr for ErrorCode {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($wire => Self::$variant,)+
                    other => Self::Unrecognized(other.to_owned()),
                })
            }
        }
    };
}

error_codes! {
    // Server-reported
    InvalidCredentials => "INVALID_CREDENTIALS",
    UserBanned => "USER_BANNED",
    SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
    InvalidApiKey => "INVALID_API_KEY",
    RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
    DeveloperSuspended => "DEVELOPER_SUSPENDED",
    ServiceError => "SERVICE_ERROR",
    InvalidClientType => "INVALID_CLIENT_TYPE",
    AccountLocked => "ACCOUNT_LOCKED",
    EmailNotVerified => "EMAIL_NOT_VERIFIED",
    MaintenanceMode => "MAINTENANCE_MODE",
    InvalidToken => "INVALID_TOKEN",
    AccountInactive => "ACCOUNT_INACTIVE",
    PasswordExpired => "PASSWORD_EXPIRED",
    GeolocationBlocked => "GEOLOCATION_BLOCKED",
    DeviceNotRecognized => "DEVICE_NOT_RECOGNIZED",
    TwoFactorRequired => "TWO_FACTOR_REQUIRED",
    NetworkError => "NETWORK_ERROR",
    InvalidRequest => "INVALID_REQUEST",
    ServerOverloaded => "SERVER_OVERLOADED",
    // Client-side
    MissingCredentials => "MISSING_CREDENTIALS",
    ConnectionError => "CONNECTION_ERROR",
    HttpError => "HTTP_ERROR",
    InvalidResponse => "INVALID_RESPONSE",
    Unknown => "UNKNOWN",
}

impl ErrorCode {
    /// Parse a wire code. Never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }

    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Codes this crate synthesizes itself rather than receiving from the
    /// service.
    #[must_use]
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials
                | Self::ConnectionError
                | Self::HttpError
                | Self::InvalidResponse
                | Self::Unknown
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Cow::<'de, str>::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Message text destined for display.
///
/// Escaping is left to the presentation layer: `Markup` is trusted catalog
/// text whose only markup is [`LINE_BREAK`], `Text` is untrusted text that
/// must be escaped before it is placed into HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMessage {
    Markup(&'static str),
    Text(String),
}

impl DisplayMessage {
    /// HTML-safe rendering.
    #[must_use]
    pub fn to_html(&self) -> Cow<'_, str> {
        match self {
            Self::Markup(s) => Cow::Borrowed(s),
            Self::Text(s) => escape_html(s),
        }
    }

    /// Plain-text rendering with line breaks as `\n`.
    #[must_use]
    pub fn to_plain(&self) -> Cow<'_, str> {
        match self {
            Self::Markup(s) => Cow::Owned(s.replace(LINE_BREAK, "\n")),
            Self::Text(s) => Cow::Borrowed(s),
        }
    }
}

impl fmt::Display for DisplayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain())
    }
}

impl Serialize for DisplayMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_html())
    }
}

/// Resolved title and message for an error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub title: &'static str,
    pub message: DisplayMessage,
}

/// Resolve `code` to its display pair.
///
/// Unknown codes (and codes deliberately left out of the catalog, such as
/// `HTTP_ERROR` and `UNKNOWN`) yield [`FALLBACK_TITLE`] with the server's
/// message, or a generic message when the server sent none.
#[must_use]
pub fn lookup(code: &ErrorCode, server_message: Option<&str>) -> ErrorInfo {
    if let Some((title, message)) = canned(code) {
        return ErrorInfo {
            title,
            message: DisplayMessage::Markup(message),
        };
    }
    let message = match server_message {
        Some(text) if !text.is_empty() => DisplayMessage::Text(text.to_owned()),
        _ => DisplayMessage::Markup(UNKNOWN_ERROR_MESSAGE),
    };
    ErrorInfo {
        title: FALLBACK_TITLE,
        message,
    }
}

/// Resolve a code reported by the service.
///
/// Client-side codes echoed back by the server carry no canned entry here:
/// their catalog text describes local conditions, so they take the
/// [`FALLBACK_TITLE`] path with the server's message instead.
#[must_use]
pub fn lookup_reported(code: &ErrorCode, server_message: Option<&str>) -> ErrorInfo {
    if code.is_client_side() {
        return lookup(&ErrorCode::Unknown, server_message);
    }
    lookup(code, server_message)
}

/// Remediation hints for `code`, most relevant first.
#[must_use]
pub fn troubleshooting_tips(code: &ErrorCode) -> &'static [&'static str] {
    match code {
        ErrorCode::InvalidCredentials => &[
            "Double-check your username and password spelling",
            "Make sure Caps Lock is not enabled",
            "Contact your administrator if you've forgotten your credentials",
        ],
        ErrorCode::UserBanned => &[
            "Contact support to appeal your ban",
            "Check if your subscription is still active",
        ],
        ErrorCode::SubscriptionExpired => &[
            "Renew your subscription to regain access",
            "Contact billing support for payment issues",
        ],
        ErrorCode::RateLimitExceeded => &[
            "Wait a few minutes before trying again",
            "Too many failed login attempts detected",
        ],
        ErrorCode::InvalidApiKey => &[
            "Check if the API key is correct",
            "Contact support for API issues",
        ],
        ErrorCode::DeveloperSuspended => &["Contact support for account issues"],
        ErrorCode::InvalidClientType => &[
            "Client configuration error",
            "Contact support for technical assistance",
        ],
        ErrorCode::ConnectionError => &[
            "Check your internet connection",
            "Verify the server is accessible",
            "Check firewall settings",
        ],
        _ => DEFAULT_TIPS,
    }
}

fn canned(code: &ErrorCode) -> Option<(&'static str, &'static str)> {
    use ErrorCode::*;

    let entry = match code {
        InvalidCredentials => (
            "Login Failed",
            "Username or password is incorrect.<br>Please double-check your credentials and try again.",
        ),
        UserBanned => (
            "Account Banned",
            "Your account has been suspended.<br>Please contact support for assistance.",
        ),
        SubscriptionExpired => (
            "Subscription Expired",
            "Your subscription has ended.<br>Please renew your subscription to continue.",
        ),
        InvalidApiKey => (
            "Service Error",
            "Authentication service unavailable.<br>Please try again later or contact support.",
        ),
        RateLimitExceeded => (
            "Too Many Attempts",
            "You have exceeded the maximum number of login attempts.<br>Please wait a few minutes before trying again.",
        ),
        DeveloperSuspended => (
            "Service Unavailable",
            "Authentication service is temporarily unavailable.<br>Please contact support for assistance.",
        ),
        ServiceError => (
            "Service Error",
            "Authentication service is temporarily unavailable.<br>Please try again later or contact support.",
        ),
        InvalidClientType => (
            "Client Error",
            "Invalid client configuration detected.<br>Please contact support for assistance.",
        ),
        AccountLocked => (
            "Account Locked",
            "Your account has been temporarily locked due to security reasons.<br>Please contact support to unlock your account.",
        ),
        EmailNotVerified => (
            "Email Verification Required",
            "Please verify your email address before logging in.<br>Check your inbox for the verification link.",
        ),
        MaintenanceMode => (
            "System Maintenance",
            "The system is currently under maintenance.<br>Please try again later.",
        ),
        InvalidToken => (
            "Session Expired",
            "Your session has expired or is invalid.<br>Please log in again.",
        ),
        AccountInactive => (
            "Account Inactive",
            "Your account is currently inactive.<br>Please contact support to activate your account.",
        ),
        PasswordExpired => (
            "Password Expired",
            "Your password has expired.<br>Please reset your password to continue.",
        ),
        GeolocationBlocked => (
            "Location Restricted",
            "Access from your current location is not permitted.<br>Please contact support if you believe this is an error.",
        ),
        DeviceNotRecognized => (
            "Unrecognized Device",
            "Login from an unrecognized device detected.<br>Please verify your identity or use a trusted device.",
        ),
        TwoFactorRequired => (
            "Two-Factor Authentication Required",
            "Please complete two-factor authentication.<br>Enter the code from your authenticator app.",
        ),
        NetworkError => (
            "Connection Error",
            "Unable to connect to authentication server.<br>Please check your internet connection and try again.",
        ),
        InvalidRequest => (
            "Invalid Request",
            "The authentication request is malformed.<br>Please refresh the page and try again.",
        ),
        ServerOverloaded => (
            "Server Busy",
            "The server is currently overloaded.<br>Please wait a moment and try again.",
        ),
        MissingCredentials => (
            "Missing Information",
            "Please provide both username and password.",
        ),
        ConnectionError => (
            "Connection Error",
            "Unable to reach authentication server.<br>Please check your internet connection and try again.",
        ),
        InvalidResponse => (
            "Server Error",
            "Server returned invalid response. Please try again later.",
        ),
        HttpError | Unknown | Unrecognized(_) => return None,
    };
    Some(entry)
}

/// Escape the five HTML-significant characters.
#[must_use]
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

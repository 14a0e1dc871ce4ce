/// Infrastructure errors.
///
/// Authentication outcomes (bad credentials, transport failures, malformed
/// server replies) are reported as [`AuthResult`](crate::AuthResult) values,
/// not through this type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "client")]
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Session store error: {0}")]
    Session(String),
}

impl Error {
    pub(crate) fn session(e: impl std::fmt::Display) -> Self {
        Self::Session(e.to_string())
    }
}

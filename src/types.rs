use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies one caller's server-side session scope.
///
/// The consumer chooses the format; [`SessionId::generate`] hands out a
/// fresh ULID for callers without their own scheme.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Login credentials as submitted by the user.
///
/// `Debug` never prints the password. Missing fields deserialize as empty
/// strings so that validation reports them.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields trimmed, or `None` if either is blank.
    #[must_use]
    pub fn trimmed(&self) -> Option<(&str, &str)> {
        let username = self.username.trim();
        let password = self.password.trim();
        (!username.is_empty() && !password.is_empty()).then_some((username, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_from_string() {
        let id = SessionId::from("sess-abc".to_string());
        assert_eq!(id.to_string(), "sess-abc");
        assert_eq!(id.as_str(), "sess-abc");
    }

    #[test]
    fn generated_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn session_id_serde_transparent() {
        let id = SessionId::from("sess-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sess-1\"");
    }

    #[test]
    fn trimmed_rejects_blank_fields() {
        assert!(Credentials::new("", "x").trimmed().is_none());
        assert!(Credentials::new("x", "").trimmed().is_none());
        assert!(Credentials::new("   ", "x").trimmed().is_none());
        assert_eq!(
            Credentials::new(" alice ", "\tpw\n").trimmed(),
            Some(("alice", "pw"))
        );
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let printed = format!("{creds:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn missing_credential_fields_default_to_empty() {
        let creds: Credentials = serde_json::from_str(r#"{"username":"alice"}"#).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "");
        assert!(creds.trimmed().is_none());
    }
}

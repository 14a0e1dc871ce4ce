#![doc = include_str!("../README.md")]

pub mod catalog;
#[cfg(feature = "client")]
pub mod client;
pub mod error;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use catalog::{DisplayMessage, ErrorCode, ErrorInfo, lookup, lookup_reported, troubleshooting_tips};
#[cfg(feature = "client")]
pub use client::{
    AuthClient, AuthConfig, AuthFailure, AuthResult, AuthSuccess, build_http_client,
};
pub use error::Error;
pub use session::{MemorySessionBackend, Session, SessionBackend, SessionStore, parse_expiry};
pub use types::{Credentials, SessionId};

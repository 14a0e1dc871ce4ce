//! Plug-and-play Autholas authentication for Axum.
//!
//! Mounts JSON login/logout/status routes backed by [`AuthClient`](crate::AuthClient)
//! and a consumer-provided [`SessionBackend`](crate::SessionBackend), and
//! provides the [`AuthSession`] extractor for protected routes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use autholas::MemorySessionBackend;
//! use autholas::middleware::{AutholasAuthConfig, auth_routes};
//!
//! // 1. Configure from environment
//! let config = AutholasAuthConfig::from_env()?;
//!
//! // 2. Mount auth routes
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, MemorySessionBackend::new())?);
//!
//! // 3. Use `AuthSession` as an extractor on protected routes
//! ```

mod backend;
mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;
mod types;

pub use config::AutholasAuthConfig;
pub use error::AuthError;
pub use extractor::{AuthSession, resolve_session};
pub use routes::{auth_router, auth_routes};
pub use state::AuthState;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;

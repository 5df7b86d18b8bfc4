//! Authentication module for session credentials.
//!
//! This module provides:
//! - `SessionCredentialPayload`: the signed-in user and backend access token
//! - `SessionClaims` / `SessionStore`: the persisted envelope and where it lives
//! - `SessionGuard`: per-request verification for protected routes
//! - `SignIn` / `sign_out`: the authentication action and cleanup flow
//! - `CredentialStore`: remembered passwords in the OS keychain

pub mod credentials;
pub mod guard;
pub mod payload;
pub mod session;
pub mod signin;

pub use credentials::CredentialStore;
pub use guard::{AuthError, AuthorizedSession, SessionGuard};
pub use payload::{Role, SessionCredentialPayload, SessionUser};
pub use session::{
    validate_max_age, FileSessionStore, MemorySessionStore, SessionClaims, SessionStore,
    DEFAULT_SESSION_MAX_AGE_MINUTES, MAX_SESSION_MAX_AGE_MINUTES,
};
pub use signin::{sign_out, SignIn};

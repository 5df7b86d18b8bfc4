//! Dashgate core - session credential handling for the admin dashboard.
//!
//! The dashboard keeps the backend access token out of the browser by
//! sealing it, together with the user profile, into an encrypted envelope
//! stored as a session claim. Protected routes open the envelope on every
//! request and forward the token to the backend as a bearer credential.

pub mod api;
pub mod auth;
pub mod config;
pub mod envelope;

pub use api::{ApiError, BackendClient, Resource};
pub use auth::{AuthError, AuthorizedSession, Role, SessionGuard, SessionStore, SessionUser};
pub use config::Config;
pub use envelope::{EnvelopeCodec, EnvelopeError, KeySet, SecretKey};

//! Authorization for protected routes.
//!
//! Every protected request goes through `SessionGuard::authorize`, which
//! loads the session claim, checks its age, and opens the envelope. Any
//! failure along the way leaves the caller unauthenticated.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::{Role, SessionCredentialPayload, SessionStore, SessionUser};
use crate::envelope::EnvelopeCodec;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Session invalid, please sign in again")]
    Unauthenticated,

    #[error("Insufficient permissions: {required} role required")]
    Forbidden { required: Role },
}

impl AuthError {
    /// HTTP status equivalent for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Unauthenticated => 401,
            AuthError::Forbidden { .. } => 403,
        }
    }

    /// Message safe to show to the client
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "Session invalid, please sign in again",
            AuthError::Forbidden { .. } => "Insufficient permissions",
        }
    }
}

/// A session whose envelope has been verified and opened
#[derive(Clone)]
pub struct AuthorizedSession {
    payload: SessionCredentialPayload,
}

impl AuthorizedSession {
    pub fn user(&self) -> &SessionUser {
        &self.payload.user
    }

    pub fn access_token(&self) -> &str {
        &self.payload.access_token
    }

    /// Value for an outbound `Authorization` header
    pub fn bearer_value(&self) -> String {
        format!("Bearer {}", self.payload.access_token)
    }

    pub fn require_role(&self, required: Role) -> Result<&Self, AuthError> {
        if self.payload.user.role.satisfies(required) {
            Ok(self)
        } else {
            debug!(user_id = %self.payload.user.id, role = %self.payload.user.role, %required, "Role check failed");
            Err(AuthError::Forbidden { required })
        }
    }
}

impl fmt::Debug for AuthorizedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedSession")
            .field("user", &self.payload.user)
            .finish_non_exhaustive()
    }
}

pub struct SessionGuard<'a> {
    codec: &'a EnvelopeCodec,
    store: &'a dyn SessionStore,
}

impl<'a> SessionGuard<'a> {
    pub fn new(codec: &'a EnvelopeCodec, store: &'a dyn SessionStore) -> Self {
        Self { codec, store }
    }

    /// Resolve the current session, failing closed
    pub fn authorize(&self) -> Result<AuthorizedSession, AuthError> {
        let claims = match self.store.load() {
            Ok(Some(claims)) => claims,
            Ok(None) => {
                debug!("No session present");
                return Err(AuthError::Unauthenticated);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load session, treating as signed out");
                return Err(AuthError::Unauthenticated);
            }
        };

        if claims.is_expired() {
            debug!(subject = %claims.subject, "Session expired");
            return Err(AuthError::Unauthenticated);
        }

        let payload = SessionCredentialPayload::open(self.codec, &claims.envelope).map_err(|e| {
            warn!(subject = %claims.subject, error = %e, "Rejected session envelope");
            AuthError::Unauthenticated
        })?;

        if payload.user.id != claims.subject {
            warn!(subject = %claims.subject, "Session envelope issued for a different user");
            return Err(AuthError::Unauthenticated);
        }

        Ok(AuthorizedSession { payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FileSessionStore, MemorySessionStore, SessionClaims};
    use crate::envelope::{KeyId, KeySet, SecretKey};
    use chrono::{Duration, Utc};

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(KeySet::new(KeyId::default(), SecretKey::generate()))
    }

    fn payload(id: &str, role: Role) -> SessionCredentialPayload {
        SessionCredentialPayload::new(
            SessionUser {
                id: id.to_string(),
                name: "Ann".to_string(),
                email: "ann@example.com".to_string(),
                role,
            },
            "tok_abc123".to_string(),
        )
    }

    fn store_with(codec: &EnvelopeCodec, role: Role) -> MemorySessionStore {
        let store = MemorySessionStore::new();
        let envelope = payload("u1", role).seal(codec).unwrap();
        store
            .save(&SessionClaims::new(envelope, "u1".to_string(), 60))
            .unwrap();
        store
    }

    #[test]
    fn test_authorize_valid_session() {
        let codec = codec();
        let store = store_with(&codec, Role::User);
        let session = SessionGuard::new(&codec, &store).authorize().unwrap();

        assert_eq!(session.user().id, "u1");
        assert_eq!(session.access_token(), "tok_abc123");
        assert_eq!(session.bearer_value(), "Bearer tok_abc123");
        assert!(!format!("{:?}", session).contains("tok_abc123"));
    }

    #[test]
    fn test_missing_session_is_unauthenticated() {
        let codec = codec();
        let store = MemorySessionStore::new();
        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_tampered_envelope_is_unauthenticated() {
        let codec = codec();
        let store = store_with(&codec, Role::Admin);
        let mut claims = store.load().unwrap().unwrap();
        let last = claims.envelope.pop().unwrap();
        claims.envelope.push(if last == 'A' { 'B' } else { 'A' });
        store.save(&claims).unwrap();

        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
    }

    #[test]
    fn test_foreign_key_is_unauthenticated() {
        let codec = codec();
        let store = store_with(&codec, Role::Admin);
        let other = self::codec();
        let err = SessionGuard::new(&other, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
    }

    #[test]
    fn test_expired_session_is_unauthenticated() {
        let codec = codec();
        let store = store_with(&codec, Role::Admin);
        let mut claims = store.load().unwrap().unwrap();
        claims.created_at = Utc::now() - Duration::minutes(120);
        store.save(&claims).unwrap();

        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
    }

    #[test]
    fn test_out_of_range_lifetime_is_unauthenticated() {
        let codec = codec();
        let store = MemorySessionStore::new();
        let envelope = payload("u1", Role::Admin).seal(&codec).unwrap();
        store
            .save(&SessionClaims::new(envelope, "u1".to_string(), i64::MAX / 2))
            .unwrap();

        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
    }

    struct UnreadableStore;

    impl SessionStore for UnreadableStore {
        fn load(&self) -> anyhow::Result<Option<SessionClaims>> {
            Err(anyhow::anyhow!("disk unavailable"))
        }

        fn save(&self, _claims: &SessionClaims) -> anyhow::Result<()> {
            Ok(())
        }

        fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_store_read_error_is_unauthenticated() {
        let codec = codec();
        let err = SessionGuard::new(&codec, &UnreadableStore)
            .authorize()
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_corrupt_session_file_is_unauthenticated() {
        let codec = codec();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());

        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_subject_mismatch_is_unauthenticated() {
        let codec = codec();
        let store = store_with(&codec, Role::Admin);
        let mut claims = store.load().unwrap().unwrap();
        claims.subject = "u2".to_string();
        store.save(&claims).unwrap();

        let err = SessionGuard::new(&codec, &store).authorize().unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
    }

    #[test]
    fn test_require_role() {
        let codec = codec();
        let user_store = store_with(&codec, Role::User);
        let user = SessionGuard::new(&codec, &user_store).authorize().unwrap();
        assert!(user.require_role(Role::User).is_ok());

        let err = user.require_role(Role::Admin).unwrap_err();
        assert_eq!(err, AuthError::Forbidden { required: Role::Admin });
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.public_message(), "Insufficient permissions");

        let admin_store = store_with(&codec, Role::Admin);
        let admin = SessionGuard::new(&codec, &admin_store).authorize().unwrap();
        assert!(admin.require_role(Role::User).is_ok());
    }
}

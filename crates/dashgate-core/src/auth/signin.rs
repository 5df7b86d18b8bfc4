//! Sign-in and sign-out flows.
//!
//! Sign-in trades credentials for a backend access token, seals it with the
//! user profile into an envelope, and stores the resulting claim. Sign-out
//! removes the claim and any remembered password.

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{
    validate_max_age, CredentialStore, SessionClaims, SessionCredentialPayload, SessionStore,
    SessionUser,
};
use crate::api::BackendClient;
use crate::envelope::EnvelopeCodec;

pub struct SignIn<'a> {
    backend: &'a BackendClient,
    codec: &'a EnvelopeCodec,
    store: &'a dyn SessionStore,
    max_age_minutes: i64,
}

impl<'a> SignIn<'a> {
    pub fn new(
        backend: &'a BackendClient,
        codec: &'a EnvelopeCodec,
        store: &'a dyn SessionStore,
        max_age_minutes: i64,
    ) -> Self {
        Self {
            backend,
            codec,
            store,
            max_age_minutes,
        }
    }

    /// Authenticate against the backend and establish a new session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser> {
        validate_max_age(self.max_age_minutes)?;
        let login = self.backend.authenticate(email, password).await?;
        let payload: SessionCredentialPayload = login.into();
        self.establish(payload)
    }

    /// Seal a freshly issued payload and store it, replacing any earlier session
    pub fn establish(&self, payload: SessionCredentialPayload) -> Result<SessionUser> {
        let max_age_minutes = validate_max_age(self.max_age_minutes)?;
        let envelope = payload
            .seal(self.codec)
            .context("Failed to seal session credentials")?;
        let claims = SessionClaims::new(envelope, payload.user.id.clone(), max_age_minutes);
        self.store.save(&claims)?;

        info!(user_id = %payload.user.id, role = %payload.user.role, "Signed in");
        Ok(payload.user)
    }
}

/// End the session and forget any remembered password for `remembered_email`
pub fn sign_out(store: &dyn SessionStore, remembered_email: Option<&str>) -> Result<()> {
    store.clear().context("Failed to clear session")?;

    if let Some(email) = remembered_email {
        if let Err(e) = CredentialStore::delete(email) {
            warn!(error = %e, "Failed to remove remembered password");
        }
    }

    info!("Signed out");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemorySessionStore, Role, SessionGuard};
    use crate::envelope::{KeyId, KeySet, SecretKey};

    fn payload() -> SessionCredentialPayload {
        SessionCredentialPayload::new(
            SessionUser {
                id: "u1".to_string(),
                name: "Ann".to_string(),
                email: "ann@example.com".to_string(),
                role: Role::Admin,
            },
            "tok_abc123".to_string(),
        )
    }

    #[test]
    fn test_establish_then_authorize() {
        let backend = BackendClient::new("http://localhost:8080/api").unwrap();
        let codec = EnvelopeCodec::new(KeySet::new(KeyId::default(), SecretKey::generate()));
        let store = MemorySessionStore::new();

        let user = SignIn::new(&backend, &codec, &store, 60)
            .establish(payload())
            .unwrap();
        assert_eq!(user.id, "u1");

        let claims = store.load().unwrap().unwrap();
        assert_eq!(claims.subject, "u1");
        assert!(!claims.envelope.contains("tok_abc123"));
        assert!(!serde_json::to_string(&claims).unwrap().contains("tok_abc123"));

        let session = SessionGuard::new(&codec, &store).authorize().unwrap();
        assert_eq!(session.access_token(), "tok_abc123");
    }

    #[test]
    fn test_establish_rejects_bad_lifetime() {
        let backend = BackendClient::new("http://localhost:8080/api").unwrap();
        let codec = EnvelopeCodec::new(KeySet::new(KeyId::default(), SecretKey::generate()));
        let store = MemorySessionStore::new();

        for max_age in [0, -1, i64::MAX / 2] {
            let result = SignIn::new(&backend, &codec, &store, max_age).establish(payload());
            assert!(result.is_err(), "max age {} accepted", max_age);
        }
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_sign_out_clears_session() {
        let backend = BackendClient::new("http://localhost:8080/api").unwrap();
        let codec = EnvelopeCodec::new(KeySet::new(KeyId::default(), SecretKey::generate()));
        let store = MemorySessionStore::new();
        SignIn::new(&backend, &codec, &store, 60)
            .establish(payload())
            .unwrap();

        sign_out(&store, None).unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(SessionGuard::new(&codec, &store).authorize().is_err());
    }
}

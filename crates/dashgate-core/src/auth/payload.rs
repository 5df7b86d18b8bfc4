use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::{EnvelopeCodec, EnvelopeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Whether a holder of this role may act with `required`.
    /// Admins satisfy every role.
    pub fn satisfies(self, required: Role) -> bool {
        self == Role::Admin || self == required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Plaintext carried inside the session envelope: the signed-in user and
/// the backend bearer token issued for them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SessionCredentialPayload {
    pub user: SessionUser,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

impl SessionCredentialPayload {
    pub fn new(user: SessionUser, access_token: String) -> Self {
        Self { user, access_token }
    }

    /// Serialize to JSON and encrypt into an envelope
    pub fn seal(&self, codec: &EnvelopeCodec) -> Result<String, EnvelopeError> {
        let json = serde_json::to_string(self)?;
        codec.encrypt(&json)
    }

    /// Decrypt an envelope and parse the payload inside it
    pub fn open(codec: &EnvelopeCodec, envelope: &str) -> Result<Self, EnvelopeError> {
        let json = codec.decrypt(envelope)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl fmt::Debug for SessionCredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentialPayload")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{KeyId, KeySet, SecretKey};

    const SAMPLE: &str = r#"{"user":{"id":"u1","name":"Ann","email":"ann@example.com","role":"ADMIN"},"accessToken":"tok_abc123"}"#;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(KeySet::new(KeyId::default(), SecretKey::generate()))
    }

    fn ann() -> SessionCredentialPayload {
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
    fn test_payload_json_shape() {
        assert_eq!(serde_json::to_string(&ann()).unwrap(), SAMPLE);
        let parsed: SessionCredentialPayload = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(parsed, ann());
    }

    #[test]
    fn test_seal_and_open() {
        let codec = codec();
        let envelope = ann().seal(&codec).unwrap();
        assert!(!envelope.contains("tok_abc123"));
        assert_eq!(SessionCredentialPayload::open(&codec, &envelope).unwrap(), ann());
    }

    #[test]
    fn test_open_rejects_non_payload_plaintext() {
        let codec = codec();
        let envelope = codec.encrypt("just a string").unwrap();
        let err = SessionCredentialPayload::open(&codec, &envelope).unwrap_err();
        assert!(matches!(err, EnvelopeError::Encoding(_)));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let json = SAMPLE.replace("ADMIN", "SUPERUSER");
        assert!(serde_json::from_str::<SessionCredentialPayload>(&json).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", ann());
        assert!(debug.contains("ann@example.com"));
        assert!(!debug.contains("tok_abc123"));
    }

    #[test]
    fn test_role_satisfies() {
        assert!(Role::Admin.satisfies(Role::User));
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::User.satisfies(Role::User));
        assert!(!Role::User.satisfies(Role::Admin));
    }
}

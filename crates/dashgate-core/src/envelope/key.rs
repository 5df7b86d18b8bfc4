//! Envelope key material and startup loading.
//!
//! Keys are read once from the process environment and held for the life
//! of the process. A key set has one primary key used for sealing and any
//! number of retired keys that are still accepted when opening envelopes.

use std::fmt;

use argon2::Argon2;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use super::EnvelopeError;

/// Length of an envelope key in bytes (256-bit)
pub const KEY_LEN: usize = 32;

/// Minimum length for a passphrase secret before it is accepted for key derivation
const MIN_SECRET_LEN: usize = 32;

/// Maximum length of a key id
const MAX_KEY_ID_LEN: usize = 32;

/// Fixed Argon2id salt for deriving the envelope key from a passphrase secret
const DERIVATION_SALT: &[u8] = b"dashgate:envelope-key:v1";

/// Key id used when none is configured
pub const DEFAULT_KEY_ID: &str = "k1";

pub const ENV_KEY: &str = "DASHGATE_ENVELOPE_KEY";
pub const ENV_SECRET: &str = "DASHGATE_ENVELOPE_SECRET";
pub const ENV_KEY_ID: &str = "DASHGATE_ENVELOPE_KEY_ID";
pub const ENV_RETIRED_KEYS: &str = "DASHGATE_ENVELOPE_RETIRED_KEYS";

#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Generate a fresh random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a key from base64url (unpadded) or standard base64
    pub fn from_encoded(encoded: &str) -> Result<Self, EnvelopeError> {
        let encoded = encoded.trim();
        let decoded = URL_SAFE_NO_PAD
            .decode(encoded)
            .or_else(|_| STANDARD.decode(encoded))
            .map_err(|_| EnvelopeError::config("envelope key is not valid base64"))?;

        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            EnvelopeError::config(format!(
                "envelope key must be {} bytes, got {}",
                KEY_LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Derive a key from a passphrase secret with Argon2id
    pub fn derive_from_secret(secret: &str) -> Result<Self, EnvelopeError> {
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(EnvelopeError::config(format!(
                "envelope secret must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), DERIVATION_SALT, &mut bytes)
            .map_err(|e| EnvelopeError::config(format!("key derivation failed: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Encode as unpadded base64url, the form accepted by `from_encoded`
    pub fn to_encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Label carried in every envelope naming the key that sealed it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: &str) -> Result<Self, EnvelopeError> {
        if Self::is_valid(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(EnvelopeError::config(format!(
                "invalid key id {:?}: expected 1-{} characters of [A-Za-z0-9_-]",
                id, MAX_KEY_ID_LEN
            )))
        }
    }

    pub(crate) fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_KEY_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self(DEFAULT_KEY_ID.to_string())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct KeySet {
    primary: (KeyId, SecretKey),
    retired: Vec<(KeyId, SecretKey)>,
}

impl KeySet {
    pub fn new(id: KeyId, key: SecretKey) -> Self {
        Self {
            primary: (id, key),
            retired: Vec::new(),
        }
    }

    /// Add a key that is still accepted for decryption but never used to encrypt
    pub fn with_retired(mut self, id: KeyId, key: SecretKey) -> Result<Self, EnvelopeError> {
        if self.get(&id).is_some() {
            return Err(EnvelopeError::config(format!("duplicate key id {:?}", id.as_str())));
        }
        self.retired.push((id, key));
        Ok(self)
    }

    /// Load the key set from the process environment
    pub fn from_env() -> Result<Self, EnvelopeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the key set through an arbitrary variable lookup.
    /// `DASHGATE_ENVELOPE_KEY` wins over `DASHGATE_ENVELOPE_SECRET`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvelopeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let key = match (non_empty(ENV_KEY), non_empty(ENV_SECRET)) {
            (Some(encoded), _) => SecretKey::from_encoded(&encoded)?,
            (None, Some(secret)) => SecretKey::derive_from_secret(&secret)?,
            (None, None) => {
                return Err(EnvelopeError::config(format!(
                    "neither {} nor {} is set",
                    ENV_KEY, ENV_SECRET
                )))
            }
        };

        let id = match non_empty(ENV_KEY_ID) {
            Some(id) => KeyId::new(id.trim())?,
            None => KeyId::default(),
        };

        let mut set = Self::new(id, key);

        if let Some(retired) = non_empty(ENV_RETIRED_KEYS) {
            for entry in retired.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (id, encoded) = entry.split_once(':').ok_or_else(|| {
                    EnvelopeError::config(format!(
                        "{} entries must look like kid:key",
                        ENV_RETIRED_KEYS
                    ))
                })?;
                set = set.with_retired(KeyId::new(id.trim())?, SecretKey::from_encoded(encoded)?)?;
            }
        }

        Ok(set)
    }

    pub fn primary(&self) -> (&KeyId, &SecretKey) {
        (&self.primary.0, &self.primary.1)
    }

    /// Look up a key by id, primary first
    pub fn get(&self, id: &KeyId) -> Option<&SecretKey> {
        std::iter::once(&self.primary)
            .chain(self.retired.iter())
            .find(|(kid, _)| kid == id)
            .map(|(_, key)| key)
    }

    pub fn ids(&self) -> impl Iterator<Item = &KeyId> {
        std::iter::once(&self.primary.0).chain(self.retired.iter().map(|(id, _)| id))
    }
}

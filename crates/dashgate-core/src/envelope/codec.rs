//! Credential envelope codec.
//!
//! An envelope is `v1.<kid>.<body>`, where `body` is unpadded base64url of
//! `nonce || ciphertext || tag` produced by XChaCha20-Poly1305. The
//! `v1.<kid>` header is authenticated as associated data.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::{EnvelopeError, IntegrityFailure, KeyId, KeySet};

/// Current envelope format version
const VERSION: &str = "v1";

/// XChaCha20 nonce length in bytes
const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes
const TAG_LEN: usize = 16;

/// Encrypts and decrypts session credential envelopes.
///
/// The codec holds only immutable key material, so a single instance can be
/// shared across concurrent requests without locking.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    keys: KeySet,
}

impl EnvelopeCodec {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }

    /// Build a codec from the process environment (see `KeySet::from_env`)
    pub fn from_env() -> Result<Self, EnvelopeError> {
        let keys = KeySet::from_env()?;
        debug!(
            primary = %keys.primary().0,
            key_count = keys.ids().count(),
            "Loaded envelope keys"
        );
        Ok(Self::new(keys))
    }

    pub fn primary_key_id(&self) -> &KeyId {
        self.keys.primary().0
    }

    /// Seal `plaintext` under the primary key with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EnvelopeError> {
        let (kid, key) = self.keys.primary();
        let header = format!("{}.{}", VERSION, kid);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: header.as_bytes(),
                },
            )
            // the only failure is a plaintext past the cipher's length limit
            .map_err(|_| EnvelopeError::PlaintextTooLarge)?;

        let mut body = Vec::with_capacity(NONCE_LEN + sealed.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&sealed);

        Ok(format!("{}.{}", header, URL_SAFE_NO_PAD.encode(body)))
    }

    /// Open an envelope, verifying the tag before any plaintext is returned
    pub fn decrypt(&self, envelope: &str) -> Result<String, EnvelopeError> {
        let mut parts = envelope.split('.');
        let (version, kid, body) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(version), Some(kid), Some(body), None) => (version, kid, body),
            _ => return Err(IntegrityFailure::Malformed.into()),
        };

        if version != VERSION {
            return Err(IntegrityFailure::UnsupportedVersion.into());
        }
        if !KeyId::is_valid(kid) {
            return Err(IntegrityFailure::Malformed.into());
        }

        let body = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| IntegrityFailure::Malformed)?;
        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(IntegrityFailure::Malformed.into());
        }

        let kid = KeyId::new(kid).map_err(|_| IntegrityFailure::Malformed)?;
        let key = self.keys.get(&kid).ok_or(IntegrityFailure::UnknownKey)?;

        let (nonce, sealed) = body.split_at(NONCE_LEN);
        let header = format!("{}.{}", version, kid);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: header.as_bytes(),
                },
            )
            .map_err(|_| IntegrityFailure::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| IntegrityFailure::Malformed.into())
    }
}

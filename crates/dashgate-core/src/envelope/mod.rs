//! Credential envelope: authenticated encryption of session payloads.
//!
//! This module provides:
//! - `EnvelopeCodec`: seals a UTF-8 string into an opaque, URL-safe envelope
//!   and opens it again, failing closed on any tampering
//! - `KeySet`, `SecretKey`, `KeyId`: process-wide key material loaded once
//!   at startup, with retired keys kept for rotation

pub mod codec;
pub mod error;
pub mod key;

pub use codec::EnvelopeCodec;
pub use error::{EnvelopeError, IntegrityFailure};
pub use key::{KeyId, KeySet, SecretKey};

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope key configuration error: {0}")]
    Configuration(String),

    #[error("Envelope integrity check failed: {0}")]
    Integrity(IntegrityFailure),

    #[error("Session payload too large to seal")]
    PlaintextTooLarge,

    #[error("Session payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Why an envelope was rejected. None of these carry key or plaintext material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    Malformed,
    UnsupportedVersion,
    UnknownKey,
    Authentication,
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IntegrityFailure::Malformed => "malformed envelope",
            IntegrityFailure::UnsupportedVersion => "unsupported envelope version",
            IntegrityFailure::UnknownKey => "unknown key id",
            IntegrityFailure::Authentication => "authentication tag mismatch",
        };
        f.write_str(reason)
    }
}

impl EnvelopeError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EnvelopeError::Configuration(message.into())
    }

    /// The integrity failure reason, if this is an integrity error
    pub fn integrity_failure(&self) -> Option<IntegrityFailure> {
        match self {
            EnvelopeError::Integrity(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, EnvelopeError::Integrity(_))
    }
}

impl From<IntegrityFailure> for EnvelopeError {
    fn from(reason: IntegrityFailure) -> Self {
        EnvelopeError::Integrity(reason)
    }
}

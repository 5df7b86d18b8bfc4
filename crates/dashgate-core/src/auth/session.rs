use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Default session lifetime in minutes (one day)
pub const DEFAULT_SESSION_MAX_AGE_MINUTES: i64 = 24 * 60;

/// Longest accepted session lifetime in minutes (one year)
pub const MAX_SESSION_MAX_AGE_MINUTES: i64 = 366 * 24 * 60;

/// Buffer time before expiry to trigger refresh (5 minutes)
const SESSION_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Check a configured session lifetime is positive and within bounds
pub fn validate_max_age(minutes: i64) -> Result<i64> {
    if (1..=MAX_SESSION_MAX_AGE_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(anyhow::anyhow!(
            "session max age must be between 1 and {} minutes, got {}",
            MAX_SESSION_MAX_AGE_MINUTES,
            minutes
        ))
    }
}

/// The session claim. Holds the sealed envelope only, never the plaintext token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub envelope: String,
    /// User id the envelope was issued for
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub max_age_minutes: i64,
}

impl SessionClaims {
    pub fn new(envelope: String, subject: String, max_age_minutes: i64) -> Self {
        Self {
            envelope,
            subject,
            created_at: Utc::now(),
            max_age_minutes,
        }
    }

    /// Expiry instant, or None when the stored lifetime is non-positive or out of range
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.max_age_minutes <= 0 {
            return None;
        }
        Duration::try_minutes(self.max_age_minutes)
            .and_then(|age| self.created_at.checked_add_signed(age))
    }

    /// Claims with an unusable lifetime count as expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expiry) => Utc::now() > expiry,
            None => true,
        }
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.expires_at().and_then(|expiry| {
            expiry.checked_sub_signed(Duration::minutes(SESSION_REFRESH_BUFFER_MINUTES))
        });
        match refresh_at {
            Some(refresh_at) => Utc::now() > refresh_at,
            None => true,
        }
    }

    pub fn time_until_expiry(&self) -> Duration {
        match self.expires_at() {
            Some(expiry) if expiry > Utc::now() => expiry - Utc::now(),
            _ => Duration::zero(),
        }
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// Where session claims live. Callers get one injected rather than
/// probing for the environment they run in.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionClaims>>;
    fn save(&self, claims: &SessionClaims) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Client-side store persisting claims to `session.json` in a cache directory
pub struct FileSessionStore {
    cache_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionClaims>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let claims: SessionClaims =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(claims))
    }

    fn save(&self, claims: &SessionClaims) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(claims)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        debug!(path = %path.display(), "Saved session");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Server-side store keeping claims in process memory
#[derive(Default)]
pub struct MemorySessionStore {
    claims: RwLock<Option<SessionClaims>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionClaims>> {
        let claims = self
            .claims
            .read()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        Ok(claims.clone())
    }

    fn save(&self, claims: &SessionClaims) -> Result<()> {
        let mut slot = self
            .claims
            .write()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        *slot = Some(claims.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .claims
            .write()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> SessionClaims {
        SessionClaims::new("v1.k1.opaque".to_string(), "u1".to_string(), 60)
    }

    #[test]
    fn test_fresh_claims_not_expired() {
        let claims = claims();
        assert!(!claims.is_expired());
        assert!(!claims.needs_refresh());
        assert!(claims.minutes_until_expiry() >= 59);
    }

    #[test]
    fn test_old_claims_expired() {
        let mut claims = claims();
        claims.created_at = Utc::now() - Duration::minutes(61);
        assert!(claims.is_expired());
        assert_eq!(claims.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_claims_near_expiry_need_refresh() {
        let mut claims = claims();
        claims.created_at = Utc::now() - Duration::minutes(57);
        assert!(!claims.is_expired());
        assert!(claims.needs_refresh());
    }

    #[test]
    fn test_out_of_range_lifetime_counts_as_expired() {
        for max_age in [i64::MAX / 2, i64::MAX, 0, -5] {
            let claims = SessionClaims::new("v1.k1.opaque".to_string(), "u1".to_string(), max_age);
            assert!(claims.is_expired(), "max age {} not expired", max_age);
            assert!(claims.needs_refresh());
            assert_eq!(claims.minutes_until_expiry(), 0);
        }
    }

    #[test]
    fn test_validate_max_age() {
        assert_eq!(validate_max_age(60).unwrap(), 60);
        assert!(validate_max_age(MAX_SESSION_MAX_AGE_MINUTES).is_ok());
        assert!(validate_max_age(0).is_err());
        assert!(validate_max_age(-1).is_err());
        assert!(validate_max_age(MAX_SESSION_MAX_AGE_MINUTES + 1).is_err());
        assert!(validate_max_age(i64::MAX / 2).is_err());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested"));

        assert!(store.load().unwrap().is_none());
        store.save(&claims()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().subject, "u1");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());
        assert!(store.load().is_err());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.load().unwrap().is_none());

        let saved = claims();
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}

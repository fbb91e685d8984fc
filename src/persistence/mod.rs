//! Login log and risk assessment storage
//!
//! The scorer and evaluator only see the [`LoginStore`] trait. Two
//! backends exist: SQLite for the daemon and CLI, and an in-memory store
//! for tests and embedding.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::InMemoryLoginStore;
pub use sqlite_store::SqliteLoginStore;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::models::{LoginLogEntry, RiskAssessment};

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Oldest creation time kept under a retention of `days`
///
/// Returns `None` when `days` is out of range for a timestamp.
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|retention| now.checked_sub_signed(retention))
}

/// Inclusive range of creation times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange { start, end }
    }

    /// `[end - length, end]`
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> Self {
        TimeRange {
            start: end - length,
            end,
        }
    }

    /// `[instant - length, instant)`: history strictly before `instant`
    pub fn before(instant: DateTime<Utc>, length: Duration) -> Self {
        TimeRange {
            start: instant - length,
            end: instant - Duration::milliseconds(1),
        }
    }

    /// All history strictly before `instant`
    pub fn all_before(instant: DateTime<Utc>) -> Self {
        TimeRange {
            start: DateTime::<Utc>::MIN_UTC,
            end: instant - Duration::milliseconds(1),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Storage backend for login history
///
/// Login log entries are append-only. Query results that return entries are
/// ordered newest first.
pub trait LoginStore: Send + Sync {
    // =====================
    // Login log
    // =====================

    /// Append a login attempt, returning its id
    fn append_login_log(&self, entry: &LoginLogEntry) -> Result<i64, PersistenceError>;

    /// Whether the user has a successful login with this fingerprint in range
    fn has_successful_login_with_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<bool, PersistenceError>;

    /// Successful logins in range, newest first, optionally limited
    fn successful_logins(
        &self,
        user_id: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError>;

    /// Failed attempts in range, newest first
    fn failed_logins(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError>;

    /// Number of failed attempts in range
    fn count_failed_logins(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<usize, PersistenceError> {
        Ok(self.failed_logins(user_id, range)?.len())
    }

    /// Most recent successful login at or before `until`
    fn last_successful_login(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
    ) -> Result<Option<LoginLogEntry>, PersistenceError>;

    /// Most recent attempts of any outcome at or before `until`
    fn recent_logins(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError>;

    // =====================
    // Risk assessments
    // =====================

    /// Store a risk assessment, returning its id
    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> Result<i64, PersistenceError>;

    /// Most recent assessments for a user
    fn recent_risk_assessments(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, PersistenceError>;

    // =====================
    // Maintenance
    // =====================

    /// Remove log entries and assessments created before `before`
    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, PersistenceError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_before_excludes_instant() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let range = TimeRange::before(now, Duration::hours(24));
        assert!(!range.contains(now));
        assert!(range.contains(now - Duration::seconds(1)));
        assert!(range.contains(now - Duration::hours(24)));
        assert!(!range.contains(now - Duration::hours(25)));
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            retention_cutoff(now, 90),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(retention_cutoff(now, i64::MAX), None);
        assert_eq!(retention_cutoff(now, 1_000_000_000), None);
    }

    #[test]
    fn test_trailing_includes_end() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let range = TimeRange::trailing(now, Duration::hours(1));
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::seconds(1)));
    }
}

//! In-memory implementation of the LoginStore trait

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use super::{LoginStore, PersistenceError, TimeRange};
use crate::models::{LoginLogEntry, RiskAssessment};

#[derive(Default)]
struct Tables {
    logs: Vec<LoginLogEntry>,
    assessments: Vec<RiskAssessment>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Entries for a user matching `filter`, newest first
    fn user_logs<F>(&self, user_id: &str, filter: F) -> Vec<LoginLogEntry>
    where
        F: Fn(&LoginLogEntry) -> bool,
    {
        let mut matched: Vec<LoginLogEntry> = self
            .logs
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id) && filter(e))
            .cloned()
            .collect();
        // Later inserts win ties on timestamp
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matched
    }
}

/// Login store held entirely in memory
///
/// Mirrors the query semantics of the SQLite store; used in tests and
/// when no database path is configured.
#[derive(Default)]
pub struct InMemoryLoginStore {
    tables: Mutex<Tables>,
}

impl InMemoryLoginStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, PersistenceError> {
        self.tables.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    /// Number of stored login log entries
    pub fn login_count(&self) -> usize {
        self.tables().map(|t| t.logs.len()).unwrap_or(0)
    }
}

impl LoginStore for InMemoryLoginStore {
    fn append_login_log(&self, entry: &LoginLogEntry) -> Result<i64, PersistenceError> {
        let mut tables = self.tables()?;
        let id = tables.next_id();
        let mut stored = entry.clone();
        stored.id = Some(id);
        tables.logs.push(stored);
        Ok(id)
    }

    fn has_successful_login_with_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<bool, PersistenceError> {
        let tables = self.tables()?;
        Ok(tables.logs.iter().any(|e| {
            e.user_id.as_deref() == Some(user_id)
                && e.success
                && e.fingerprint == fingerprint
                && range.contains(e.created_at)
        }))
    }

    fn successful_logins(
        &self,
        user_id: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        let tables = self.tables()?;
        let mut logins = tables.user_logs(user_id, |e| e.success && range.contains(e.created_at));
        if let Some(limit) = limit {
            logins.truncate(limit);
        }
        Ok(logins)
    }

    fn failed_logins(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        let tables = self.tables()?;
        Ok(tables.user_logs(user_id, |e| !e.success && range.contains(e.created_at)))
    }

    fn last_successful_login(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
    ) -> Result<Option<LoginLogEntry>, PersistenceError> {
        let tables = self.tables()?;
        Ok(tables
            .user_logs(user_id, |e| e.success && e.created_at <= until)
            .into_iter()
            .next())
    }

    fn recent_logins(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        let tables = self.tables()?;
        let mut logins = tables.user_logs(user_id, |e| e.created_at <= until);
        logins.truncate(limit);
        Ok(logins)
    }

    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> Result<i64, PersistenceError> {
        let mut tables = self.tables()?;
        let id = tables.next_id();
        let mut stored = assessment.clone();
        stored.id = Some(id);
        tables.assessments.push(stored);
        Ok(id)
    }

    fn recent_risk_assessments(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, PersistenceError> {
        let tables = self.tables()?;
        let mut assessments: Vec<RiskAssessment> = tables
            .assessments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        assessments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        assessments.truncate(limit);
        Ok(assessments)
    }

    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let mut tables = self.tables()?;
        let initial = tables.logs.len() + tables.assessments.len();
        tables.logs.retain(|e| e.created_at >= before);
        tables.assessments.retain(|a| a.created_at >= before);
        Ok(initial - tables.logs.len() - tables.assessments.len())
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        let mut tables = self.tables()?;
        tables.logs.clear();
        tables.assessments.clear();
        Ok(())
    }
}

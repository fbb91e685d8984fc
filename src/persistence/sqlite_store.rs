//! SQLite implementation of the LoginStore trait

use super::{LoginStore, PersistenceError, TimeRange};
use crate::models::{LoginLogEntry, RiskAssessment};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const LOG_COLUMNS: &str = "id, user_id, email, ip, device, location, fingerprint, success, \
                           failure_reason, headers, created_at";

/// Raw login_logs row before JSON columns are decoded
struct LogRow {
    id: i64,
    user_id: Option<String>,
    email: String,
    ip: String,
    device: String,
    location: String,
    fingerprint: String,
    success: bool,
    failure_reason: Option<String>,
    headers: String,
    created_at: i64,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LogRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            email: row.get(2)?,
            ip: row.get(3)?,
            device: row.get(4)?,
            location: row.get(5)?,
            fingerprint: row.get(6)?,
            success: row.get(7)?,
            failure_reason: row.get(8)?,
            headers: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<LoginLogEntry, PersistenceError> {
        Ok(LoginLogEntry {
            id: Some(self.id),
            user_id: self.user_id,
            email: self.email,
            ip: self.ip,
            device: serde_json::from_str(&self.device)?,
            location: serde_json::from_str(&self.location)?,
            fingerprint: self.fingerprint,
            success: self.success,
            failure_reason: self.failure_reason,
            headers: serde_json::from_str(&self.headers)?,
            created_at: from_millis(self.created_at)?,
        })
    }
}

/// Raw risk_assessments row before JSON columns are decoded
struct AssessmentRow {
    id: i64,
    user_id: String,
    risk_score: u32,
    risk_factors: String,
    connection: String,
    requires_verification: bool,
    created_at: i64,
}

impl AssessmentRow {
    fn into_assessment(self) -> Result<RiskAssessment, PersistenceError> {
        Ok(RiskAssessment {
            id: Some(self.id),
            user_id: self.user_id,
            risk_score: self.risk_score,
            risk_factors: serde_json::from_str(&self.risk_factors)?,
            connection: serde_json::from_str(&self.connection)?,
            requires_verification: self.requires_verification,
            created_at: from_millis(self.created_at)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| PersistenceError::InvalidData(format!("Invalid timestamp: {}", millis)))
}

fn decode_logs(rows: Vec<LogRow>) -> Result<Vec<LoginLogEntry>, PersistenceError> {
    rows.into_iter().map(LogRow::into_entry).collect()
}

/// SQLite-based login store
///
/// Timestamps are stored as Unix milliseconds; device, location, headers
/// and snapshots as JSON text.
pub struct SqliteLoginStore {
    conn: Mutex<Connection>,
}

impl SqliteLoginStore {
    /// Open (or create) a store at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteLoginStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteLoginStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    fn query_logs(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM login_logs WHERE {}", LOG_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        decode_logs(rows)
    }
}

impl LoginStore for SqliteLoginStore {
    fn append_login_log(&self, entry: &LoginLogEntry) -> Result<i64, PersistenceError> {
        let device = serde_json::to_string(&entry.device)?;
        let location = serde_json::to_string(&entry.location)?;
        let headers = serde_json::to_string(&entry.headers)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO login_logs
             (user_id, email, ip, device, location, fingerprint, success,
              failure_reason, headers, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.user_id,
                entry.email,
                entry.ip,
                device,
                location,
                entry.fingerprint,
                entry.success,
                entry.failure_reason,
                headers,
                entry.created_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn has_successful_login_with_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
        range: TimeRange,
    ) -> Result<bool, PersistenceError> {
        let conn = self.conn()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM login_logs
                WHERE user_id = ? AND fingerprint = ? AND success = 1
                  AND created_at BETWEEN ? AND ?
             )",
            params![
                user_id,
                fingerprint,
                range.start.timestamp_millis(),
                range.end.timestamp_millis()
            ],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn successful_logins(
        &self,
        user_id: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        // LIMIT -1 means unbounded in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.query_logs(
            "user_id = ? AND success = 1 AND created_at BETWEEN ? AND ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
            params![
                user_id,
                range.start.timestamp_millis(),
                range.end.timestamp_millis(),
                limit
            ],
        )
    }

    fn failed_logins(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        self.query_logs(
            "user_id = ? AND success = 0 AND created_at BETWEEN ? AND ?
             ORDER BY created_at DESC, id DESC",
            params![
                user_id,
                range.start.timestamp_millis(),
                range.end.timestamp_millis()
            ],
        )
    }

    fn count_failed_logins(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<usize, PersistenceError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM login_logs
             WHERE user_id = ? AND success = 0 AND created_at BETWEEN ? AND ?",
            params![
                user_id,
                range.start.timestamp_millis(),
                range.end.timestamp_millis()
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn last_successful_login(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
    ) -> Result<Option<LoginLogEntry>, PersistenceError> {
        let mut logins = self.query_logs(
            "user_id = ? AND success = 1 AND created_at <= ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![user_id, until.timestamp_millis()],
        )?;
        Ok(logins.pop())
    }

    fn recent_logins(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginLogEntry>, PersistenceError> {
        self.query_logs(
            "user_id = ? AND created_at <= ? ORDER BY created_at DESC, id DESC LIMIT ?",
            params![user_id, until.timestamp_millis(), limit as i64],
        )
    }

    fn insert_risk_assessment(&self, assessment: &RiskAssessment) -> Result<i64, PersistenceError> {
        let factors = serde_json::to_string(&assessment.risk_factors)?;
        let connection = serde_json::to_string(&assessment.connection)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO risk_assessments
             (user_id, risk_score, risk_factors, connection, requires_verification, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                assessment.user_id,
                assessment.risk_score,
                factors,
                connection,
                assessment.requires_verification,
                assessment.created_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_risk_assessments(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskAssessment>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, risk_score, risk_factors, connection,
                    requires_verification, created_at
             FROM risk_assessments
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(AssessmentRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    risk_score: row.get(2)?,
                    risk_factors: row.get(3)?,
                    connection: row.get(4)?,
                    requires_verification: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(AssessmentRow::into_assessment).collect()
    }

    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let conn = self.conn()?;
        let cutoff = before.timestamp_millis();

        let mut total_deleted = 0usize;
        total_deleted += conn.execute(
            "DELETE FROM login_logs WHERE created_at < ?",
            params![cutoff],
        )?;
        total_deleted += conn.execute(
            "DELETE FROM risk_assessments WHERE created_at < ?",
            params![cutoff],
        )?;

        Ok(total_deleted)
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM login_logs;
             DELETE FROM risk_assessments;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConnectionSnapshot, Detected, DeviceInfo, LocationInfo, RiskEvaluation, RiskFactor,
    };
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn create_test_store() -> SqliteLoginStore {
        SqliteLoginStore::in_memory().expect("Failed to create in-memory store")
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn entry(user: &str, success: bool, fingerprint: &str, at: DateTime<Utc>) -> LoginLogEntry {
        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), "[REDACTED]".to_string());
        LoginLogEntry {
            id: None,
            user_id: Some(user.to_string()),
            email: format!("{}@example.com", user),
            ip: "41.202.10.1".to_string(),
            device: DeviceInfo {
                browser_name: Detected::Known("Chrome".to_string()),
                ..DeviceInfo::default()
            },
            location: LocationInfo {
                country: Detected::Known("CI".to_string()),
                ..LocationInfo::unknown()
            },
            fingerprint: fingerprint.to_string(),
            success,
            failure_reason: if success { None } else { Some("bad password".to_string()) },
            headers,
            created_at: at,
        }
    }

    #[test]
    fn test_login_log_roundtrip() {
        let store = create_test_store();
        let original = entry("alice", true, "fp-1", base_time());

        let id = store.append_login_log(&original).unwrap();
        assert!(id > 0);

        let stored = store
            .last_successful_login("alice", base_time())
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.location.country.as_str(), Some("CI"));
        assert_eq!(stored.location.city, Detected::Unknown);
        assert_eq!(stored.device.browser_name.as_str(), Some("Chrome"));
        assert_eq!(stored.headers["authorization"], "[REDACTED]");
        assert_eq!(stored.created_at, base_time());
    }

    #[test]
    fn test_failed_attempt_without_user() {
        let store = create_test_store();
        let mut anonymous = entry("ghost", false, "fp-x", base_time());
        anonymous.user_id = None;
        store.append_login_log(&anonymous).unwrap();

        let range = TimeRange::trailing(base_time(), Duration::hours(1));
        assert_eq!(store.count_failed_logins("ghost", range).unwrap(), 0);
    }

    #[test]
    fn test_successful_logins_limit_and_order() {
        let store = create_test_store();
        for i in 0..5 {
            store
                .append_login_log(&entry("alice", true, "fp", base_time() + Duration::minutes(i)))
                .unwrap();
        }

        let range = TimeRange::trailing(base_time() + Duration::hours(1), Duration::days(1));
        let logins = store.successful_logins("alice", range, Some(3)).unwrap();
        assert_eq!(logins.len(), 3);
        assert_eq!(logins[0].created_at, base_time() + Duration::minutes(4));
        assert_eq!(logins[2].created_at, base_time() + Duration::minutes(2));

        let all = store.successful_logins("alice", range, None).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_risk_assessment_roundtrip() {
        let store = create_test_store();
        let snapshot = ConnectionSnapshot {
            user_id: Some("alice".to_string()),
            ip: "41.202.10.1".to_string(),
            user_agent: "curl/8.4.0".to_string(),
            device: DeviceInfo::default(),
            location: LocationInfo::unknown(),
            fingerprint: "fp".to_string(),
            timestamp: base_time(),
            headers: BTreeMap::new(),
        };
        let evaluation = RiskEvaluation::from_contributions(
            &[(RiskFactor::NewDevice, 30), (RiskFactor::NewCountry, 40)],
            50,
        );

        store
            .insert_risk_assessment(&RiskAssessment::new("alice", &evaluation, &snapshot))
            .unwrap();

        let assessments = store.recent_risk_assessments("alice", 10).unwrap();
        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0].risk_score, 70);
        assert_eq!(
            assessments[0].risk_factors,
            vec![RiskFactor::NewDevice, RiskFactor::NewCountry]
        );
        assert!(assessments[0].requires_verification);
        assert_eq!(assessments[0].connection, snapshot);
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heimdall.db");

        {
            let store = SqliteLoginStore::new(&path).unwrap();
            store.append_login_log(&entry("alice", true, "fp", base_time())).unwrap();
        }

        let reopened = SqliteLoginStore::new(&path).unwrap();
        assert!(reopened
            .has_successful_login_with_fingerprint(
                "alice",
                "fp",
                TimeRange::trailing(base_time(), Duration::days(1))
            )
            .unwrap());
    }

    #[test]
    fn test_clear_all() {
        let store = create_test_store();
        store.append_login_log(&entry("alice", true, "fp", base_time())).unwrap();
        store.clear_all().unwrap();
        assert!(store.last_successful_login("alice", base_time()).unwrap().is_none());
    }
}

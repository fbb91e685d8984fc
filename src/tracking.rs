//! Login attempt tracking
//!
//! Collect a snapshot, append it to the login log, then score and evaluate
//! the attempt against the user's history.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::collector::{ConnectionCollector, RequestInfo};
use crate::config::Config;
use crate::detection::{RiskScorer, SuspiciousActivityEvaluator};
use crate::geolocation::GeoLookup;
use crate::models::{ConnectionSnapshot, LoginAttempt, LoginLogEntry, LoginReport};
use crate::persistence::{LoginStore, PersistenceError};

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid user agent pattern: {0}")]
    Parser(#[from] regex::Error),
}

pub struct ConnectionTracker {
    collector: ConnectionCollector,
    store: Arc<dyn LoginStore>,
    scorer: RiskScorer,
    evaluator: SuspiciousActivityEvaluator,
}

impl ConnectionTracker {
    pub fn new(
        collector: ConnectionCollector,
        store: Arc<dyn LoginStore>,
        scorer: RiskScorer,
        evaluator: SuspiciousActivityEvaluator,
    ) -> Self {
        ConnectionTracker {
            collector,
            store,
            scorer,
            evaluator,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn LoginStore>,
        geo: Option<Arc<dyn GeoLookup>>,
    ) -> Result<Self, TrackingError> {
        let collector = ConnectionCollector::from_config(&config.collector, geo)?;
        let scorer = RiskScorer::new(store.clone(), config.risk.clone());
        let evaluator = SuspiciousActivityEvaluator::new(store.clone(), config.suspicious.clone());
        Ok(Self::new(collector, store, scorer, evaluator))
    }

    pub fn collector(&self) -> &ConnectionCollector {
        &self.collector
    }

    pub fn store(&self) -> &Arc<dyn LoginStore> {
        &self.store
    }

    /// Record a login attempt and report on it
    pub fn record_attempt(
        &self,
        request: &RequestInfo,
        attempt: &LoginAttempt,
        now: DateTime<Utc>,
    ) -> Result<LoginReport, TrackingError> {
        let snapshot = self
            .collector
            .collect(request, attempt.user_id.as_deref(), now);
        self.record_snapshot(snapshot, attempt)
    }

    /// Record an attempt whose snapshot was already collected
    ///
    /// A failed log write is returned to the caller. Scoring runs only for
    /// successful attempts by an identified user; the suspicious activity
    /// chain runs for any identified user.
    pub fn record_snapshot(
        &self,
        snapshot: ConnectionSnapshot,
        attempt: &LoginAttempt,
    ) -> Result<LoginReport, TrackingError> {
        let mut entry = LoginLogEntry::from_snapshot(&snapshot, attempt);
        entry.id = Some(self.store.append_login_log(&entry)?);

        log::debug!(
            "Logged {} attempt for {} from {} ({})",
            if entry.success { "successful" } else { "failed" },
            entry.email,
            entry.ip,
            entry.location.display_location()
        );

        let user_id = match entry.user_id.clone() {
            Some(user_id) => user_id,
            None => {
                return Ok(LoginReport {
                    entry,
                    risk: None,
                    verdict: None,
                })
            }
        };

        let risk = if entry.success {
            Some(self.scorer.assess(&user_id, &snapshot)?)
        } else {
            None
        };

        let verdict = self
            .evaluator
            .evaluate(&user_id, Some(&snapshot), snapshot.timestamp)?;

        Ok(LoginReport {
            entry,
            risk,
            verdict: Some(verdict),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::StaticGeoTable;
    use crate::models::{RiskFactor, Severity};
    use crate::persistence::InMemoryLoginStore;
    use chrono::{Duration, TimeZone};

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    fn tracker(store: Arc<InMemoryLoginStore>) -> ConnectionTracker {
        let table = StaticGeoTable::new()
            .with_entry("41.202.10.1".parse().unwrap(), "CI", "Abidjan")
            .with_entry("92.184.1.1".parse().unwrap(), "FR", "Paris");
        ConnectionTracker::from_config(&Config::default(), store, Some(Arc::new(table))).unwrap()
    }

    fn request(ip: &str) -> RequestInfo {
        RequestInfo::new().with_header("user-agent", UA).with_ip(ip)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_first_login_is_logged_and_scored() {
        let store = Arc::new(InMemoryLoginStore::new());
        let tracker = tracker(store.clone());

        let report = tracker
            .record_attempt(
                &request("41.202.10.1"),
                &LoginAttempt::succeeded("u1", "u1@example.com"),
                now(),
            )
            .unwrap();

        assert_eq!(store.login_count(), 1);
        assert!(report.entry.id.is_some());
        assert_eq!(report.entry.location.country.as_str(), Some("CI"));

        let risk = report.risk.unwrap();
        assert_eq!(risk.risk_score, 30);
        assert_eq!(risk.risk_factors, vec![RiskFactor::NewDevice]);
        assert!(!report.verdict.unwrap().suspicious);
    }

    #[test]
    fn test_failed_attempt_is_not_scored() {
        let store = Arc::new(InMemoryLoginStore::new());
        let tracker = tracker(store.clone());

        let report = tracker
            .record_attempt(
                &request("41.202.10.1"),
                &LoginAttempt::failed(Some("u1".to_string()), "u1@example.com", "bad password"),
                now(),
            )
            .unwrap();

        assert!(report.risk.is_none());
        assert!(report.verdict.is_some());
        assert_eq!(report.entry.failure_reason.as_deref(), Some("bad password"));
    }

    #[test]
    fn test_unknown_user_is_logged_only() {
        let store = Arc::new(InMemoryLoginStore::new());
        let tracker = tracker(store.clone());

        let report = tracker
            .record_attempt(
                &request("41.202.10.1"),
                &LoginAttempt::failed(None, "nobody@example.com", "no such account"),
                now(),
            )
            .unwrap();

        assert_eq!(store.login_count(), 1);
        assert!(report.risk.is_none());
        assert!(report.verdict.is_none());
        assert!(report.to_alert().is_none());
    }

    #[test]
    fn test_brute_force_alert() {
        let store = Arc::new(InMemoryLoginStore::new());
        let tracker = tracker(store);

        let mut last = None;
        for i in 0..5 {
            last = Some(
                tracker
                    .record_attempt(
                        &request("41.202.10.1"),
                        &LoginAttempt::failed(Some("u1".to_string()), "u1@example.com", "bad password"),
                        now() + Duration::minutes(i),
                    )
                    .unwrap(),
            );
        }

        let report = last.unwrap();
        assert!(report.is_suspicious());
        let alert = report.to_alert().unwrap();
        assert_eq!(alert.rule, "brute_force");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.user_id, "u1");
    }

    #[test]
    fn test_country_change_between_logins() {
        let store = Arc::new(InMemoryLoginStore::new());
        let tracker = tracker(store);
        let attempt = LoginAttempt::succeeded("u1", "u1@example.com");

        tracker
            .record_attempt(&request("41.202.10.1"), &attempt, now())
            .unwrap();
        let report = tracker
            .record_attempt(&request("92.184.1.1"), &attempt, now() + Duration::hours(1))
            .unwrap();

        let risk = report.risk.as_ref().unwrap();
        assert!(risk.has_factor(RiskFactor::NewCountry));
        assert!(!risk.has_factor(RiskFactor::NewCity));
        // The fingerprint includes the IP, so the device is new too
        assert!(risk.has_factor(RiskFactor::NewDevice));
        assert_eq!(
            report.verdict.as_ref().and_then(|v| v.reason()),
            Some("geo mismatch")
        );
    }
}

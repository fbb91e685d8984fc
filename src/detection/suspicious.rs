use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::SuspiciousConfig;
use crate::models::{ConnectionSnapshot, Finding, SuspiciousVerdict};
use crate::persistence::{LoginStore, PersistenceError, TimeRange};

/// Ordered rule chain classifying an account as suspicious
///
/// Rules are checked from most to least severe and the first hit wins:
/// multiple countries, brute force, geo mismatch, new device. The last two
/// need the connection being evaluated.
pub struct SuspiciousActivityEvaluator {
    store: Arc<dyn LoginStore>,
    config: SuspiciousConfig,
}

impl SuspiciousActivityEvaluator {
    pub fn new(store: Arc<dyn LoginStore>, config: SuspiciousConfig) -> Self {
        SuspiciousActivityEvaluator { store, config }
    }

    /// Evaluate a user's recent history, optionally against the current connection
    pub fn evaluate(
        &self,
        user_id: &str,
        current: Option<&ConnectionSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<SuspiciousVerdict, PersistenceError> {
        let window = TimeRange::trailing(now, Duration::hours(self.config.window_hours));

        if let Some(finding) = self.check_multiple_countries(user_id, window)? {
            return Ok(self.flag(user_id, finding));
        }

        if let Some(finding) = self.check_brute_force(user_id, window)? {
            return Ok(self.flag(user_id, finding));
        }

        if let Some(snapshot) = current {
            if let Some(finding) = self.check_geo_mismatch(user_id, snapshot)? {
                return Ok(self.flag(user_id, finding));
            }

            if let Some(finding) = self.check_new_device(user_id, snapshot)? {
                return Ok(self.flag(user_id, finding));
            }
        }

        Ok(SuspiciousVerdict::clear())
    }

    /// History-only evaluation, used when polling accounts outside a login
    pub fn evaluate_history(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SuspiciousVerdict, PersistenceError> {
        self.evaluate(user_id, None, now)
    }

    fn flag(&self, user_id: &str, finding: Finding) -> SuspiciousVerdict {
        log::info!(
            "Suspicious activity for {} [{}]: {}",
            user_id,
            finding.severity(),
            finding.describe()
        );
        SuspiciousVerdict::flagged(finding)
    }

    fn check_multiple_countries(
        &self,
        user_id: &str,
        window: TimeRange,
    ) -> Result<Option<Finding>, PersistenceError> {
        let logins = self.store.successful_logins(user_id, window, None)?;
        let countries: BTreeSet<String> = logins
            .into_iter()
            .filter_map(|entry| entry.location.country.into_option())
            .collect();

        if countries.len() > self.config.max_countries {
            Ok(Some(Finding::MultipleCountries {
                countries: countries.into_iter().collect(),
            }))
        } else {
            Ok(None)
        }
    }

    fn check_brute_force(
        &self,
        user_id: &str,
        window: TimeRange,
    ) -> Result<Option<Finding>, PersistenceError> {
        let failures = self.store.failed_logins(user_id, window)?;
        if failures.len() < self.config.brute_force_attempts {
            return Ok(None);
        }

        let source_ips: BTreeSet<String> = failures.iter().map(|e| e.ip.clone()).collect();
        Ok(Some(Finding::BruteForce {
            attempts: failures.len(),
            source_ips: source_ips.into_iter().collect(),
        }))
    }

    fn check_geo_mismatch(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<Option<Finding>, PersistenceError> {
        let last = self
            .store
            .last_successful_login(user_id, strictly_before(snapshot))?;

        let previous = match last {
            Some(entry) => entry.location.country,
            None => return Ok(None),
        };

        match (previous.as_str(), snapshot.location.country.as_str()) {
            (Some(previous_country), Some(current_country))
                if previous_country != current_country =>
            {
                Ok(Some(Finding::GeoMismatch {
                    previous_country: previous_country.to_string(),
                    current_country: current_country.to_string(),
                }))
            }
            _ => Ok(None),
        }
    }

    fn check_new_device(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<Option<Finding>, PersistenceError> {
        let history = self.store.recent_logins(
            user_id,
            strictly_before(snapshot),
            self.config.device_history_limit,
        )?;

        // Flags when any earlier login came from another device
        if !history.iter().any(|e| e.fingerprint != snapshot.fingerprint) {
            return Ok(None);
        }

        Ok(Some(Finding::NewDevice {
            fingerprint: snapshot.fingerprint.clone(),
        }))
    }
}

fn strictly_before(snapshot: &ConnectionSnapshot) -> DateTime<Utc> {
    snapshot.timestamp - Duration::milliseconds(1)
}

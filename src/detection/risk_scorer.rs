use chrono::{Duration, Timelike};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RiskConfig;
use crate::models::{ConnectionSnapshot, RiskAssessment, RiskEvaluation, RiskFactor};
use crate::persistence::{LoginStore, PersistenceError, TimeRange};

/// Scores a connection against the user's login history
///
/// Every check is independent and adds a fixed number of points. History is
/// read strictly before the snapshot's timestamp.
pub struct RiskScorer {
    store: Arc<dyn LoginStore>,
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(store: Arc<dyn LoginStore>, config: RiskConfig) -> Self {
        RiskScorer { store, config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score a connection and persist the assessment when the score is non-zero
    pub fn assess(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<RiskEvaluation, PersistenceError> {
        let evaluation = self.evaluate(user_id, snapshot)?;

        if evaluation.risk_score > 0 {
            let assessment = RiskAssessment::new(user_id, &evaluation, snapshot);
            if let Err(e) = self.store.insert_risk_assessment(&assessment) {
                log::warn!("Failed to store risk assessment for {}: {}", user_id, e);
            }
        }

        Ok(evaluation)
    }

    /// Score a connection without persisting anything
    pub fn evaluate(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<RiskEvaluation, PersistenceError> {
        let weights = &self.config.weights;
        let mut contributions = Vec::new();

        if self.is_new_device(user_id, snapshot)? {
            contributions.push((RiskFactor::NewDevice, weights.new_device));
        }

        match self.location_change(user_id, snapshot)? {
            Some(RiskFactor::NewCountry) => {
                contributions.push((RiskFactor::NewCountry, weights.new_country))
            }
            Some(RiskFactor::NewCity) => contributions.push((RiskFactor::NewCity, weights.new_city)),
            _ => {}
        }

        if self.has_recent_failures(user_id, snapshot)? {
            contributions.push((
                RiskFactor::RecentFailedAttempts,
                weights.recent_failed_attempts,
            ));
        }

        if self.is_unusual_hour(user_id, snapshot)? {
            contributions.push((RiskFactor::UnusualLoginHour, weights.unusual_login_hour));
        }

        let evaluation =
            RiskEvaluation::from_contributions(&contributions, self.config.verification_threshold);

        log::debug!(
            "Risk for {} from {}: {} {:?}",
            user_id,
            snapshot.ip,
            evaluation.risk_score,
            evaluation.risk_factors
        );

        Ok(evaluation)
    }

    /// No earlier successful login used this fingerprint
    fn is_new_device(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<bool, PersistenceError> {
        let history = TimeRange::all_before(snapshot.timestamp);
        let seen = self.store.has_successful_login_with_fingerprint(
            user_id,
            &snapshot.fingerprint,
            history,
        )?;
        Ok(!seen)
    }

    /// Compare against the newest successful login in the geo window
    ///
    /// Country is checked first; a city change only counts within a known,
    /// unchanged country. Unknown locations on either side give no signal.
    fn location_change(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<Option<RiskFactor>, PersistenceError> {
        let range = TimeRange::before(
            snapshot.timestamp,
            Duration::days(self.config.geo_window_days),
        );
        let recent = self.store.successful_logins(
            user_id,
            range,
            Some(self.config.geo_history_limit),
        )?;

        let previous = match recent.first() {
            Some(entry) => &entry.location,
            None => return Ok(None),
        };
        let current = &snapshot.location;

        if current.country.differs_from(&previous.country) {
            Ok(Some(RiskFactor::NewCountry))
        } else if current.country.matches(&previous.country)
            && current.city.differs_from(&previous.city)
        {
            Ok(Some(RiskFactor::NewCity))
        } else {
            Ok(None)
        }
    }

    fn has_recent_failures(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<bool, PersistenceError> {
        let range = TimeRange::before(
            snapshot.timestamp,
            Duration::hours(self.config.failure_window_hours),
        );
        let failures = self.store.count_failed_logins(user_id, range)?;
        Ok(failures > self.config.max_recent_failures)
    }

    /// Current UTC hour is outside the hours the user usually logs in
    ///
    /// Users without successful logins in the window have no usual hours
    /// and are not flagged.
    fn is_unusual_hour(
        &self,
        user_id: &str,
        snapshot: &ConnectionSnapshot,
    ) -> Result<bool, PersistenceError> {
        let range = TimeRange::before(
            snapshot.timestamp,
            Duration::days(self.config.usual_hours_window_days),
        );
        let logins = self.store.successful_logins(user_id, range, None)?;
        if logins.is_empty() {
            return Ok(false);
        }

        let mut per_hour: HashMap<u32, usize> = HashMap::new();
        for login in &logins {
            *per_hour.entry(login.created_at.hour()).or_insert(0) += 1;
        }

        let current_hour = snapshot.timestamp.hour();
        let usual = per_hour
            .get(&current_hour)
            .is_some_and(|count| *count >= self.config.usual_hour_min_logins);

        Ok(!usual)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ConnectionSnapshot;

/// A named condition contributing a fixed number of points to a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    #[serde(rename = "new device")]
    NewDevice,
    #[serde(rename = "new country")]
    NewCountry,
    #[serde(rename = "new city")]
    NewCity,
    #[serde(rename = "recent failed attempts")]
    RecentFailedAttempts,
    #[serde(rename = "unusual login hour")]
    UnusualLoginHour,
}

impl RiskFactor {
    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::NewDevice => "new device",
            RiskFactor::NewCountry => "new country",
            RiskFactor::NewCity => "new city",
            RiskFactor::RecentFailedAttempts => "recent failed attempts",
            RiskFactor::UnusualLoginHour => "unusual login hour",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "new device" => Some(RiskFactor::NewDevice),
            "new country" => Some(RiskFactor::NewCountry),
            "new city" => Some(RiskFactor::NewCity),
            "recent failed attempts" => Some(RiskFactor::RecentFailedAttempts),
            "unusual login hour" => Some(RiskFactor::UnusualLoginHour),
            _ => None,
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of scoring one connection against the user's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    pub risk_score: u32,
    pub risk_factors: Vec<RiskFactor>,
    pub requires_verification: bool,
}

impl RiskEvaluation {
    /// Sum the contributions and apply the verification threshold
    ///
    /// `requires_verification` is strictly `score > threshold`.
    pub fn from_contributions(contributions: &[(RiskFactor, u32)], threshold: u32) -> Self {
        let risk_score = contributions.iter().map(|(_, points)| *points).sum();
        RiskEvaluation {
            risk_score,
            risk_factors: contributions.iter().map(|(factor, _)| *factor).collect(),
            requires_verification: risk_score > threshold,
        }
    }

    pub fn has_factor(&self, factor: RiskFactor) -> bool {
        self.risk_factors.contains(&factor)
    }
}

/// Persisted record of a non-zero risk evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Option<i64>,
    pub user_id: String,
    pub risk_score: u32,
    pub risk_factors: Vec<RiskFactor>,
    pub connection: ConnectionSnapshot,
    pub requires_verification: bool,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn new(user_id: &str, evaluation: &RiskEvaluation, connection: &ConnectionSnapshot) -> Self {
        RiskAssessment {
            id: None,
            user_id: user_id.to_string(),
            risk_score: evaluation.risk_score,
            risk_factors: evaluation.risk_factors.clone(),
            connection: connection.clone(),
            requires_verification: evaluation.requires_verification,
            created_at: connection.timestamp,
        }
    }
}

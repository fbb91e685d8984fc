use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LoginLogEntry, RiskEvaluation, Severity, SuspiciousVerdict};

/// Everything the tracker learned about one login attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReport {
    pub entry: LoginLogEntry,
    /// Present for successful attempts by identified users
    pub risk: Option<RiskEvaluation>,
    /// Present whenever the user is identified
    pub verdict: Option<SuspiciousVerdict>,
}

impl LoginReport {
    pub fn is_suspicious(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.suspicious)
    }

    pub fn requires_verification(&self) -> bool {
        self.risk.as_ref().is_some_and(|r| r.requires_verification)
    }

    /// Build the alert for this report, if it warrants one
    ///
    /// Suspicious findings take precedence; otherwise a risk evaluation
    /// requiring verification raises a medium alert.
    pub fn to_alert(&self) -> Option<Alert> {
        let user_id = self.entry.user_id.clone()?;
        let base = |rule: &str, severity: Severity, description: String| Alert {
            rule: rule.to_string(),
            severity,
            user_id: user_id.clone(),
            email: self.entry.email.clone(),
            ip: self.entry.ip.clone(),
            location: self.entry.location.display_location(),
            description,
            timestamp: self.entry.created_at,
        };

        if let Some(finding) = self.verdict.as_ref().and_then(|v| v.finding.as_ref()) {
            return Some(base(finding.rule_name(), finding.severity(), finding.describe()));
        }

        match &self.risk {
            Some(risk) if risk.requires_verification => {
                let factors: Vec<&str> = risk.risk_factors.iter().map(|f| f.label()).collect();
                Some(base(
                    "high_risk_login",
                    Severity::Medium,
                    format!("Risk score {} ({})", risk.risk_score, factors.join(", ")),
                ))
            }
            _ => None,
        }
    }
}

/// Notification sent to alert channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub rule: String,
    pub severity: Severity,
    pub user_id: String,
    pub email: String,
    pub ip: String,
    pub location: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}

/// The rule that flagged an account, with the evidence it found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Finding {
    /// Successful logins from too many countries in the window
    MultipleCountries { countries: Vec<String> },
    /// Too many failed attempts in the window
    BruteForce {
        attempts: usize,
        source_ips: Vec<String>,
    },
    /// Current country differs from the last successful login's country
    GeoMismatch {
        previous_country: String,
        current_country: String,
    },
    /// No earlier login from this user used the current fingerprint
    NewDevice { fingerprint: String },
}

impl Finding {
    pub fn reason(&self) -> &'static str {
        match self {
            Finding::MultipleCountries { .. } => "multiple countries in 24h",
            Finding::BruteForce { .. } => "too many failed attempts",
            Finding::GeoMismatch { .. } => "geo mismatch",
            Finding::NewDevice { .. } => "new device",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Finding::MultipleCountries { .. } | Finding::BruteForce { .. } => Severity::High,
            Finding::GeoMismatch { .. } => Severity::Medium,
            Finding::NewDevice { .. } => Severity::Low,
        }
    }

    pub fn rule_name(&self) -> &'static str {
        match self {
            Finding::MultipleCountries { .. } => "multiple_countries",
            Finding::BruteForce { .. } => "brute_force",
            Finding::GeoMismatch { .. } => "geo_mismatch",
            Finding::NewDevice { .. } => "new_device",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Finding::MultipleCountries { countries } => {
                format!("Successful logins from {} countries: {}", countries.len(), countries.join(", "))
            }
            Finding::BruteForce { attempts, source_ips } => format!(
                "{} failed attempts from {} source IP(s): {}",
                attempts,
                source_ips.len(),
                source_ips.join(", ")
            ),
            Finding::GeoMismatch {
                previous_country,
                current_country,
            } => format!(
                "Login from {} after last successful login from {}",
                current_country, previous_country
            ),
            Finding::NewDevice { fingerprint } => {
                format!("Login from unrecognized device {}", fingerprint)
            }
        }
    }
}

/// Outcome of the suspicious activity rule chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousVerdict {
    pub suspicious: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<Finding>,
}

impl SuspiciousVerdict {
    pub fn clear() -> Self {
        SuspiciousVerdict {
            suspicious: false,
            finding: None,
        }
    }

    pub fn flagged(finding: Finding) -> Self {
        SuspiciousVerdict {
            suspicious: true,
            finding: Some(finding),
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.finding.as_ref().map(Finding::reason)
    }

    pub fn severity(&self) -> Option<Severity> {
        self.finding.as_ref().map(Finding::severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_is_tagged() {
        let finding = Finding::BruteForce {
            attempts: 6,
            source_ips: vec!["1.1.1.1".to_string()],
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["rule"], "brute_force");
        assert_eq!(json["attempts"], 6);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::from_str("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_str("critical"), None);
    }

    #[test]
    fn test_clear_verdict_omits_finding() {
        let json = serde_json::to_string(&SuspiciousVerdict::clear()).unwrap();
        assert_eq!(json, r#"{"suspicious":false}"#);
    }
}

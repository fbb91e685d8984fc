mod connection;
mod detected;
mod login_log;
mod report;
mod risk;
mod verdict;

pub use connection::{ConnectionSnapshot, Coordinates, DeviceInfo, LocationInfo};
pub use detected::Detected;
pub use login_log::{LoginAttempt, LoginLogEntry};
pub use report::{Alert, LoginReport};
pub use risk::{RiskAssessment, RiskEvaluation, RiskFactor};
pub use verdict::{Finding, Severity, SuspiciousVerdict};

pub mod alerting;
pub mod collector;
pub mod config;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod output;
pub mod persistence;
pub mod tracking;

// Re-export commonly used types
pub use alerting::{AlertDispatcher, AlertQueue};
pub use collector::{ConnectionCollector, RequestInfo};
pub use config::Config;
pub use detection::{RiskScorer, SuspiciousActivityEvaluator};
pub use geolocation::{GeoIpService, GeoLookup, HttpGeoLocator, StaticGeoTable};
pub use models::{
    ConnectionSnapshot, Detected, Finding, LoginAttempt, LoginLogEntry, LoginReport,
    RiskAssessment, RiskEvaluation, RiskFactor, Severity, SuspiciousVerdict,
};
pub use persistence::{InMemoryLoginStore, LoginStore, SqliteLoginStore, TimeRange};
pub use tracking::{ConnectionTracker, TrackingError};

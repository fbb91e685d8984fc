//! Login risk detection
//!
//! [`RiskScorer`] turns a connection into an additive risk score;
//! [`SuspiciousActivityEvaluator`] classifies the account with the first
//! matching rule. Both read history through [`LoginStore`](crate::persistence::LoginStore).

pub mod risk_scorer;
pub mod suspicious;

pub use risk_scorer::RiskScorer;
pub use suspicious::SuspiciousActivityEvaluator;

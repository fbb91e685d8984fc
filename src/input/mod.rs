//! Login event sources
//!
//! Events arrive as JSON [`LoginEvent`] records, either appended to a
//! JSON-lines file or sent one per UDP datagram.

pub mod datagram_listener;
pub mod file_tailer;

pub use datagram_listener::DatagramListener;
pub use file_tailer::FileTailer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::RequestInfo;
use crate::models::LoginAttempt;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed login event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Empty login event")]
    Empty,
}

/// A login attempt reported by the authentication service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEvent {
    #[serde(default)]
    pub user_id: Option<String>,
    pub email: String,
    pub success: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub request: RequestInfo,
    /// When the attempt happened; defaults to the time it was received
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LoginEvent {
    /// Parse one JSON record, normalizing header names
    pub fn parse(text: &str) -> Result<Self, InputError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(InputError::Empty);
        }
        let mut event: LoginEvent = serde_json::from_str(text)?;
        event.request = event.request.normalized();
        Ok(event)
    }

    pub fn attempt(&self) -> LoginAttempt {
        LoginAttempt {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            success: self.success,
            failure_reason: self.failure_reason.clone(),
        }
    }

    pub fn occurred_at(&self, received: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp.unwrap_or(received)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ConnectionSnapshot, DeviceInfo, LocationInfo};

/// Outcome of an authentication attempt as reported by the login flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub user_id: Option<String>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl LoginAttempt {
    pub fn succeeded(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        LoginAttempt {
            user_id: Some(user_id.into()),
            email: email.into(),
            success: true,
            failure_reason: None,
        }
    }

    pub fn failed(
        user_id: Option<String>,
        email: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LoginAttempt {
            user_id,
            email: email.into(),
            success: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// A persisted login attempt. Never modified after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginLogEntry {
    /// Assigned by the store on append
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub email: String,
    pub ip: String,
    pub device: DeviceInfo,
    pub location: LocationInfo,
    pub fingerprint: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl LoginLogEntry {
    /// Build the log record for an attempt from its connection snapshot
    pub fn from_snapshot(snapshot: &ConnectionSnapshot, attempt: &LoginAttempt) -> Self {
        LoginLogEntry {
            id: None,
            user_id: attempt.user_id.clone().or_else(|| snapshot.user_id.clone()),
            email: attempt.email.clone(),
            ip: snapshot.ip.clone(),
            device: snapshot.device.clone(),
            location: snapshot.location.clone(),
            fingerprint: snapshot.fingerprint.clone(),
            success: attempt.success,
            failure_reason: if attempt.success {
                None
            } else {
                attempt.failure_reason.clone()
            },
            headers: snapshot.headers.clone(),
            created_at: snapshot.timestamp,
        }
    }
}

use std::collections::{BTreeMap, HashSet};

/// Replacement for redacted header values
pub const REDACTED: &str = "[REDACTED]";

/// Headers whose values are never stored
pub const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "x-auth-token"];

/// Redacts credential-bearing headers before a snapshot is stored
#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    sensitive: HashSet<String>,
}

impl HeaderSanitizer {
    pub fn new() -> Self {
        Self::with_extra(&[])
    }

    /// Redact the built-in set plus `extra` header names (case-insensitive)
    pub fn with_extra(extra: &[String]) -> Self {
        let sensitive = SENSITIVE_HEADERS
            .iter()
            .map(|name| name.to_string())
            .chain(extra.iter().map(|name| name.to_ascii_lowercase()))
            .collect();
        HeaderSanitizer { sensitive }
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(&name.to_ascii_lowercase())
    }

    pub fn sanitize(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if self.is_sensitive(name) {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (name.clone(), value)
            })
            .collect()
    }
}

impl Default for HeaderSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

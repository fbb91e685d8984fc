use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that was either resolved from the request or could not be determined.
///
/// Unresolved values never compare as a match against each other through
/// [`Detected::differs_from`] or [`Detected::matches`], so an unknown country
/// on both sides is "no signal" rather than "same place".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    from = "Option<T>",
    into = "Option<T>",
    bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
)]
pub enum Detected<T: Clone> {
    Known(T),
    Unknown,
}

impl<T: Clone> Default for Detected<T> {
    fn default() -> Self {
        Detected::Unknown
    }
}

impl<T: Clone> Detected<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Detected::Known(_))
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            Detected::Known(value) => Some(value),
            Detected::Unknown => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        self.into()
    }
}

impl<T: Clone + PartialEq> Detected<T> {
    /// True only when both sides are known and equal
    pub fn matches(&self, other: &Self) -> bool {
        matches!((self, other), (Detected::Known(a), Detected::Known(b)) if a == b)
    }

    /// True only when both sides are known and different
    pub fn differs_from(&self, other: &Self) -> bool {
        matches!((self, other), (Detected::Known(a), Detected::Known(b)) if a != b)
    }
}

impl Detected<String> {
    /// Build from a raw string, treating blank input as unknown
    pub fn from_text(value: impl AsRef<str>) -> Self {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            Detected::Unknown
        } else {
            Detected::Known(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_known().map(String::as_str)
    }
}

impl<T: Clone> From<Option<T>> for Detected<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Detected::Known(v),
            None => Detected::Unknown,
        }
    }
}

impl<T: Clone> From<Detected<T>> for Option<T> {
    fn from(value: Detected<T>) -> Self {
        match value {
            Detected::Known(v) => Some(v),
            Detected::Unknown => None,
        }
    }
}

impl<T: Clone + fmt::Display> fmt::Display for Detected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detected::Known(value) => value.fmt(f),
            Detected::Unknown => f.write_str("Unknown"),
        }
    }
}

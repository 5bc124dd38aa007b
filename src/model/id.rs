//! Model identifiers.
//!
//! Ids are externally assigned by the model source and must be unique within a
//! visualization. Sources may use either strings or numbers; both are
//! normalized to their string form so that parent references match ids
//! regardless of how they were typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub String);

impl ModelId {
    /// Create a new ModelId.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract an id from a JSON value.
    ///
    /// Strings and numbers are accepted. Anything else (including `null` and
    /// the empty string) yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    #[inline]
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ModelId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for ModelId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

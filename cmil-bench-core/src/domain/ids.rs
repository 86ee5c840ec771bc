use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a dataset example.
///
/// Datasets store ids as JSON strings or integers; both normalize to the same
/// textual form so predictions, judge artifacts and test data join on equal
/// keys.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExampleId(pub String);

impl ExampleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds an id from a raw JSON value, rejecting anything that is not a
    /// non-empty string or a number.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ExampleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        ExampleId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid example id: {}", value)))
    }
}

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExampleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExampleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ExampleId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

//! Optimizer namespace key.

use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};

/// Grouping key under which the optimizer keeps fitness history.
///
/// Supplied explicitly by the caller; never derived from a type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace, rejecting empty or whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyNamespace);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Namespace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_blank() {
        assert_eq!(Namespace::new(""), Err(CoreError::EmptyNamespace));
        assert_eq!(Namespace::new("   \t"), Err(CoreError::EmptyNamespace));
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let ns = Namespace::new("  AgentA ").unwrap();
        assert_eq!(ns.as_str(), "AgentA");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Namespace = serde_json::from_str("\"Box\"").unwrap();
        assert_eq!(ok.to_string(), "Box");
        assert!(serde_json::from_str::<Namespace>("\"\"").is_err());
    }
}

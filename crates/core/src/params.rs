//! Parameter set - the optimizer-controlled properties of an agent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};

/// A parameter assignment as exchanged with the optimizer.
pub type Candidate = BTreeMap<String, f64>;

/// Ordered, fixed-name mapping from parameter name to value.
///
/// Names are declared once at construction and keep their declaration
/// order. Only values change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, f64)>", into = "Vec<(String, f64)>")]
pub struct ParameterSet {
    entries: Vec<(String, f64)>,
}

/// What happened when a candidate was written into a [`ParameterSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverwriteReport {
    /// Number of declared parameters that received a new value
    pub applied: usize,

    /// Names sent by the optimizer that are not declared (ignored)
    pub unknown: Vec<String>,

    /// Declared names the optimizer left out (prior value kept)
    pub missing: Vec<String>,

    /// First declared name whose incoming value was not finite.
    /// When set, nothing was written.
    pub rejected: Option<String>,
}

impl OverwriteReport {
    /// True when every declared name was written and nothing extra arrived.
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty() && self.missing.is_empty() && self.rejected.is_none()
    }

    /// True when at least one value was written.
    pub fn was_applied(&self) -> bool {
        self.rejected.is_none() && self.applied > 0
    }
}

impl ParameterSet {
    /// Declare a parameter set with its default values.
    pub fn new<I, N>(declared: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, f64)>,
        N: Into<String>,
    {
        let mut entries: Vec<(String, f64)> = Vec::new();
        for (name, value) in declared {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(CoreError::EmptyParameterName);
            }
            if entries.iter().any(|(n, _)| *n == name) {
                return Err(CoreError::DuplicateParameter(name));
            }
            if !value.is_finite() {
                return Err(CoreError::NonFiniteValue { name });
            }
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    /// Value of a declared parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Declared names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Declared names as owned strings (request payloads).
    pub fn name_list(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Iterate `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot as an optimizer candidate.
    pub fn to_candidate(&self) -> Candidate {
        self.entries.iter().cloned().collect()
    }

    /// Write a candidate into this set.
    ///
    /// Unknown names are ignored, missing names keep their value, and a
    /// candidate carrying any non-finite value for a declared name is
    /// rejected whole.
    pub fn overwrite(&mut self, incoming: &Candidate) -> OverwriteReport {
        let mut report = OverwriteReport {
            unknown: incoming
                .keys()
                .filter(|k| self.get(k).is_none())
                .cloned()
                .collect(),
            ..Default::default()
        };

        if let Some((name, _)) = self
            .entries
            .iter()
            .find(|(n, _)| incoming.get(n).is_some_and(|v| !v.is_finite()))
        {
            report.rejected = Some(name.clone());
            return report;
        }

        for (name, value) in self.entries.iter_mut() {
            match incoming.get(name.as_str()) {
                Some(v) => {
                    *value = *v;
                    report.applied += 1;
                }
                None => report.missing.push(name.clone()),
            }
        }

        report
    }
}

impl TryFrom<Vec<(String, f64)>> for ParameterSet {
    type Error = CoreError;

    fn try_from(value: Vec<(String, f64)>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ParameterSet> for Vec<(String, f64)> {
    fn from(set: ParameterSet) -> Self {
        set.entries
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:.4}", name, value)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_params() -> ParameterSet {
        ParameterSet::new([("red", 0.2), ("green", 0.2), ("blue", 0.2)]).unwrap()
    }

    fn candidate(pairs: &[(&str, f64)]) -> Candidate {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_keeps_declaration_order() {
        let params = color_params();
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["red", "green", "blue"]);
    }

    #[test]
    fn test_rejects_bad_declarations() {
        assert_eq!(
            ParameterSet::new([("x", 1.0), ("x", 2.0)]),
            Err(CoreError::DuplicateParameter("x".into()))
        );
        assert_eq!(ParameterSet::new([("", 1.0)]), Err(CoreError::EmptyParameterName));
        assert!(matches!(
            ParameterSet::new([("x", f64::NAN)]),
            Err(CoreError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn test_full_overwrite_is_clean() {
        let mut params = color_params();
        let report = params.overwrite(&candidate(&[("red", 0.9), ("green", 0.1), ("blue", 0.5)]));
        assert!(report.is_clean());
        assert_eq!(report.applied, 3);
        assert_eq!(params.get("red"), Some(0.9));
        assert_eq!(params.get("blue"), Some(0.5));
    }

    #[test]
    fn test_unknown_names_ignored_and_missing_retained() {
        let mut params = color_params();
        let report = params.overwrite(&candidate(&[("red", 0.7), ("alpha", 1.0)]));

        assert_eq!(report.unknown, vec!["alpha".to_string()]);
        assert_eq!(report.missing, vec!["green".to_string(), "blue".to_string()]);
        assert_eq!(params.get("red"), Some(0.7));
        assert_eq!(params.get("green"), Some(0.2));
        assert_eq!(params.get("alpha"), None);
        assert!(report.was_applied());
    }

    #[test]
    fn test_non_finite_candidate_rejected_whole() {
        let mut params = color_params();
        let before = params.clone();
        let report = params.overwrite(&candidate(&[("red", 0.5), ("green", f64::INFINITY), ("blue", 0.5)]));

        assert_eq!(report.rejected.as_deref(), Some("green"));
        assert!(!report.was_applied());
        assert_eq!(params, before);
    }

    #[test]
    fn test_empty_candidate_applies_nothing() {
        let mut params = color_params();
        let report = params.overwrite(&Candidate::new());
        assert!(!report.was_applied());
        assert_eq!(report.missing.len(), 3);
        assert_eq!(params, color_params());
    }

    #[test]
    fn test_serde_preserves_order_and_validates() {
        let params = color_params();
        let json = serde_json::to_string(&params).unwrap();
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);

        assert!(serde_json::from_str::<ParameterSet>(r#"[["x",1.0],["x",2.0]]"#).is_err());
    }
}

//! Label queries for `List`/`Watch` (spec §3: "queryable with equality,
//! existence, and set-membership").

use serde::{Deserialize, Serialize};

use crate::metadata::Labels;

/// A single label matcher.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LabelMatch {
    /// `key == value`
    Equals { key: String, value: String },
    /// `key != value`
    NotEquals { key: String, value: String },
    /// `key` is present, any value.
    Exists { key: String },
    /// `key` is absent.
    NotExists { key: String },
    /// `key` is present and its value is one of `values`.
    In { key: String, values: Vec<String> },
    /// `key` is absent, or its value is not one of `values`.
    NotIn { key: String, values: Vec<String> },
}

impl LabelMatch {
    fn matches(&self, labels: &Labels) -> bool {
        match self {
            LabelMatch::Equals { key, value } => labels.get(key).is_some_and(|v| v == value),
            LabelMatch::NotEquals { key, value } => labels.get(key).is_none_or(|v| v != value),
            LabelMatch::Exists { key } => labels.contains_key(key),
            LabelMatch::NotExists { key } => !labels.contains_key(key),
            LabelMatch::In { key, values } => {
                labels.get(key).is_some_and(|v| values.iter().any(|x| x == v))
            }
            LabelMatch::NotIn { key, values } => {
                labels.get(key).is_none_or(|v| values.iter().all(|x| x != v))
            }
        }
    }
}

/// A conjunction of [`LabelMatch`] terms; a resource matches a query iff it
/// matches every term.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LabelQuery {
    #[serde(default)]
    terms: Vec<LabelMatch>,
}

impl LabelQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, term: LabelMatch) -> Self {
        self.terms.push(term);
        self
    }

    #[must_use]
    pub fn equals(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(LabelMatch::Equals {
            key: key.into(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn exists(self, key: impl Into<String>) -> Self {
        self.with(LabelMatch::Exists { key: key.into() })
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.terms.iter().all(|t| t.matches(labels))
    }

    /// Builds an all-`Equals` query from a plain label map, the shape
    /// `WatchKind`'s `labelQuery?` argument takes on the wire (spec §4.1).
    pub fn from_labels(labels: Labels) -> Self {
        labels.into_iter().fold(Self::new(), |query, (key, value)| query.equals(key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The number of matcher terms, used by config-patch layering to rank
    /// patches by selector specificity (spec §4.4: "deepest-label-wins").
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn equals_and_exists() {
        let q = LabelQuery::new()
            .equals("cluster", "c1")
            .exists("role");
        assert!(q.matches(&labels(&[("cluster", "c1"), ("role", "worker")])));
        assert!(!q.matches(&labels(&[("cluster", "c2"), ("role", "worker")])));
        assert!(!q.matches(&labels(&[("cluster", "c1")])));
    }

    #[test]
    fn set_membership() {
        let q = LabelQuery::new().with(LabelMatch::In {
            key: "role".into(),
            values: vec!["control-plane".into(), "worker".into()],
        });
        assert!(q.matches(&labels(&[("role", "worker")])));
        assert!(!q.matches(&labels(&[("role", "extra")])));
        assert!(!q.matches(&labels(&[])));
    }

    #[test]
    fn empty_query_matches_everything() {
        let q = LabelQuery::new();
        assert!(q.matches(&labels(&[])));
        assert!(q.matches(&labels(&[("a", "b")])));
    }
}

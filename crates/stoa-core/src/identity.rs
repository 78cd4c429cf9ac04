//! Caller identity produced by the identifier function.
//!
//! A successful identification stores an [`Identity`] in the request-scoped
//! key/value store; later steps and the handler [`Context`](crate::Context)
//! read it from there.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity data attached to an authenticated request.
///
/// The shape is an ordered string-keyed map so that identifier
/// implementations can carry whatever claims their authentication scheme
/// produces (subject, roles, tenant, token scopes) without the registration
/// layer interpreting them.
///
/// # Example
///
/// ```
/// use stoa_core::Identity;
///
/// let mut identity = Identity::new();
/// identity.insert("subject", "user-42".into());
/// identity.insert("roles", serde_json::json!(["admin"]));
/// assert_eq!(identity.get("subject").and_then(|v| v.as_str()), Some("user-42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity {
    claims: IndexMap<String, Value>,
}

impl Identity {
    /// Creates an empty identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a claim, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.claims.insert(key.into(), value);
    }

    /// Returns a claim by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// Returns `true` if no claims are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Returns the number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Iterates over the claims in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.claims.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Identity {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}

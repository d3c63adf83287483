//! Record shapes flowing through the pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw reading as returned by the sensor API (JSON object, depth <= 3 by convention).
pub type NestedRecord = Map<String, Value>;

/// Single-level projection of a [`NestedRecord`].
///
/// Keys are the `_`-joined path from the root to each leaf. Entries keep the
/// order in which they were produced, which is the order of the API response;
/// sinks use that order for their columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord {
    fields: Map<String, Value>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a leaf. A repeated key keeps its first position but takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names, in record order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Owned copy of the column names, handy for schema comparisons.
    pub fn columns(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl From<Map<String, Value>> for FlatRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

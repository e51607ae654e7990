//! Flowkube - Record
//!
//! The open-schema flow record that travels through the pipeline.
//!
//! # Overview
//!
//! A [`Record`] is an ordered mapping from attribute name to [`Value`].
//! Ingesters produce records, transforms mutate them in place, exporters
//! serialize them. Records are owned by exactly one pipeline stage at a
//! time, so no interior synchronization is needed.
//!
//! The value space is a closed tagged union (string, integer, float,
//! boolean, nested map) rather than arbitrary dynamic values: everything a
//! NetFlow/IPFIX field or a decoded JSON line can carry, and nothing more.

mod names;
mod value;

pub use names::*;
pub use value::Value;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single flow record: attribute name → value.
///
/// Attribute names are free-form UTF-8; the canonical ones produced by the
/// ingesters are listed in the [`names`](crate) constants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get an attribute as a string slice, if present and a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Set an attribute, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Remove an attribute, returning its previous value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Check whether an attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the record has no attributes
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over attributes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Serialize the record as a single JSON object line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a record from a JSON object
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

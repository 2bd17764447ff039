//! Attribute values and records
//!
//! This module defines:
//! - [`AttrValue`]: the closed set of attribute value types (scalars and
//!   arrays of scalars)
//! - [`AttrMap`]: a record's attribute name → value mapping
//! - [`RecordId`] / [`Record`]: materialized records returned by queries
//!
//! ## Type rules
//!
//! - Different types are never equal: `Int(1) != Float(1.0)`
//! - Float equality follows IEEE-754: `NaN != NaN`, `-0.0 == 0.0`
//! - Arrays hold scalars only; the index layer fans out over each
//!   element independently
//! - A value that is falsy in the source model (`false`, `0`, `""`) is
//!   still a present, indexable value

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute name → value mapping for one record
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Canonical attribute value type
///
/// Serializes to plain JSON (untagged), so the string storage encoding
/// round-trips a record as one ordinary JSON document and hash fields
/// hold each attribute's JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Array of scalar values
    Array(Vec<AttrValue>),
}

impl AttrValue {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "Null",
            AttrValue::Bool(_) => "Bool",
            AttrValue::Int(_) => "Int",
            AttrValue::Float(_) => "Float",
            AttrValue::String(_) => "String",
            AttrValue::Array(_) => "Array",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Check if this is an array value
    pub fn is_array(&self) -> bool {
        matches!(self, AttrValue::Array(_))
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// View this value as the list of values to index
    ///
    /// Scalars act as a one-element list; arrays fan out per element.
    pub fn fan_out(&self) -> Vec<&AttrValue> {
        match self {
            AttrValue::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Numeric score for score-ordered indexes
    ///
    /// Ints and Floats score as themselves; numeric strings parse.
    /// Everything else has no natural score and needs an explicit score
    /// function on the index definition.
    pub fn score(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            AttrValue::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String fragment used inside membership-set keys
    ///
    /// Scalar values only; arrays are fanned out before key derivation.
    /// Matches the store's string coercion: strings render without
    /// quotes, numbers and booleans in their display form.
    pub fn key_fragment(&self) -> String {
        match self {
            AttrValue::Null => "null".to_string(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Float(f) => f.to_string(),
            AttrValue::String(s) => s.clone(),
            AttrValue::Array(_) => String::new(),
        }
    }

    /// Convert a parsed JSON value into an attribute value
    ///
    /// Returns `None` for JSON objects (and arrays nested inside
    /// arrays): attributes are scalars or arrays of scalars. Callers
    /// that tolerate unknown shapes fall back to the raw string form.
    pub fn from_json(value: &serde_json::Value) -> Option<AttrValue> {
        use serde_json::Value as J;
        match value {
            J::Null => Some(AttrValue::Null),
            J::Bool(b) => Some(AttrValue::Bool(*b)),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i))
                } else {
                    n.as_f64().map(AttrValue::Float)
                }
            }
            J::String(s) => Some(AttrValue::String(s.clone())),
            J::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match AttrValue::from_json(item)? {
                        AttrValue::Array(_) => return None,
                        scalar => out.push(scalar),
                    }
                }
                Some(AttrValue::Array(out))
            }
            J::Object(_) => None,
        }
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            AttrValue::Null => J::Null,
            AttrValue::Bool(b) => J::Bool(*b),
            AttrValue::Int(i) => J::Number((*i).into()),
            AttrValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            AttrValue::String(s) => J::String(s.clone()),
            AttrValue::Array(items) => J::Array(items.iter().map(AttrValue::to_json).collect()),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        AttrValue::Int(i64::from(i))
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        AttrValue::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Opaque record identifier
///
/// Records are identified by a string or integer id owned by the
/// caller; the engine never generates identity on its own (the facade's
/// counter-based id allocation is opt-in).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Integer id, e.g. from a counter key
    Int(i64),
    /// String id, e.g. a UUID or slug
    Str(String),
}

impl RecordId {
    /// Parse a stored set member back into an id
    ///
    /// Members are stored in display form, so an all-digit member comes
    /// back as an integer id.
    pub fn parse(member: &str) -> RecordId {
        match member.parse::<i64>() {
            Ok(i) => RecordId::Int(i),
            Err(_) => RecordId::Str(member.to_string()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{}", i),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId::Int(i)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

/// A materialized record: id plus attribute map
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record identifier
    pub id: RecordId,
    /// Attribute name → value mapping
    pub attrs: AttrMap,
}

impl Record {
    /// Create a record from an id and attributes
    pub fn new(id: impl Into<RecordId>, attrs: AttrMap) -> Self {
        Self {
            id: id.into(),
            attrs,
        }
    }

    /// Get an attribute value
    pub fn get(&self, attr: &str) -> Option<&AttrValue> {
        self.attrs.get(attr)
    }
}

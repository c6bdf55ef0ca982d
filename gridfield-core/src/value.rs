//! Metadata values and input records
//!
//! A [`Record`] is the loosely-structured input describing a single field: a mapping from
//! key to either a scalar [`MetadataValue`] or an N-D array of floats. The geometry keys
//! (`latitudes`, `longitudes`, `distinctLatitudes`, `distinctLongitudes`) and the data key
//! (`values`) are interpreted by the [`CoordinateResolver`](crate::resolver::CoordinateResolver);
//! every other entry becomes field metadata.
//!
//! ```rust
//! use gridfield_core::value::{MetadataValue, Record};
//! use ndarray::array;
//!
//! let record = Record::new()
//!     .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
//!     .with_array("distinctLongitudes", array![20.0, 40.0])
//!     .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
//!     .with("param", "t")
//!     .with("level", 500);
//!
//! assert_eq!(record.scalar("param"), Some(&MetadataValue::from("t")));
//! ```

use crate::datetime::parse_datetime;
use chrono::{DateTime, SecondsFormat, Utc};
use ndarray::{ArrayBase, ArrayD, Dimension, OwnedRepr};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub type FloatValue = f64;

/// Key holding the field values
pub const VALUES_KEY: &str = "values";
pub const LATITUDES_KEY: &str = "latitudes";
pub const LONGITUDES_KEY: &str = "longitudes";
pub const DISTINCT_LATITUDES_KEY: &str = "distinctLatitudes";
pub const DISTINCT_LONGITUDES_KEY: &str = "distinctLongitudes";

/// Keys consumed by geometry resolution rather than kept as metadata
pub const GEOMETRY_KEYS: [&str; 5] = [
    VALUES_KEY,
    LATITUDES_KEY,
    LONGITUDES_KEY,
    DISTINCT_LATITUDES_KEY,
    DISTINCT_LONGITUDES_KEY,
];

/// A typed metadata value
///
/// Equality is numeric-aware: `Int(500) == Float(500.0)`. A `Str` equals a `DateTime`
/// when the string parses to the same instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(FloatValue),
    DateTime(DateTime<Utc>),
    Str(String),
    Floats(Vec<FloatValue>),
}

impl MetadataValue {
    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<FloatValue> {
        match self {
            MetadataValue::Int(v) => Some(*v as FloatValue),
            MetadataValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            MetadataValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            MetadataValue::DateTime(v) => Some(*v),
            MetadataValue::Str(v) => parse_datetime(v),
            _ => None,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            MetadataValue::Int(_) | MetadataValue::Float(_) => 0,
            MetadataValue::Str(_) => 1,
            MetadataValue::DateTime(_) => 2,
            MetadataValue::Bool(_) => 3,
            MetadataValue::Floats(_) => 4,
        }
    }

    /// Total ordering used when sorting fields and collecting unique values
    ///
    /// Numbers sort numerically, strings lexicographically and datetimes chronologically.
    /// Values of different kinds sort by kind: numbers, strings, datetimes, booleans, lists.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MetadataValue::Int(a), MetadataValue::Int(b)) => a.cmp(b),
            (a, b) if a.sort_rank() == 0 && b.sort_rank() == 0 => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (MetadataValue::Str(a), MetadataValue::Str(b)) => a.cmp(b),
            (MetadataValue::DateTime(a), MetadataValue::DateTime(b)) => a.cmp(b),
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a.cmp(b),
            (MetadataValue::Floats(a), MetadataValue::Floats(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (a, b) => a.sort_rank().cmp(&b.sort_rank()),
        }
    }
}

impl PartialEq for MetadataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetadataValue::Int(a), MetadataValue::Int(b)) => a == b,
            (MetadataValue::Int(_), MetadataValue::Float(_))
            | (MetadataValue::Float(_), MetadataValue::Int(_))
            | (MetadataValue::Float(_), MetadataValue::Float(_)) => self.as_f64() == other.as_f64(),
            (MetadataValue::Str(a), MetadataValue::Str(b)) => a == b,
            (MetadataValue::DateTime(a), MetadataValue::DateTime(b)) => a == b,
            (MetadataValue::DateTime(a), MetadataValue::Str(b))
            | (MetadataValue::Str(b), MetadataValue::DateTime(a)) => {
                parse_datetime(b).is_some_and(|parsed| parsed == *a)
            }
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a == b,
            (MetadataValue::Floats(a), MetadataValue::Floats(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{}", v),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::DateTime(v) => {
                write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            MetadataValue::Str(v) => write!(f, "{}", v),
            MetadataValue::Floats(v) => {
                let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(value as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Int(value as i64)
    }
}

impl From<FloatValue> for MetadataValue {
    fn from(value: FloatValue) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::DateTime(value)
    }
}

impl From<Vec<FloatValue>> for MetadataValue {
    fn from(value: Vec<FloatValue>) -> Self {
        MetadataValue::Floats(value)
    }
}

/// A single entry of an input record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEntry {
    Scalar(MetadataValue),
    Array(ArrayD<FloatValue>),
}

/// One input mapping of metadata, geometry and values describing a single field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: BTreeMap<String, RecordEntry>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar metadata entry, replacing any existing entry with the same key
    pub fn with(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, RecordEntry::Scalar(value.into()));
        self
    }

    /// Add an array entry of any dimensionality
    pub fn with_array<D: Dimension>(
        mut self,
        key: &str,
        values: ArrayBase<OwnedRepr<FloatValue>, D>,
    ) -> Self {
        self.insert(key, RecordEntry::Array(values.into_dyn()));
        self
    }

    pub fn with_vec(self, key: &str, values: Vec<FloatValue>) -> Self {
        self.with_array(key, ndarray::Array1::from(values))
    }

    pub fn insert(&mut self, key: &str, entry: RecordEntry) -> Option<RecordEntry> {
        self.entries.insert(key.to_string(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&RecordEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Array entry for `key`, if present and array-valued
    pub fn array(&self, key: &str) -> Option<&ArrayD<FloatValue>> {
        match self.entries.get(key) {
            Some(RecordEntry::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Scalar entry for `key`, if present and scalar-valued
    pub fn scalar(&self, key: &str) -> Option<&MetadataValue> {
        match self.entries.get(key) {
            Some(RecordEntry::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Everything that is not a geometry or values key, as metadata
    ///
    /// Non-geometry arrays are flattened in row-major order into [`MetadataValue::Floats`].
    pub fn metadata(&self) -> BTreeMap<String, MetadataValue> {
        self.entries
            .iter()
            .filter(|(k, _)| !GEOMETRY_KEYS.contains(&k.as_str()))
            .map(|(k, entry)| {
                let value = match entry {
                    RecordEntry::Scalar(v) => v.clone(),
                    RecordEntry::Array(a) => MetadataValue::Floats(a.iter().copied().collect()),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl FromIterator<(String, RecordEntry)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, RecordEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

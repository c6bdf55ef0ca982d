//! Metadata access for fields
//!
//! [`MetadataView`] answers metadata queries for one [`Field`]. Lookups go through a static
//! alias table, so `param`, `shortName` and `short_name` all find the same value. A few keys
//! are derived rather than stored:
//!
//! - `base_datetime`: parsed from the stored value, or built from GRIB-style `date`/`time`
//! - `valid_datetime`: parsed from the stored value, or `base_datetime` plus `step` hours
//! - `mars_grid`: `[longitude_increment, latitude_increment]` of a regular distinct mesh
//! - `grid_type`: the kind of grid the field was resolved to
//!
//! Datetime parsing happens on first access and is memoized in the field.

use crate::datetime::{add_hours, from_date_and_time, step_hours, to_datetime};
use crate::errors::{FieldError, FieldResult};
use crate::field::Field;
use crate::value::{FloatValue, MetadataValue};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

pub const BASE_DATETIME: &str = "base_datetime";
pub const VALID_DATETIME: &str = "valid_datetime";
pub const MARS_GRID: &str = "mars_grid";
pub const GRID_TYPE: &str = "grid_type";

/// Canonical key and the stored keys accepted for it, in lookup order
const KEY_ALIASES: &[(&str, &[&str])] = &[
    ("param", &["param", "shortName", "short_name", "variable"]),
    ("level", &["level", "levelist", "lev"]),
    ("levtype", &["levtype", "typeOfLevel", "level_type"]),
    (
        BASE_DATETIME,
        &["base_datetime", "base_time", "forecast_reference_time"],
    ),
    (VALID_DATETIME, &["valid_datetime", "valid_time", "time_stamp"]),
    ("step", &["step", "endStep", "forecast_step"]),
    ("number", &["number", "ensemble_member", "realization"]),
    ("units", &["units", "unit"]),
    (MARS_GRID, &["mars_grid", "grid"]),
    (GRID_TYPE, &["grid_type", "gridType"]),
];

/// Maps every accepted key to its canonical key
static ALIAS_INDEX: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    KEY_ALIASES
        .iter()
        .flat_map(|(canonical, aliases)| aliases.iter().map(move |alias| (*alias, *canonical)))
        .collect()
});

/// Canonical name for a metadata key
///
/// Keys without an alias entry are their own canonical name.
///
/// ```rust
/// use gridfield_core::metadata::canonical_key;
///
/// assert_eq!(canonical_key("shortName"), "param");
/// assert_eq!(canonical_key("levelist"), "level");
/// assert_eq!(canonical_key("expver"), "expver");
/// ```
pub fn canonical_key(key: &str) -> &str {
    ALIAS_INDEX.get(key).copied().unwrap_or(key)
}

fn accepted_keys(canonical: &str) -> Option<&'static [&'static str]> {
    KEY_ALIASES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| *aliases)
}

/// Read-only metadata accessor bound to one field
#[derive(Debug, Clone, Copy)]
pub struct MetadataView<'a> {
    field: &'a Field,
}

impl<'a> MetadataView<'a> {
    pub(crate) fn new(field: &'a Field) -> Self {
        Self { field }
    }

    /// Look up a key, resolving aliases and derived keys
    ///
    /// Returns `None` when the key is absent.
    pub fn get(&self, key: &str) -> Option<MetadataValue> {
        let canonical = canonical_key(key);
        match canonical {
            BASE_DATETIME => self.datetime_or_raw(canonical, self.cached_base()),
            VALID_DATETIME => self.datetime_or_raw(canonical, self.cached_valid()),
            MARS_GRID => self
                .stored(canonical)
                .or_else(|| self.mars_grid().map(|grid| MetadataValue::Floats(grid.to_vec()))),
            GRID_TYPE => self
                .stored(canonical)
                .or_else(|| Some(self.field.geometry().grid_type().into())),
            _ => self.stored(key),
        }
    }

    /// Look up a key that must be present
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::MissingMetadata`] if the key is absent.
    pub fn require(&self, key: &str) -> FieldResult<MetadataValue> {
        self.get(key)
            .ok_or_else(|| FieldError::MissingMetadata(key.to_string()))
    }

    pub fn get_or(&self, key: &str, default: MetadataValue) -> MetadataValue {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Stored keys, without derived keys
    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.field.raw_metadata().keys().map(|k| k.as_str())
    }

    /// Stored metadata together with every derived key that has a value
    pub fn to_map(&self) -> BTreeMap<String, MetadataValue> {
        let mut map = self.field.raw_metadata().clone();
        for key in [BASE_DATETIME, VALID_DATETIME, MARS_GRID, GRID_TYPE] {
            if let Some(value) = self.get(key) {
                map.insert(key.to_string(), value);
            }
        }
        map
    }

    /// Valid time of the field
    ///
    /// # Errors
    ///
    /// [`FieldError::MissingMetadata`] if neither a valid time nor a base time is available,
    /// [`FieldError::InvalidMetadata`] if the stored value cannot be parsed.
    pub fn valid_datetime(&self) -> FieldResult<DateTime<Utc>> {
        self.require_datetime(VALID_DATETIME, self.cached_valid())
    }

    pub fn base_datetime(&self) -> FieldResult<DateTime<Utc>> {
        self.require_datetime(BASE_DATETIME, self.cached_base())
    }

    /// `[longitude_increment, latitude_increment]` for a regular distinct mesh
    pub fn mars_grid(&self) -> Option<[FloatValue; 2]> {
        self.field
            .geometry()
            .increments()
            .map(|(dx, dy)| [dx, dy])
    }

    /// Stored value for a key or any of its aliases
    fn stored(&self, key: &str) -> Option<MetadataValue> {
        let metadata = self.field.raw_metadata();
        if let Some(value) = metadata.get(key) {
            return Some(value.clone());
        }
        accepted_keys(canonical_key(key))?
            .iter()
            .find_map(|alias| metadata.get(*alias))
            .cloned()
    }

    fn datetime_or_raw(
        &self,
        key: &str,
        parsed: Option<DateTime<Utc>>,
    ) -> Option<MetadataValue> {
        match parsed {
            Some(dt) => Some(MetadataValue::DateTime(dt)),
            None => self.stored(key),
        }
    }

    fn require_datetime(
        &self,
        key: &str,
        parsed: Option<DateTime<Utc>>,
    ) -> FieldResult<DateTime<Utc>> {
        match (parsed, self.stored(key)) {
            (Some(dt), _) => Ok(dt),
            (None, Some(raw)) => Err(FieldError::InvalidMetadata {
                key: key.to_string(),
                message: format!("'{}' is not a recognised date/time", raw),
            }),
            (None, None) => Err(FieldError::MissingMetadata(key.to_string())),
        }
    }

    fn cached_base(&self) -> Option<DateTime<Utc>> {
        *self
            .field
            .datetimes
            .base
            .get_or_init(|| self.compute_base())
    }

    fn cached_valid(&self) -> Option<DateTime<Utc>> {
        *self
            .field
            .datetimes
            .valid
            .get_or_init(|| self.compute_valid())
    }

    fn compute_base(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.stored(BASE_DATETIME) {
            return parse_logged(BASE_DATETIME, &raw);
        }
        let date = self.stored("date")?;
        let time = self.stored("time").and_then(|t| t.as_i64()).unwrap_or(0);
        match date {
            MetadataValue::Int(d) => from_date_and_time(d, time),
            other => to_datetime(&other)
                .and_then(|dt| add_hours(dt, (time / 100) as f64 + (time % 100) as f64 / 60.0)),
        }
    }

    fn compute_valid(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.stored(VALID_DATETIME) {
            return parse_logged(VALID_DATETIME, &raw);
        }
        let base = self.cached_base()?;
        match self.stored("step") {
            Some(step) => add_hours(base, step_hours(&step)?),
            None => Some(base),
        }
    }
}

fn parse_logged(key: &str, raw: &MetadataValue) -> Option<DateTime<Utc>> {
    let parsed = to_datetime(raw);
    if parsed.is_none() {
        log::warn!("Cannot parse {} value '{}' as a date/time", key, raw);
    }
    parsed
}

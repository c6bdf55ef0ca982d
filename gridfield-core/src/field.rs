//! Immutable geospatial fields
//!
//! A [`Field`] binds one values array to its [`ResolvedGeometry`] and metadata. It is created
//! once, either from a [`Record`] or from already-resolved parts, and never mutated afterwards.
//! Every accessor returns owned data, so callers can modify results freely.
//!
//! ```rust
//! use gridfield_core::field::Field;
//! use gridfield_core::resolver::CoordinateResolver;
//! use gridfield_core::value::Record;
//! use ndarray::array;
//!
//! let record = Record::new()
//!     .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
//!     .with_array("distinctLongitudes", array![20.0, 40.0])
//!     .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
//!     .with("param", "t");
//!
//! let field = Field::from_record(&record, &CoordinateResolver::default()).unwrap();
//! assert_eq!(field.shape().dims(), &[3, 2]);
//! assert_eq!(field.to_numpy(), array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn());
//! assert_eq!(field.to_latlon().lat, array![[10.0, 10.0], [0.0, 0.0], [-10.0, -10.0]].into_dyn());
//! ```

use crate::errors::{FieldError, FieldResult};
use crate::geography::{stack_arrays, BoundingBox, LatLon, ResolvedGeometry, Shape};
use crate::metadata::MetadataView;
use crate::resolver::{reshape, CoordinateResolver};
use crate::value::{FloatValue, MetadataValue, Record, VALUES_KEY};
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Per-field memoized datetime parses
///
/// Each cell is written once, on first read.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatetimeCache {
    pub(crate) base: OnceLock<Option<DateTime<Utc>>>,
    pub(crate) valid: OnceLock<Option<DateTime<Utc>>>,
}

/// Base (reference) and valid time of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDatetime {
    pub base_time: Option<DateTime<Utc>>,
    pub valid_time: Option<DateTime<Utc>>,
}

/// Array selector for [`Field::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKey {
    Lat,
    Lon,
    Value,
}

impl FromStr for DataKey {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lat" => Ok(DataKey::Lat),
            "lon" => Ok(DataKey::Lon),
            "value" => Ok(DataKey::Value),
            other => Err(FieldError::InvalidArgument(format!(
                "data: invalid key '{}', expected one of 'lat', 'lon', 'value'",
                other
            ))),
        }
    }
}

/// An assembled grid of values with resolved geometry and metadata
#[derive(Debug, Clone)]
pub struct Field {
    values: ArrayD<FloatValue>,
    geometry: ResolvedGeometry,
    metadata: BTreeMap<String, MetadataValue>,
    pub(crate) datetimes: DatetimeCache,
}

impl Field {
    /// Build a field from resolved parts
    ///
    /// `values` may have any shape with the same number of elements as the geometry; it is
    /// reshaped row-major to the geometry's shape.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::FieldConstruction`] when the element counts disagree.
    pub fn new(
        values: ArrayD<FloatValue>,
        geometry: ResolvedGeometry,
        metadata: BTreeMap<String, MetadataValue>,
    ) -> FieldResult<Self> {
        if values.len() != geometry.size() {
            return Err(FieldError::construction(format!(
                "values have {} elements but the grid shape {} has {} points",
                values.len(),
                geometry.shape(),
                geometry.size()
            )));
        }
        let values = if values.shape() == geometry.shape().dims() {
            values
        } else {
            reshape(&values, geometry.shape().dims()).map_err(|e| FieldError::FieldConstruction {
                message: "cannot reshape values to the grid shape".to_string(),
                source: Some(Box::new(e)),
            })?
        };

        Ok(Self {
            values,
            geometry,
            metadata,
            datetimes: DatetimeCache::default(),
        })
    }

    /// Resolve and assemble a field from an input record
    pub fn from_record(record: &Record, resolver: &CoordinateResolver) -> FieldResult<Self> {
        let geometry = resolver
            .resolve(record)
            .map_err(|e| FieldError::FieldConstruction {
                message: "coordinate resolution failed".to_string(),
                source: Some(Box::new(e)),
            })?;
        let values = record
            .array(VALUES_KEY)
            .ok_or_else(|| FieldError::construction("record has no values"))?;
        Self::new(values.clone(), geometry, record.metadata())
    }

    pub fn shape(&self) -> &Shape {
        self.geometry.shape()
    }

    pub fn geometry(&self) -> &ResolvedGeometry {
        &self.geometry
    }

    /// Values flattened in row-major order
    pub fn values(&self) -> Array1<FloatValue> {
        Array1::from_iter(self.values.iter().copied())
    }

    /// Values shaped as [`shape`](Self::shape)
    ///
    /// Returns an independent copy.
    pub fn to_numpy(&self) -> ArrayD<FloatValue> {
        self.values.clone()
    }

    pub fn to_numpy_flat(&self) -> ArrayD<FloatValue> {
        self.values().into_dyn()
    }

    pub fn to_latlon(&self) -> LatLon {
        self.geometry.to_latlon()
    }

    pub fn to_latlon_flat(&self) -> LatLon {
        LatLon {
            lat: self.geometry.coordinate(true, true),
            lon: self.geometry.coordinate(false, true),
        }
    }

    /// Row-major flattened `(latitudes, longitudes)`
    pub fn grid_points(&self) -> (Vec<FloatValue>, Vec<FloatValue>) {
        self.geometry.grid_points()
    }

    /// Latitudes, longitudes and/or values for every grid point
    ///
    /// A single key returns that array alone. Several keys are stacked along a new
    /// leading axis in the order given.
    pub fn data(&self, keys: &[DataKey], flatten: bool) -> FieldResult<ArrayD<FloatValue>> {
        let mut arrays: Vec<ArrayD<FloatValue>> = keys
            .iter()
            .map(|key| self.data_array(*key, flatten))
            .collect();
        match arrays.len() {
            0 => Err(FieldError::InvalidArgument(
                "data: at least one key is required".to_string(),
            )),
            1 => Ok(arrays.remove(0)),
            _ => stack_arrays(&arrays).ok_or_else(|| FieldError::ShapeMismatch {
                expected: self.shape().to_string(),
                found: "arrays of differing shapes".to_string(),
            }),
        }
    }

    pub(crate) fn data_array(&self, key: DataKey, flatten: bool) -> ArrayD<FloatValue> {
        match key {
            DataKey::Lat => self.geometry.coordinate(true, flatten),
            DataKey::Lon => self.geometry.coordinate(false, flatten),
            DataKey::Value if flatten => self.to_numpy_flat(),
            DataKey::Value => self.to_numpy(),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.geometry.bounding_box()
    }

    pub fn metadata(&self) -> MetadataView<'_> {
        MetadataView::new(self)
    }

    /// Metadata exactly as supplied, without alias resolution or derived keys
    pub fn raw_metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn datetime(&self) -> FieldDatetime {
        let md = self.metadata();
        FieldDatetime {
            base_time: md.base_datetime().ok(),
            valid_time: md.valid_datetime().ok(),
        }
    }

    /// Whether both fields are defined on the same grid points
    pub fn same_grid(&self, other: &Field) -> bool {
        self.geometry.same_grid(&other.geometry)
    }

    /// A new field on the same grid with the same metadata but different values
    pub fn with_values(&self, values: ArrayD<FloatValue>) -> FieldResult<Field> {
        Field::new(values, self.geometry.clone(), self.metadata.clone())
    }

    /// A new field with some metadata keys replaced or added
    pub fn with_metadata<K, V>(&self, overrides: impl IntoIterator<Item = (K, V)>) -> Field
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        let mut metadata = self.metadata.clone();
        metadata.extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        Field {
            values: self.values.clone(),
            geometry: self.geometry.clone(),
            metadata,
            datetimes: DatetimeCache::default(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let md = self.metadata();
        let items: Vec<String> = ["param", "level", "base_datetime", "step", "number"]
            .iter()
            .map(|key| match md.get(key) {
                Some(value) => value.to_string(),
                None => "None".to_string(),
            })
            .collect();
        write!(f, "Field({})", items.join(","))
    }
}

//! Resolved field geometry
//!
//! This module provides the types produced by coordinate resolution:
//!
//! - [`Shape`]: the grid shape of a field, `(n,)` for point sets and `(m, n)` for meshes
//! - [`GridMode`]: how the coordinates were supplied (distinct axes, full per-point arrays,
//!   or an unstructured point cloud)
//! - [`ResolvedGeometry`]: full latitude/longitude arrays with the shape and mode
//! - [`BoundingBox`]: the geographic extent of a geometry
//!
//! # Examples
//!
//! ```rust
//! use gridfield_core::geography::ResolvedGeometry;
//! use ndarray::array;
//!
//! let geometry =
//!     ResolvedGeometry::from_distinct(array![10.0, 0.0, -10.0], array![20.0, 40.0], 1e-9);
//! assert_eq!(geometry.shape().dims(), &[3, 2]);
//! assert_eq!(geometry.increments(), Some((20.0, 10.0)));
//!
//! let (lats, lons) = geometry.grid_points();
//! assert_eq!(lats, vec![10.0, 10.0, 0.0, 0.0, -10.0, -10.0]);
//! assert_eq!(lons, vec![20.0, 40.0, 20.0, 40.0, 20.0, 40.0]);
//! ```

use crate::value::FloatValue;
use ndarray::{Array1, Array2, ArrayD, Axis};
use num::Float;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid shape of a field
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Number of grid points
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [n] => write!(f, "({},)", n),
            dims => {
                let items: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "({})", items.join(", "))
            }
        }
    }
}

/// How a field's coordinates were supplied
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridMode {
    /// 1-D latitude and longitude axes broadcast into a mesh
    Distinct {
        latitudes: Array1<FloatValue>,
        longitudes: Array1<FloatValue>,
        /// `(longitude_increment, latitude_increment)` when both axes are evenly spaced
        increments: Option<(FloatValue, FloatValue)>,
    },
    /// Coordinates given for every grid point of a multi-dimensional grid
    Full,
    /// A 1-D point cloud with no structure
    Unstructured,
}

impl GridMode {
    pub fn grid_name(&self) -> &'static str {
        match self {
            GridMode::Distinct { .. } => "Distinct",
            GridMode::Full => "Full",
            GridMode::Unstructured => "Unstructured",
        }
    }
}

/// Geographic extent in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: FloatValue,
    pub west: FloatValue,
    pub south: FloatValue,
    pub east: FloatValue,
}

impl BoundingBox {
    /// Smallest box containing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            north: self.north.max(other.north),
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
        }
    }
}

/// Latitude and longitude arrays of a field, both shaped like the field
#[derive(Clone, Debug, PartialEq)]
pub struct LatLon {
    pub lat: ArrayD<FloatValue>,
    pub lon: ArrayD<FloatValue>,
}

/// Full geometry of a field
///
/// Invariant: `latitudes.shape() == longitudes.shape() == shape`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGeometry {
    mode: GridMode,
    shape: Shape,
    latitudes: ArrayD<FloatValue>,
    longitudes: ArrayD<FloatValue>,
}

impl ResolvedGeometry {
    /// Broadcast distinct axes into an `(m, n)` mesh
    ///
    /// Rows follow the latitude axis and columns the longitude axis.
    pub fn from_distinct(
        latitudes: Array1<FloatValue>,
        longitudes: Array1<FloatValue>,
        spacing_tolerance: FloatValue,
    ) -> Self {
        let (m, n) = (latitudes.len(), longitudes.len());
        let lat_grid = Array2::from_shape_fn((m, n), |(i, _)| latitudes[i]);
        let lon_grid = Array2::from_shape_fn((m, n), |(_, j)| longitudes[j]);

        let increments = match (
            uniform_step(latitudes.as_slice().unwrap_or(&[]), spacing_tolerance),
            uniform_step(longitudes.as_slice().unwrap_or(&[]), spacing_tolerance),
        ) {
            (Some(dy), Some(dx)) => Some((dx.abs(), dy.abs())),
            _ => None,
        };

        Self {
            mode: GridMode::Distinct {
                latitudes,
                longitudes,
                increments,
            },
            shape: Shape::new(vec![m, n]),
            latitudes: lat_grid.into_dyn(),
            longitudes: lon_grid.into_dyn(),
        }
    }

    /// Wrap per-point coordinate arrays that already share `shape`
    ///
    /// 1-D coordinates form an unstructured geometry, anything else a full grid.
    ///
    /// # Panics
    ///
    /// Panics if either array does not have exactly `shape`
    pub fn from_points(latitudes: ArrayD<FloatValue>, longitudes: ArrayD<FloatValue>) -> Self {
        assert_eq!(
            latitudes.shape(),
            longitudes.shape(),
            "Latitude and longitude arrays must share a shape"
        );
        let shape = Shape::from(latitudes.shape());
        let mode = if shape.ndim() == 1 {
            GridMode::Unstructured
        } else {
            GridMode::Full
        };
        Self {
            mode,
            shape,
            latitudes,
            longitudes,
        }
    }

    pub fn mode(&self) -> &GridMode {
        &self.mode
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    pub fn latitudes(&self) -> &ArrayD<FloatValue> {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &ArrayD<FloatValue> {
        &self.longitudes
    }

    pub fn to_latlon(&self) -> LatLon {
        LatLon {
            lat: self.latitudes.clone(),
            lon: self.longitudes.clone(),
        }
    }

    /// Row-major flattened latitudes and longitudes
    pub fn grid_points(&self) -> (Vec<FloatValue>, Vec<FloatValue>) {
        (
            self.latitudes.iter().copied().collect(),
            self.longitudes.iter().copied().collect(),
        )
    }

    /// `(longitude_increment, latitude_increment)` of a regular distinct mesh
    pub fn increments(&self) -> Option<(FloatValue, FloatValue)> {
        match &self.mode {
            GridMode::Distinct { increments, .. } => *increments,
            _ => None,
        }
    }

    /// Short descriptor of the grid kind
    pub fn grid_type(&self) -> &'static str {
        match &self.mode {
            GridMode::Distinct {
                increments: Some(_),
                ..
            } => "regular_ll",
            GridMode::Distinct { .. } => "irregular_ll",
            GridMode::Full => "structured",
            GridMode::Unstructured => "unstructured",
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (south, north) = min_max(self.latitudes.iter());
        let (west, east) = min_max(self.longitudes.iter());
        BoundingBox {
            north,
            west,
            south,
            east,
        }
    }

    /// Whether two geometries describe the same grid points
    pub fn same_grid(&self, other: &ResolvedGeometry) -> bool {
        self.shape == other.shape
            && self.latitudes == other.latitudes
            && self.longitudes == other.longitudes
    }

    /// Latitudes and longitudes stacked on a new leading axis, or flattened first
    pub(crate) fn coordinate(&self, latitude: bool, flatten: bool) -> ArrayD<FloatValue> {
        let source = if latitude {
            &self.latitudes
        } else {
            &self.longitudes
        };
        if flatten {
            Array1::from_iter(source.iter().copied()).into_dyn()
        } else {
            source.clone()
        }
    }
}

fn min_max<'a>(values: impl Iterator<Item = &'a FloatValue>) -> (FloatValue, FloatValue) {
    values.fold((FloatValue::INFINITY, FloatValue::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(*v), hi.max(*v))
    })
}

/// Common step between consecutive values, if the spacing is uniform
///
/// A single value has a step of one degree, matching the convention for
/// single-point axes. Returns `None` for empty input, repeated values or
/// uneven spacing beyond the relative tolerance.
pub fn uniform_step<T: Float>(values: &[T], rel_tol: T) -> Option<T> {
    match values {
        [] => None,
        [_] => Some(T::one()),
        [first, second, ..] => {
            let step = *second - *first;
            if step.is_zero() {
                return None;
            }
            let tol = rel_tol * step.abs();
            let even = values
                .windows(2)
                .all(|w| ((w[1] - w[0]) - step).abs() <= tol);
            even.then_some(step)
        }
    }
}

/// Stack equally shaped arrays along a new leading axis
pub(crate) fn stack_arrays(arrays: &[ArrayD<FloatValue>]) -> Option<ArrayD<FloatValue>> {
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).ok()
}

//! Coordinate resolution
//!
//! Turns the geometry entries of a [`Record`] into a [`ResolvedGeometry`]. The inputs are
//! inspected in priority order:
//!
//! 1. **Distinct axes**: `distinctLatitudes`/`distinctLongitudes` are present, or plain
//!    `latitudes`/`longitudes` are both 1-D and are not one-per-value. The axes are broadcast
//!    into an `(m, n)` mesh, rows following latitude.
//! 2. **Full coordinates**: the coordinates enumerate every grid point. The grid shape is the
//!    coordinate shape unless the values carry more dimensions, in which case the values'
//!    shape wins and the coordinates are reshaped row-major. When both are multi-dimensional
//!    and disagree, the values' shape wins.
//! 3. **Unstructured**: 1-D coordinates and 1-D values of the same length form a `(n,)`
//!    point cloud, used as-is.
//!
//! ```rust
//! use gridfield_core::resolver::CoordinateResolver;
//! use gridfield_core::value::Record;
//! use ndarray::array;
//!
//! let record = Record::new()
//!     .with_array("latitudes", array![10.0, 10.0, 6.0, 6.0, 6.0])
//!     .with_array("longitudes", array![20.0, 40.0, -40.0, 0.0, 40.0])
//!     .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0]);
//!
//! let geometry = CoordinateResolver::default().resolve(&record).unwrap();
//! assert_eq!(geometry.shape().dims(), &[5]);
//! ```

use crate::config::ResolverSettings;
use crate::errors::{FieldError, FieldResult};
use crate::geography::{ResolvedGeometry, Shape};
use crate::value::{
    FloatValue, Record, DISTINCT_LATITUDES_KEY, DISTINCT_LONGITUDES_KEY, LATITUDES_KEY,
    LONGITUDES_KEY, VALUES_KEY,
};
use ndarray::{Array1, ArrayD, IxDyn};

fn geometry_error(message: impl Into<String>) -> FieldError {
    FieldError::Geometry(message.into())
}

/// Resolves the grid shape and full coordinates of a record
#[derive(Debug, Clone, Default)]
pub struct CoordinateResolver {
    settings: ResolverSettings,
}

impl CoordinateResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve the geometry of a single record
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Geometry`] if the values or coordinates are missing, empty or
    /// contain NaN, or if the coordinates and values cannot be reconciled into one shape.
    pub fn resolve(&self, record: &Record) -> FieldResult<ResolvedGeometry> {
        let values = record
            .array(VALUES_KEY)
            .ok_or_else(|| geometry_error("record has no array under 'values'"))?;
        if values.is_empty() {
            return Err(geometry_error("values array is empty"));
        }

        let distinct_lat = record.array(DISTINCT_LATITUDES_KEY);
        let distinct_lon = record.array(DISTINCT_LONGITUDES_KEY);
        let (lat_key, lat) =
            coordinate(record, distinct_lat, DISTINCT_LATITUDES_KEY, LATITUDES_KEY)?;
        let (lon_key, lon) =
            coordinate(record, distinct_lon, DISTINCT_LONGITUDES_KEY, LONGITUDES_KEY)?;
        check_coordinate(lat_key, lat)?;
        check_coordinate(lon_key, lon)?;

        let explicit_distinct = distinct_lat.is_some() || distinct_lon.is_some();
        let both_1d = lat.ndim() == 1 && lon.ndim() == 1;
        let one_per_value = lat.len() == values.len() && lon.len() == values.len();

        let geometry = if explicit_distinct || (both_1d && !one_per_value) {
            if !both_1d {
                return Err(geometry_error(format!(
                    "distinct coordinates must be 1-D, got '{}' with shape {} and '{}' with shape {}",
                    lat_key,
                    Shape::from(lat.shape()),
                    lon_key,
                    Shape::from(lon.shape())
                )));
            }
            self.resolve_distinct(lat, lon, values)?
        } else {
            resolve_points(lat, lon, values)?
        };

        log::debug!(
            "Resolved {} geometry with shape {}",
            geometry.mode().grid_name(),
            geometry.shape()
        );
        Ok(geometry)
    }

    fn resolve_distinct(
        &self,
        lat: &ArrayD<FloatValue>,
        lon: &ArrayD<FloatValue>,
        values: &ArrayD<FloatValue>,
    ) -> FieldResult<ResolvedGeometry> {
        let (m, n) = (lat.len(), lon.len());
        let compatible = match values.shape() {
            [len] => *len == m * n,
            [rows, cols] => *rows == m && *cols == n,
            _ => false,
        };
        if !compatible {
            return Err(geometry_error(format!(
                "values with shape {} cannot be explained by {} distinct latitudes and {} distinct longitudes; expected ({}, {}) or ({},)",
                Shape::from(values.shape()),
                m,
                n,
                m,
                n,
                m * n
            )));
        }

        let latitudes = Array1::from_iter(lat.iter().copied());
        let longitudes = Array1::from_iter(lon.iter().copied());
        Ok(ResolvedGeometry::from_distinct(
            latitudes,
            longitudes,
            self.settings.spacing_tolerance,
        ))
    }
}

fn coordinate<'a>(
    record: &'a Record,
    distinct: Option<&'a ArrayD<FloatValue>>,
    distinct_key: &'static str,
    plain_key: &'static str,
) -> FieldResult<(&'static str, &'a ArrayD<FloatValue>)> {
    if let Some(array) = distinct {
        return Ok((distinct_key, array));
    }
    record
        .array(plain_key)
        .map(|array| (plain_key, array))
        .ok_or_else(|| {
            geometry_error(format!(
                "record has no array under '{}' or '{}'",
                plain_key, distinct_key
            ))
        })
}

fn check_coordinate(key: &str, values: &ArrayD<FloatValue>) -> FieldResult<()> {
    if values.is_empty() {
        return Err(geometry_error(format!("'{}' is empty", key)));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(geometry_error(format!("'{}' contains NaN", key)));
    }
    Ok(())
}

fn resolve_points(
    lat: &ArrayD<FloatValue>,
    lon: &ArrayD<FloatValue>,
    values: &ArrayD<FloatValue>,
) -> FieldResult<ResolvedGeometry> {
    if lat.shape() != lon.shape() {
        return Err(geometry_error(format!(
            "latitudes with shape {} and longitudes with shape {} do not match",
            Shape::from(lat.shape()),
            Shape::from(lon.shape())
        )));
    }
    if lat.len() != values.len() {
        return Err(geometry_error(format!(
            "{} coordinates cannot describe {} values",
            lat.len(),
            values.len()
        )));
    }

    // Flat values take the coordinate shape; otherwise the values decide
    let target = if values.ndim() > 1 || lat.ndim() == 1 {
        values.shape()
    } else {
        lat.shape()
    };
    if lat.shape() != target {
        log::debug!(
            "Reshaping coordinates from {} to values shape {}",
            Shape::from(lat.shape()),
            Shape::from(target)
        );
    }

    Ok(ResolvedGeometry::from_points(
        reshape(lat, target)?,
        reshape(lon, target)?,
    ))
}

/// Row-major reshape into an owned array
pub(crate) fn reshape(
    array: &ArrayD<FloatValue>,
    dims: &[usize],
) -> FieldResult<ArrayD<FloatValue>> {
    ArrayD::from_shape_vec(IxDyn(dims), array.iter().copied().collect()).map_err(|e| {
        geometry_error(format!(
            "cannot reshape {} into {}: {}",
            Shape::from(array.shape()),
            Shape::from(dims),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::GridMode;
    use ndarray::{array, Array2};

    fn resolve(record: &Record) -> FieldResult<ResolvedGeometry> {
        CoordinateResolver::default().resolve(record)
    }

    #[test]
    fn distinct_keys_build_mesh() {
        let record = Record::new()
            .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
            .with_array("distinctLongitudes", array![20.0, 40.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[3, 2]);
        assert_eq!(
            geometry.latitudes(),
            &array![[10.0, 10.0], [0.0, 0.0], [-10.0, -10.0]].into_dyn()
        );
        for i in 0..3 {
            for j in 0..2 {
                assert_eq!(geometry.longitudes()[[i, j]], [20.0, 40.0][j]);
            }
        }
    }

    #[test]
    fn plain_keys_with_axis_lengths_are_distinct() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, 0.0, -10.0])
            .with_array("longitudes", array![20.0, 40.0])
            .with_array("values", array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[3, 2]);
        assert!(matches!(geometry.mode(), GridMode::Distinct { .. }));
    }

    #[test]
    fn flattened_full_coordinates_stay_flat() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, 10.0, 0.0, 0.0, -10.0, -10.0])
            .with_array("longitudes", array![20.0, 40.0, 20.0, 40.0, 20.0, 40.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[6]);
        assert_eq!(geometry.mode(), &GridMode::Unstructured);
    }

    #[test]
    fn irregular_points_are_unstructured() {
        let lat = array![10.0, 10.0, 6.0, 6.0, 6.0];
        let lon = array![20.0, 40.0, -40.0, 0.0, 40.0];
        let record = Record::new()
            .with_array("latitudes", lat.clone())
            .with_array("longitudes", lon.clone())
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[5]);
        assert_eq!(geometry.latitudes(), &lat.into_dyn());
        assert_eq!(geometry.longitudes(), &lon.into_dyn());
    }

    #[test]
    fn values_with_more_dimensions_reshape_coordinates() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, 10.0, 0.0, 0.0, -10.0, -10.0])
            .with_array("longitudes", array![20.0, 40.0, 20.0, 40.0, 20.0, 40.0])
            .with_array("values", array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[3, 2]);
        assert_eq!(geometry.mode(), &GridMode::Full);
        assert_eq!(geometry.latitudes()[[1, 0]], 0.0);
        assert_eq!(geometry.longitudes()[[2, 1]], 40.0);
    }

    #[test]
    fn full_coordinates_give_shape_to_flat_values() {
        let lat: Array2<f64> = array![[10.0, 10.0], [0.0, 0.0], [-10.0, -10.0]];
        let lon: Array2<f64> = array![[20.0, 40.0], [20.0, 40.0], [20.0, 40.0]];
        let record = Record::new()
            .with_array("latitudes", lat.clone())
            .with_array("longitudes", lon.clone())
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[3, 2]);
        assert_eq!(geometry.latitudes(), &lat.into_dyn());
        assert_eq!(geometry.longitudes(), &lon.into_dyn());
    }

    #[test]
    fn values_shape_wins_between_disagreeing_grids() {
        let record = Record::new()
            .with_array("latitudes", Array2::<f64>::zeros((2, 3)))
            .with_array("longitudes", Array2::<f64>::zeros((2, 3)))
            .with_array("values", Array2::<f64>::zeros((3, 2)));

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[3, 2]);
        assert_eq!(geometry.latitudes().shape(), &[3, 2]);
    }

    #[test]
    fn values_shape_wins_over_deeper_coordinates() {
        let lat =
            ArrayD::from_shape_fn(IxDyn(&[2, 2, 3]), |ix| (ix[0] * 6 + ix[1] * 3 + ix[2]) as f64);
        let record = Record::new()
            .with_array("latitudes", lat)
            .with_array("longitudes", ArrayD::<f64>::zeros(IxDyn(&[2, 2, 3])))
            .with_array("values", Array2::<f64>::zeros((4, 3)));

        let geometry = resolve(&record).unwrap();
        assert_eq!(geometry.shape().dims(), &[4, 3]);
        assert_eq!(geometry.longitudes().shape(), &[4, 3]);
        assert_eq!(geometry.latitudes()[[2, 1]], 7.0);
    }

    #[test]
    fn distinct_values_must_fit_mesh() {
        let record = Record::new()
            .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
            .with_array("distinctLongitudes", array![20.0, 40.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(matches!(resolve(&record), Err(FieldError::Geometry(_))));

        // Transposed values are not silently accepted
        let record = Record::new()
            .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
            .with_array("distinctLongitudes", array![20.0, 40.0])
            .with_array("values", Array2::<f64>::zeros((2, 3)));
        assert!(matches!(resolve(&record), Err(FieldError::Geometry(_))));
    }

    #[test]
    fn distinct_keys_must_be_vectors() {
        let record = Record::new()
            .with_array("distinctLatitudes", Array2::<f64>::zeros((2, 2)))
            .with_array("distinctLongitudes", array![20.0, 40.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(resolve(&record), Err(FieldError::Geometry(_))));
    }

    #[test]
    fn rejects_nan_empty_and_missing_inputs() {
        let nan = Record::new()
            .with_array("latitudes", array![10.0, f64::NAN])
            .with_array("longitudes", array![20.0, 40.0])
            .with_array("values", array![1.0, 2.0]);
        assert!(matches!(resolve(&nan), Err(FieldError::Geometry(_))));

        let empty = Record::new()
            .with_vec("latitudes", vec![])
            .with_array("longitudes", array![20.0])
            .with_array("values", array![1.0]);
        assert!(matches!(resolve(&empty), Err(FieldError::Geometry(_))));

        let no_values = Record::new()
            .with_array("latitudes", array![10.0])
            .with_array("longitudes", array![20.0]);
        assert!(matches!(resolve(&no_values), Err(FieldError::Geometry(_))));

        let no_longitudes = Record::new()
            .with_array("latitudes", array![10.0])
            .with_array("values", array![1.0]);
        assert!(matches!(resolve(&no_longitudes), Err(FieldError::Geometry(_))));
    }

    #[test]
    fn rejects_mismatched_full_coordinates() {
        let record = Record::new()
            .with_array("latitudes", Array2::<f64>::zeros((2, 3)))
            .with_array("longitudes", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(resolve(&record), Err(FieldError::Geometry(_))));

        let record = Record::new()
            .with_array("latitudes", Array2::<f64>::zeros((2, 3)))
            .with_array("longitudes", Array2::<f64>::zeros((2, 3)))
            .with_array("values", Array2::<f64>::zeros((2, 2)));
        assert!(matches!(resolve(&record), Err(FieldError::Geometry(_))));
    }

    #[test]
    fn tolerance_controls_regular_detection() {
        let record = Record::new()
            .with_array("distinctLatitudes", array![0.0, 1.0, 2.001])
            .with_array("distinctLongitudes", array![0.0, 1.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let strict = CoordinateResolver::default().resolve(&record).unwrap();
        assert_eq!(strict.increments(), None);

        let loose = CoordinateResolver::new(ResolverSettings {
            spacing_tolerance: 1e-2,
        })
        .resolve(&record)
        .unwrap();
        assert_eq!(loose.increments(), Some((1.0, 1.0)));
    }
}

//! End-to-end tests for assembling records into fields and field lists.
//!
//! These tests drive the public API only:
//! - geometry inference for distinct, full and unstructured coordinates
//! - field views and their consistency
//! - selection, ordering and stacking on a field list

use gridfield_core::field::DataKey;
use gridfield_core::geography::GridMode;
use gridfield_core::{
    CoordinateResolver, Field, FieldError, FieldList, MetadataValue, Record, Selection, Settings,
};
use is_close::is_close;
use ndarray::{array, Array2};
use std::sync::Arc;

fn field(record: &Record) -> Field {
    Field::from_record(record, &CoordinateResolver::default()).unwrap()
}

fn mesh_record(param: &str, level: i64) -> Record {
    Record::new()
        .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
        .with_array("distinctLongitudes", array![20.0, 40.0])
        .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .with("param", param)
        .with("level", level)
}

mod geometry_inference {
    use super::*;

    #[test]
    fn test_distinct_mesh() {
        let f = field(&mesh_record("t", 500));

        assert_eq!(f.shape().dims(), &[3, 2]);
        assert_eq!(
            f.to_numpy(),
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn()
        );
        assert_eq!(
            f.to_latlon().lat,
            array![[10.0, 10.0], [0.0, 0.0], [-10.0, -10.0]].into_dyn()
        );
    }

    /// Every mesh point takes its latitude from the row and its longitude from the column
    #[test]
    fn test_distinct_mesh_broadcast_for_various_sizes() {
        for (m, n) in [(1, 1), (1, 4), (4, 1), (5, 3)] {
            let lat: Vec<f64> = (0..m).map(|i| 80.0 - 10.0 * i as f64).collect();
            let lon: Vec<f64> = (0..n).map(|j| 5.0 * j as f64).collect();
            let record = Record::new()
                .with_vec("distinctLatitudes", lat.clone())
                .with_vec("distinctLongitudes", lon.clone())
                .with_vec("values", vec![0.0; m * n]);

            let latlon = field(&record).to_latlon();
            assert_eq!(latlon.lat.shape(), &[m, n]);
            for i in 0..m {
                for j in 0..n {
                    assert_eq!(latlon.lat[[i, j]], lat[i]);
                    assert_eq!(latlon.lon[[i, j]], lon[j]);
                }
            }
        }
    }

    #[test]
    fn test_plain_one_dimensional_axes_are_distinct() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, 0.0, -10.0])
            .with_array("longitudes", array![20.0, 40.0])
            .with_array("values", array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let f = field(&record);
        assert!(matches!(f.geometry().mode(), GridMode::Distinct { .. }));
        assert_eq!(f.metadata().mars_grid(), Some([20.0, 10.0]));
    }

    #[test]
    fn test_flattened_full_coordinates_stay_flat() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, 10.0, 0.0, 0.0, -10.0, -10.0])
            .with_array("longitudes", array![20.0, 40.0, 20.0, 40.0, 20.0, 40.0])
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let f = field(&record);
        assert_eq!(f.shape().dims(), &[6]);
        assert_eq!(f.to_numpy(), array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0].into_dyn());
    }

    #[test]
    fn test_unstructured_points_pass_through() {
        let lat = array![10.0, 10.0, 6.0, 6.0, 6.0];
        let lon = array![20.0, 40.0, -40.0, 0.0, 40.0];
        let record = Record::new()
            .with_array("latitudes", lat.clone())
            .with_array("longitudes", lon.clone())
            .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0]);

        let f = field(&record);
        assert_eq!(f.shape().dims(), &[5]);
        assert_eq!(f.geometry().mode(), &GridMode::Unstructured);
        assert_eq!(f.to_latlon().lat, lat.into_dyn());
        assert_eq!(f.to_latlon().lon, lon.into_dyn());
    }

    #[test]
    fn test_full_coordinates_round_trip() {
        let lat = Array2::from_shape_fn((2, 3), |(i, _)| 45.0 - i as f64);
        let lon = Array2::from_shape_fn((2, 3), |(i, j)| j as f64 + 0.5 * i as f64);
        let record = Record::new()
            .with_array("latitudes", lat.clone())
            .with_array("longitudes", lon.clone())
            .with_array("values", Array2::<f64>::zeros((2, 3)));

        let f = field(&record);
        assert_eq!(f.shape().dims(), &[2, 3]);
        assert_eq!(f.to_latlon().lat, lat.into_dyn());
        assert_eq!(f.to_latlon().lon, lon.into_dyn());
    }

    #[test]
    fn test_values_shape_wins_over_flat_coordinates() {
        let record = Record::new()
            .with_array("latitudes", array![1.0, 1.0, 1.0, 2.0, 2.0, 2.0])
            .with_array("longitudes", array![0.0, 1.0, 2.0, 0.0, 1.0, 2.0])
            .with_array("values", array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        let f = field(&record);
        assert_eq!(f.shape().dims(), &[2, 3]);
        assert_eq!(f.to_latlon().lat[[1, 0]], 2.0);
        assert_eq!(f.geometry().mode(), &GridMode::Full);
    }

    #[test]
    fn test_unexplainable_values_fail() {
        let record = Record::new()
            .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
            .with_array("distinctLongitudes", array![20.0, 40.0])
            .with_array("values", array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        let err = CoordinateResolver::default().resolve(&record).unwrap_err();
        assert!(matches!(err, FieldError::Geometry(_)));

        let err = Field::from_record(&record, &CoordinateResolver::default()).unwrap_err();
        assert!(matches!(err, FieldError::FieldConstruction { .. }));
    }

    #[test]
    fn test_nan_coordinates_fail() {
        let record = Record::new()
            .with_array("latitudes", array![10.0, f64::NAN])
            .with_array("longitudes", array![20.0, 40.0])
            .with_array("values", array![1.0, 2.0]);

        assert!(matches!(
            CoordinateResolver::default().resolve(&record),
            Err(FieldError::Geometry(_))
        ));
    }
}

mod field_views {
    use super::*;

    #[test]
    fn test_views_are_idempotent() {
        let f = field(&mesh_record("t", 500));

        assert_eq!(f.to_latlon(), f.to_latlon());
        assert_eq!(f.grid_points(), f.grid_points());
        assert_eq!(f.metadata().to_map(), f.metadata().to_map());
        assert_eq!(
            f.metadata().get("valid_datetime"),
            f.metadata().get("valid_datetime")
        );
    }

    #[test]
    fn test_grid_points_flatten_latlon_row_major() {
        let f = field(&mesh_record("t", 500));
        let (lats, lons) = f.grid_points();
        let latlon = f.to_latlon();

        assert_eq!(lats, latlon.lat.iter().copied().collect::<Vec<_>>());
        assert_eq!(lons, latlon.lon.iter().copied().collect::<Vec<_>>());
        assert_eq!(
            f.data(&[DataKey::Lat], true).unwrap().as_slice().unwrap(),
            lats.as_slice()
        );
    }

    #[test]
    fn test_valid_datetime_required_on_direct_access() {
        let f = field(&mesh_record("t", 500));
        assert!(matches!(
            f.metadata().valid_datetime(),
            Err(FieldError::MissingMetadata(_))
        ));

        let g = field(&mesh_record("t", 500).with("valid_time", "2020-12-21T18:00:00Z"));
        let valid = g.metadata().valid_datetime().unwrap();
        assert_eq!(valid.to_rfc3339(), "2020-12-21T18:00:00+00:00");
    }
}

mod field_list {
    use super::*;

    fn pressure_levels() -> FieldList {
        let params = ["t", "t", "u", "u", "d", "d"];
        let levels = [500, 850, 500, 850, 850, 600];
        let records: Vec<Record> = params
            .iter()
            .zip(levels)
            .map(|(p, l)| mesh_record(p, l))
            .collect();
        FieldList::from_records(&records).unwrap()
    }

    #[test]
    fn test_sel_param() {
        let fl = pressure_levels();
        let t = fl.sel(&Selection::new().eq("param", "t"));

        assert_eq!(t.len(), 2);
        assert_eq!(
            t.metadata("level"),
            vec![Some(MetadataValue::Int(500)), Some(MetadataValue::Int(850))]
        );
        assert!(Arc::ptr_eq(t.get(1).unwrap(), fl.get(1).unwrap()));

        assert!(fl.sel(&Selection::new().eq("param", "q")).is_empty());
    }

    #[test]
    fn test_order_by_level_is_stable() {
        let fl = pressure_levels();
        let ordered = fl.order_by("level").unwrap();

        let levels: Vec<i64> = ordered
            .metadata("level")
            .iter()
            .map(|v| v.as_ref().and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(levels, vec![500, 500, 600, 850, 850, 850]);

        let params: Vec<String> = ordered
            .metadata("param")
            .iter()
            .map(|v| v.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(params, vec!["t", "u", "d", "t", "u", "d"]);
    }

    #[test]
    fn test_order_by_missing_key() {
        let fl = pressure_levels();
        assert!(matches!(
            fl.order_by("number"),
            Err(FieldError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_ls_renders_missing_as_none() {
        let fl = pressure_levels();
        let table = fl.ls();

        assert_eq!(table.len(), fl.len());
        assert_eq!(table.column("step").unwrap(), vec![None; 6]);
        assert_eq!(
            table.column("level").unwrap()[5],
            Some(MetadataValue::Int(600))
        );
    }

    #[test]
    fn test_to_numpy_stacks_homogeneous_fields() {
        let fl = pressure_levels();
        let stacked = fl.to_numpy().unwrap();
        assert_eq!(stacked.shape(), &[6, 3, 2]);
        assert!(is_close!(stacked[[4, 2, 1]], 6.0));
    }

    #[test]
    fn test_to_numpy_rejects_heterogeneous_fields() {
        let mut fl = pressure_levels();
        fl.append(field(
            &Record::new()
                .with_array("latitudes", array![10.0, 10.0, 6.0, 6.0, 6.0])
                .with_array("longitudes", array![20.0, 40.0, -40.0, 0.0, 40.0])
                .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0]),
        ));

        assert!(matches!(
            fl.to_numpy(),
            Err(FieldError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_derived_lists_do_not_touch_parent() {
        let fl = pressure_levels();
        let mut t = fl.sel(&Selection::new().eq("param", "t"));
        t.append(field(&mesh_record("q", 1000)));

        assert_eq!(t.len(), 3);
        assert_eq!(fl.len(), 6);
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [listing]
            ls_keys = ["param", "levelist"]
            "#,
        )
        .unwrap();
        let records = vec![mesh_record("t", 500)];
        let fl = FieldList::from_records_with(&records, Arc::new(settings)).unwrap();

        let table = fl.ls();
        assert_eq!(table.columns, vec!["param", "levelist"]);
        assert_eq!(
            table.rows[0],
            vec![Some(MetadataValue::from("t")), Some(MetadataValue::Int(500))]
        );
    }
}

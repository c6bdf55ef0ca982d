//! Records shared by the unit tests

use crate::value::Record;
use ndarray::array;

/// 3x2 regular mesh with values 1..=6, `param=t`, `level=500`
pub fn distinct_record() -> Record {
    Record::new()
        .with_array("distinctLatitudes", array![10.0, 0.0, -10.0])
        .with_array("distinctLongitudes", array![20.0, 40.0])
        .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .with("param", "t")
        .with("level", 500)
}

/// Five irregular points with no metadata
pub fn unstructured_record() -> Record {
    Record::new()
        .with_array("latitudes", array![10.0, 10.0, 6.0, 6.0, 6.0])
        .with_array("longitudes", array![20.0, 40.0, -40.0, 0.0, 40.0])
        .with_array("values", array![1.0, 2.0, 3.0, 4.0, 5.0])
}

/// Six fields on the 3x2 mesh
///
/// Params are `[t, t, u, u, d, d]`, levels `[500, 850, 500, 850, 850, 600]` and the
/// values of field `i` are `i * 10 + (1..=6)`.
pub fn pressure_level_records() -> Vec<Record> {
    let params = ["t", "t", "u", "u", "d", "d"];
    let levels = [500, 850, 500, 850, 850, 600];
    params
        .iter()
        .zip(levels.iter())
        .enumerate()
        .map(|(i, (param, level))| {
            let offset = (i * 10) as f64;
            distinct_record()
                .with_vec("values", (1..=6).map(|v| offset + v as f64).collect())
                .with("param", *param)
                .with("level", *level)
                .with("date", 20201221)
                .with("time", 1200)
                .with("step", (i * 6) as i64)
        })
        .collect()
}

//! Python bindings for fields and field lists
//!
//! Records are passed from Python as dictionaries. Numpy arrays and lists of numbers become
//! array entries; `bool`, `int`, `float` and `str` values become metadata.

use crate::config::Settings;
use crate::errors::FieldError;
use crate::field::{DataKey, Field};
use crate::fieldlist::{FieldList, LsOptions, LsTable, OrderKey, Selection};
use crate::value::{FloatValue, MetadataValue, Record, RecordEntry};
use ndarray::ArrayD;
use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn, PyUntypedArray, ToPyArray};
use pyo3::exceptions::{PyIndexError, PyKeyError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PySlice, PySliceMethods, PyTuple};
use std::sync::Arc;

impl From<FieldError> for PyErr {
    fn from(err: FieldError) -> PyErr {
        match err {
            FieldError::IndexOutOfRange { .. } => PyIndexError::new_err(err.to_string()),
            FieldError::KeyNotFound(_) | FieldError::MissingMetadata(_) => {
                PyKeyError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

fn extract_scalar(value: &Bound<'_, PyAny>) -> PyResult<MetadataValue> {
    if value.is_instance_of::<PyBool>() {
        Ok(MetadataValue::Bool(value.extract()?))
    } else if let Ok(v) = value.extract::<i64>() {
        Ok(MetadataValue::Int(v))
    } else if let Ok(v) = value.extract::<FloatValue>() {
        Ok(MetadataValue::Float(v))
    } else if let Ok(v) = value.extract::<String>() {
        Ok(MetadataValue::Str(v))
    } else {
        Err(PyTypeError::new_err(format!(
            "Unsupported metadata value: {}",
            value.repr()?
        )))
    }
}

/// Numeric arrays of any dtype and (nested) sequences of numbers as `float64` arrays
///
/// Returns `None` for values that are neither arrays nor sequences.
fn extract_array(value: &Bound<'_, PyAny>) -> PyResult<Option<ArrayD<FloatValue>>> {
    if let Ok(array) = value.extract::<PyReadonlyArrayDyn<'_, FloatValue>>() {
        return Ok(Some(array.as_array().to_owned()));
    }
    let sequence = value.is_instance_of::<PyList>() || value.is_instance_of::<PyTuple>();
    if !(sequence || value.is_instance_of::<PyUntypedArray>()) {
        return Ok(None);
    }
    let numpy = PyModule::import_bound(value.py(), "numpy")?;
    let converted = numpy
        .call_method1("asarray", (value.clone(), "float64"))
        .map_err(|e| {
            PyTypeError::new_err(format!(
                "Cannot convert {} to a float64 array: {}",
                value.repr().map(|r| r.to_string()).unwrap_or_default(),
                e
            ))
        })?;
    let array: PyReadonlyArrayDyn<'_, FloatValue> = converted.extract()?;
    Ok(Some(array.as_array().to_owned()))
}

fn extract_entry(value: &Bound<'_, PyAny>) -> PyResult<RecordEntry> {
    match extract_array(value)? {
        Some(array) => Ok(RecordEntry::Array(array)),
        None => extract_scalar(value).map(RecordEntry::Scalar),
    }
}

fn extract_record(dict: &Bound<'_, PyDict>) -> PyResult<Record> {
    let mut record = Record::new();
    for (key, value) in dict.iter() {
        let key: String = key.extract()?;
        record.insert(&key, extract_entry(&value)?);
    }
    Ok(record)
}

fn metadata_to_py(py: Python<'_>, value: &MetadataValue) -> PyObject {
    match value {
        MetadataValue::Bool(v) => v.into_py(py),
        MetadataValue::Int(v) => v.into_py(py),
        MetadataValue::Float(v) => v.into_py(py),
        MetadataValue::DateTime(_) => value.to_string().into_py(py),
        MetadataValue::Str(v) => v.into_py(py),
        MetadataValue::Floats(v) => v.clone().into_py(py),
    }
}

fn optional_to_py(py: Python<'_>, value: Option<&MetadataValue>) -> PyObject {
    match value {
        Some(v) => metadata_to_py(py, v),
        None => py.None(),
    }
}

fn parse_keys(keys: Option<Vec<String>>) -> PyResult<Vec<DataKey>> {
    match keys {
        Some(keys) => keys
            .iter()
            .map(|k| k.parse::<DataKey>().map_err(PyErr::from))
            .collect(),
        None => Ok(vec![DataKey::Lat, DataKey::Lon, DataKey::Value]),
    }
}

fn ls_to_dict<'py>(py: Python<'py>, table: &LsTable) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    for (i, column) in table.columns.iter().enumerate() {
        let values: Vec<PyObject> = table
            .rows
            .iter()
            .map(|row| optional_to_py(py, row[i].as_ref()))
            .collect();
        dict.set_item(column, values)?;
    }
    Ok(dict)
}

/// Python wrapper for a single field
#[pyclass]
#[pyo3(name = "Field")]
#[derive(Debug, Clone)]
pub struct PyField(pub Arc<Field>);

#[pymethods]
impl PyField {
    #[staticmethod]
    fn from_record(record: &Bound<'_, PyDict>) -> PyResult<Self> {
        let record = extract_record(record)?;
        let field = Field::from_record(&record, &Default::default())?;
        Ok(Self(Arc::new(field)))
    }

    #[getter]
    fn shape(&self) -> Vec<usize> {
        self.0.shape().dims().to_vec()
    }

    #[getter]
    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArrayDyn<FloatValue>> {
        self.0.to_numpy_flat().into_pyarray_bound(py)
    }

    #[pyo3(signature = (flatten=false))]
    fn to_numpy<'py>(&self, py: Python<'py>, flatten: bool) -> Bound<'py, PyArrayDyn<FloatValue>> {
        if flatten {
            self.0.to_numpy_flat().into_pyarray_bound(py)
        } else {
            self.0.to_numpy().into_pyarray_bound(py)
        }
    }

    #[pyo3(signature = (flatten=false))]
    fn to_latlon<'py>(&self, py: Python<'py>, flatten: bool) -> PyResult<Bound<'py, PyDict>> {
        let latlon = if flatten {
            self.0.to_latlon_flat()
        } else {
            self.0.to_latlon()
        };
        let dict = PyDict::new_bound(py);
        dict.set_item("lat", latlon.lat.to_pyarray_bound(py))?;
        dict.set_item("lon", latlon.lon.to_pyarray_bound(py))?;
        Ok(dict)
    }

    fn grid_points(&self) -> (Vec<FloatValue>, Vec<FloatValue>) {
        self.0.grid_points()
    }

    /// Stacked `lat`, `lon` and/or `value` arrays; all three when `keys` is omitted
    #[pyo3(signature = (keys=None, flatten=false))]
    fn data<'py>(
        &self,
        py: Python<'py>,
        keys: Option<Vec<String>>,
        flatten: bool,
    ) -> PyResult<Bound<'py, PyArrayDyn<FloatValue>>> {
        let keys = parse_keys(keys)?;
        Ok(self.0.data(&keys, flatten)?.into_pyarray_bound(py))
    }

    /// `(north, west, south, east)`
    fn bounding_box(&self) -> (FloatValue, FloatValue, FloatValue, FloatValue) {
        let b = self.0.bounding_box();
        (b.north, b.west, b.south, b.east)
    }

    #[pyo3(signature = (key, default=None))]
    fn metadata(&self, py: Python<'_>, key: &str, default: Option<PyObject>) -> PyObject {
        match self.0.metadata().get(key) {
            Some(v) => metadata_to_py(py, &v),
            None => default.unwrap_or_else(|| py.None()),
        }
    }

    fn datetime<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dt = self.0.datetime();
        let dict = PyDict::new_bound(py);
        dict.set_item("base_time", dt.base_time.map(|t| t.to_rfc3339()))?;
        dict.set_item("valid_time", dt.valid_time.map(|t| t.to_rfc3339()))?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        self.0.to_string()
    }
}

/// Python wrapper for an ordered list of fields
#[pyclass]
#[pyo3(name = "FieldList")]
#[derive(Debug, Clone, Default)]
pub struct PyFieldList(pub FieldList);

#[pymethods]
impl PyFieldList {
    #[new]
    #[pyo3(signature = (records=None, config=None))]
    fn new(records: Option<Vec<Bound<'_, PyDict>>>, config: Option<&str>) -> PyResult<Self> {
        let settings = match config {
            Some(s) => Settings::from_toml_str(s)?,
            None => Settings::default(),
        };
        let records = records
            .unwrap_or_default()
            .iter()
            .map(extract_record)
            .collect::<PyResult<Vec<_>>>()?;
        Ok(Self(FieldList::from_records_with(
            &records,
            Arc::new(settings),
        )?))
    }

    fn __len__(&self) -> usize {
        self.0.len()
    }

    /// A field for an integer position, a new list for a slice
    fn __getitem__(&self, py: Python<'_>, index: &Bound<'_, PyAny>) -> PyResult<PyObject> {
        if let Ok(slice) = index.downcast::<PySlice>() {
            let bounds = slice.indices(self.0.len() as _)?;
            let (start, step) = (bounds.start as isize, bounds.step as isize);
            let positions: Vec<usize> = (0..bounds.slicelength as isize)
                .map(|i| (start + i * step) as usize)
                .collect();
            return Ok(Self(self.0.isel(&positions)?).into_py(py));
        }

        let index: isize = index.extract()?;
        let len = self.0.len() as isize;
        let idx = if index < 0 { index + len } else { index };
        if idx < 0 {
            return Err(FieldError::IndexOutOfRange {
                index: index.unsigned_abs(),
                len: self.0.len(),
            }
            .into());
        }
        Ok(PyField(self.0.get(idx as usize)?.clone()).into_py(py))
    }

    fn __repr__(&self) -> String {
        format!("FieldList(len={})", self.0.len())
    }

    fn append(&mut self, field: PyField) {
        self.0.append(field.0);
    }

    /// Fields whose metadata match every keyword; list or tuple values match any element
    #[pyo3(signature = (**kwargs))]
    fn sel(&self, kwargs: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let mut selection = Selection::new();
        if let Some(kwargs) = kwargs {
            for (key, value) in kwargs.iter() {
                let key: String = key.extract()?;
                let many = value.is_instance_of::<PyList>() || value.is_instance_of::<PyTuple>();
                selection = if many {
                    let values = value
                        .iter()?
                        .map(|v| extract_scalar(&v?))
                        .collect::<PyResult<Vec<_>>>()?;
                    selection.any_of(&key, values)
                } else {
                    selection.eq(&key, extract_scalar(&value)?)
                };
            }
        }
        Ok(Self(self.0.sel(&selection)))
    }

    /// Sort by one or more keys; a leading `-` sorts that key descending
    #[pyo3(signature = (*keys))]
    fn order_by(&self, keys: Vec<String>) -> PyResult<Self> {
        let keys: Vec<OrderKey> = keys
            .iter()
            .map(|k| match k.strip_prefix('-') {
                Some(k) => OrderKey::descending(k),
                None => OrderKey::ascending(k),
            })
            .collect();
        Ok(Self(self.0.order_by_keys(&keys)?))
    }

    /// Listing as a dict of columns
    #[pyo3(signature = (n=None, keys=None, extra_keys=None))]
    fn ls<'py>(
        &self,
        py: Python<'py>,
        n: Option<isize>,
        keys: Option<Vec<String>>,
        extra_keys: Option<Vec<String>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let table = self.0.ls_with(&LsOptions {
            n,
            keys,
            extra_keys: extra_keys.unwrap_or_default(),
        });
        ls_to_dict(py, &table)
    }

    #[pyo3(signature = (n=5))]
    fn head<'py>(&self, py: Python<'py>, n: usize) -> PyResult<Bound<'py, PyDict>> {
        ls_to_dict(py, &self.0.head(n)?)
    }

    #[pyo3(signature = (n=5))]
    fn tail<'py>(&self, py: Python<'py>, n: usize) -> PyResult<Bound<'py, PyDict>> {
        ls_to_dict(py, &self.0.tail(n)?)
    }

    /// The first `n` fields as a new list
    fn head_list(&self, n: usize) -> Self {
        Self(self.0.head_list(n))
    }

    fn metadata(&self, py: Python<'_>, key: &str) -> Vec<PyObject> {
        self.0
            .metadata(key)
            .iter()
            .map(|v| optional_to_py(py, v.as_ref()))
            .collect()
    }

    fn to_numpy<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArrayDyn<FloatValue>>> {
        Ok(self.0.to_numpy()?.into_pyarray_bound(py))
    }

    #[getter]
    fn values<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArrayDyn<FloatValue>>> {
        Ok(self.0.values()?.into_dyn().into_pyarray_bound(py))
    }

    fn to_latlon<'py>(&self, py: Python<'py>) -> PyResult<Option<Bound<'py, PyDict>>> {
        match self.0.to_latlon()? {
            Some(latlon) => {
                let dict = PyDict::new_bound(py);
                dict.set_item("lat", latlon.lat.into_pyarray_bound(py))?;
                dict.set_item("lon", latlon.lon.into_pyarray_bound(py))?;
                Ok(Some(dict))
            }
            None => Ok(None),
        }
    }

    /// Stacked `lat`, `lon` and/or `value` arrays; all three when `keys` is omitted
    #[pyo3(signature = (keys=None, flatten=false))]
    fn data<'py>(
        &self,
        py: Python<'py>,
        keys: Option<Vec<String>>,
        flatten: bool,
    ) -> PyResult<Bound<'py, PyArrayDyn<FloatValue>>> {
        let keys = parse_keys(keys)?;
        Ok(self.0.data(&keys, flatten)?.into_pyarray_bound(py))
    }

    fn bounding_box(&self) -> Vec<(FloatValue, FloatValue, FloatValue, FloatValue)> {
        self.0
            .bounding_box()
            .iter()
            .map(|b| (b.north, b.west, b.south, b.east))
            .collect()
    }

    fn index(&self, py: Python<'_>, key: &str) -> Vec<PyObject> {
        self.0
            .index(key)
            .iter()
            .map(|v| metadata_to_py(py, v))
            .collect()
    }

    #[pyo3(signature = (squeeze=false))]
    fn indices<'py>(&self, py: Python<'py>, squeeze: bool) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new_bound(py);
        for (key, values) in self.0.indices(squeeze) {
            let values: Vec<PyObject> = values.iter().map(|v| metadata_to_py(py, v)).collect();
            dict.set_item(key, values)?;
        }
        Ok(dict)
    }

    fn datetime<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dt = self.0.datetime();
        let dict = PyDict::new_bound(py);
        let iso = |times: Vec<chrono::DateTime<chrono::Utc>>| -> Vec<String> {
            times.iter().map(|t| t.to_rfc3339()).collect()
        };
        dict.set_item("base_time", iso(dt.base_time))?;
        dict.set_item("valid_time", iso(dt.valid_time))?;
        Ok(dict)
    }

    #[staticmethod]
    fn from_numpy(
        array: PyReadonlyArrayDyn<'_, FloatValue>,
        templates: &PyFieldList,
    ) -> PyResult<Self> {
        let values = array.as_array().to_owned();
        Ok(Self(FieldList::from_numpy(values, &templates.0)?))
    }

    #[staticmethod]
    fn merge(lists: Vec<PyRef<'_, PyFieldList>>) -> Self {
        Self(FieldList::merge(lists.iter().map(|l| &l.0)))
    }
}

#[pymodule]
pub fn core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyField>()?;
    m.add_class::<PyFieldList>()?;
    Ok(())
}

//! Ordered collections of fields
//!
//! A [`FieldList`] holds fields in append order and answers collection-level queries:
//! selection by metadata, ordering by metadata, tabular listings, unique metadata values and
//! stacked numeric views. Fields are shared between lists with [`Arc`], so selecting or
//! ordering never copies field data and never modifies the original list.
//!
//! ```rust
//! use gridfield_core::fieldlist::{FieldList, Selection};
//! use gridfield_core::value::Record;
//! use ndarray::array;
//!
//! let records: Vec<Record> = ["t", "u", "t"]
//!     .iter()
//!     .zip([850, 500, 500])
//!     .map(|(param, level)| {
//!         Record::new()
//!             .with_array("distinctLatitudes", array![10.0, 0.0])
//!             .with_array("distinctLongitudes", array![20.0, 40.0])
//!             .with_array("values", array![1.0, 2.0, 3.0, 4.0])
//!             .with("param", *param)
//!             .with("level", level)
//!     })
//!     .collect();
//!
//! let fields = FieldList::from_records(&records).unwrap();
//! let t = fields.sel(&Selection::new().eq("param", "t")).order_by("level").unwrap();
//! assert_eq!(t.len(), 2);
//! assert_eq!(t.metadata("level"), vec![Some(500.into()), Some(850.into())]);
//! assert_eq!(t.to_numpy().unwrap().shape(), &[2, 2, 2]);
//! ```

use crate::config::Settings;
use crate::errors::{FieldError, FieldResult};
use crate::field::{DataKey, Field};
use crate::geography::{stack_arrays, BoundingBox, LatLon};
use crate::resolver::CoordinateResolver;
use crate::value::{FloatValue, MetadataValue, Record};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

/// Options for [`FieldList::ls_with`]
#[derive(Debug, Clone, Default)]
pub struct LsOptions {
    /// Number of fields to list: `n > 0` from the front, `n < 0` from the back, `None` for all
    pub n: Option<isize>,
    /// Columns replacing the default listing keys
    pub keys: Option<Vec<String>>,
    /// Columns appended after `keys`
    pub extra_keys: Vec<String>,
}

/// Tabular listing of field metadata, one row per field
///
/// Missing values are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<MetadataValue>>>,
}

impl LsTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<Option<MetadataValue>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }
}

/// Metadata filters for [`FieldList::sel`]
///
/// A field matches when every filter matches. A filter matches when the field's value for
/// the key equals one of the filter's accepted values.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    filters: Vec<(String, Vec<MetadataValue>)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.filters.push((key.to_string(), vec![value.into()]));
        self
    }

    pub fn any_of<V: Into<MetadataValue>>(
        mut self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push((
            key.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, field: &Field) -> bool {
        let md = field.metadata();
        self.filters.iter().all(|(key, accepted)| {
            md.get(key)
                .is_some_and(|value| accepted.iter().any(|a| *a == value))
        })
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for Selection {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            filters: iter
                .into_iter()
                .map(|(k, v)| (k.into(), vec![v.into()]))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One sort key for [`FieldList::order_by_keys`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub key: String,
    pub order: SortOrder,
}

impl OrderKey {
    pub fn ascending(key: &str) -> Self {
        Self {
            key: key.to_string(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(key: &str) -> Self {
        Self {
            key: key.to_string(),
            order: SortOrder::Descending,
        }
    }
}

/// Unique, sorted base and valid times of a field list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldListDatetime {
    pub base_time: Vec<DateTime<Utc>>,
    pub valid_time: Vec<DateTime<Utc>>,
}

/// An ordered collection of fields
#[derive(Debug, Clone, Default)]
pub struct FieldList {
    fields: Vec<Arc<Field>>,
    settings: Arc<Settings>,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Arc<Settings>) -> Self {
        Self {
            fields: Vec::new(),
            settings,
        }
    }

    /// Resolve and assemble every record with default settings
    pub fn from_records<'r>(records: impl IntoIterator<Item = &'r Record>) -> FieldResult<Self> {
        Self::from_records_with(records, Arc::new(Settings::default()))
    }

    /// Resolve and assemble every record
    ///
    /// # Errors
    ///
    /// Fails on the first record that cannot be turned into a field; the error message
    /// names the record's position.
    pub fn from_records_with<'r>(
        records: impl IntoIterator<Item = &'r Record>,
        settings: Arc<Settings>,
    ) -> FieldResult<Self> {
        let resolver = CoordinateResolver::new(settings.resolver.clone());
        let mut list = Self::with_settings(settings);
        for (i, record) in records.into_iter().enumerate() {
            let field = Field::from_record(record, &resolver).map_err(|e| match e {
                FieldError::FieldConstruction { message, source } => {
                    FieldError::FieldConstruction {
                        message: format!("record {}: {}", i, message),
                        source,
                    }
                }
                other => other,
            })?;
            list.append(field);
        }
        log::debug!("Assembled {} fields", list.len());
        Ok(list)
    }

    /// Build fields from stacked values, borrowing geometry and metadata from `templates`
    ///
    /// The leading axis of `values` indexes the templates. A single template also accepts
    /// `values` shaped like the template field itself (or its flattened form).
    pub fn from_numpy(values: ArrayD<FloatValue>, templates: &FieldList) -> FieldResult<Self> {
        let n = templates.len();
        if n == 0 {
            return Err(FieldError::InvalidArgument(
                "from_numpy: at least one template field is required".to_string(),
            ));
        }
        let mut list = Self::with_settings(templates.settings.clone());

        if values.ndim() > 0 && values.shape()[0] == n {
            for (template, row) in templates.iter().zip(values.axis_iter(Axis(0))) {
                list.append(template.with_values(row.to_owned())?);
            }
            return Ok(list);
        }

        let template = &templates.fields[0];
        let shape = template.shape().dims();
        let shape_match = values.shape() == shape
            || (values.ndim() == 1 && values.len() == template.shape().size());
        if n == 1 && shape_match {
            list.append(template.with_values(values)?);
            Ok(list)
        } else {
            Err(FieldError::InvalidArgument(format!(
                "from_numpy: first array dimension ({}) differs from number of template fields ({})",
                values.shape().first().copied().unwrap_or(0),
                n
            )))
        }
    }

    /// Concatenate several lists, keeping the settings of the first
    pub fn merge<'a>(lists: impl IntoIterator<Item = &'a FieldList>) -> FieldList {
        let mut lists = lists.into_iter();
        let mut merged = match lists.next() {
            Some(first) => first.clone(),
            None => return FieldList::new(),
        };
        for list in lists {
            merged.fields.extend(list.fields.iter().cloned());
        }
        merged
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn append(&mut self, field: impl Into<Arc<Field>>) {
        self.fields.push(field.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> FieldResult<&Arc<Field>> {
        self.fields.get(index).ok_or(FieldError::IndexOutOfRange {
            index,
            len: self.fields.len(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Field>> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    fn derive(&self, fields: Vec<Arc<Field>>) -> FieldList {
        FieldList {
            fields,
            settings: self.settings.clone(),
        }
    }

    /// Fields at positions within `range`, clamped to the list length
    pub fn slice(&self, range: impl RangeBounds<usize>) -> FieldList {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&i) => i,
            Bound::Excluded(&i) => i.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&i) => i.saturating_add(1),
            Bound::Excluded(&i) => i,
            Bound::Unbounded => len,
        }
        .clamp(start, len);
        self.derive(self.fields[start..end].to_vec())
    }

    /// The first `n` fields as a new list
    pub fn head_list(&self, n: usize) -> FieldList {
        self.slice(..n)
    }

    /// Fields at the given positions, in the order given
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::IndexOutOfRange`] for any position outside the list.
    pub fn isel(&self, indices: &[usize]) -> FieldResult<FieldList> {
        let fields = indices
            .iter()
            .map(|&i| self.get(i).cloned())
            .collect::<FieldResult<Vec<_>>>()?;
        Ok(self.derive(fields))
    }

    /// Listing over the default keys
    pub fn ls(&self) -> LsTable {
        self.ls_with(&LsOptions::default())
    }

    pub fn ls_with(&self, options: &LsOptions) -> LsTable {
        let mut columns = options
            .keys
            .clone()
            .unwrap_or_else(|| self.settings.listing.ls_keys.clone());
        columns.extend(options.extra_keys.iter().cloned());

        let num = self.len();
        let range = match options.n {
            None => 0..num,
            Some(n) if n >= 0 => 0..num.min(n as usize),
            Some(n) => num - num.min(n.unsigned_abs())..num,
        };

        let rows = self.fields[range]
            .iter()
            .map(|field| {
                let md = field.metadata();
                columns.iter().map(|key| md.get(key)).collect()
            })
            .collect();
        LsTable { columns, rows }
    }

    /// Listing of the first `n` fields
    pub fn head(&self, n: usize) -> FieldResult<LsTable> {
        if n == 0 {
            return Err(FieldError::InvalidArgument(
                "head: n must be > 0".to_string(),
            ));
        }
        Ok(self.ls_with(&LsOptions {
            n: Some(n as isize),
            ..Default::default()
        }))
    }

    /// Listing of the last `n` fields
    pub fn tail(&self, n: usize) -> FieldResult<LsTable> {
        if n == 0 {
            return Err(FieldError::InvalidArgument(
                "tail: n must be > 0".to_string(),
            ));
        }
        Ok(self.ls_with(&LsOptions {
            n: Some(-(n as isize)),
            ..Default::default()
        }))
    }

    /// Value of `key` for every field, in field order
    pub fn metadata(&self, key: &str) -> Vec<Option<MetadataValue>> {
        self.fields.iter().map(|f| f.metadata().get(key)).collect()
    }

    /// Values of several keys for every field, one inner vector per field
    pub fn metadata_many(&self, keys: &[&str]) -> Vec<Vec<Option<MetadataValue>>> {
        self.fields
            .iter()
            .map(|f| {
                let md = f.metadata();
                keys.iter().map(|key| md.get(key)).collect()
            })
            .collect()
    }

    /// Fields matching every filter, in their original order
    pub fn sel(&self, selection: &Selection) -> FieldList {
        let fields: Vec<Arc<Field>> = self
            .fields
            .iter()
            .filter(|f| selection.matches(f))
            .cloned()
            .collect();
        log::debug!("Selection matched {} of {} fields", fields.len(), self.len());
        self.derive(fields)
    }

    /// Fields sorted by ascending `key`
    ///
    /// The sort is stable and fields without the key sort last.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KeyNotFound`] if no field has the key.
    pub fn order_by(&self, key: &str) -> FieldResult<FieldList> {
        self.order_by_keys(&[OrderKey::ascending(key)])
    }

    /// Fields sorted by several keys, earlier keys taking precedence
    pub fn order_by_keys(&self, keys: &[OrderKey]) -> FieldResult<FieldList> {
        let mut rows: Vec<(Vec<Option<MetadataValue>>, &Arc<Field>)> = self
            .fields
            .iter()
            .map(|f| {
                let md = f.metadata();
                (keys.iter().map(|k| md.get(&k.key)).collect(), f)
            })
            .collect();

        if !rows.is_empty() {
            for (i, order_key) in keys.iter().enumerate() {
                let present = rows.iter().filter(|(values, _)| values[i].is_some()).count();
                if present == 0 {
                    return Err(FieldError::KeyNotFound(order_key.key.clone()));
                }
                if present < rows.len() {
                    log::debug!(
                        "{} of {} fields have no '{}'; they sort last",
                        rows.len() - present,
                        rows.len(),
                        order_key.key
                    );
                }
            }
        }

        rows.sort_by(|(a, _), (b, _)| {
            keys.iter()
                .enumerate()
                .map(|(i, k)| compare_present_first(&a[i], &b[i], k.order))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(self.derive(rows.into_iter().map(|(_, f)| f.clone()).collect()))
    }

    /// Values of every field stacked on a new leading axis
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::ShapeMismatch`] unless all fields share one shape.
    pub fn to_numpy(&self) -> FieldResult<ArrayD<FloatValue>> {
        let first = match self.fields.first() {
            Some(f) => f,
            None => return Ok(ArrayD::zeros(IxDyn(&[0]))),
        };
        if let Some(other) = self.fields.iter().find(|f| f.shape() != first.shape()) {
            return Err(FieldError::ShapeMismatch {
                expected: first.shape().to_string(),
                found: other.shape().to_string(),
            });
        }
        let arrays: Vec<ArrayD<FloatValue>> = self.fields.iter().map(|f| f.to_numpy()).collect();
        stack_arrays(&arrays).ok_or_else(|| FieldError::ShapeMismatch {
            expected: first.shape().to_string(),
            found: "arrays that cannot be stacked".to_string(),
        })
    }

    /// Flattened values of every field, one row per field
    pub fn values(&self) -> FieldResult<Array2<FloatValue>> {
        let size = match self.fields.first() {
            Some(f) => f.shape().size(),
            None => return Ok(Array2::zeros((0, 0))),
        };
        if let Some(other) = self.fields.iter().find(|f| f.shape().size() != size) {
            return Err(FieldError::ShapeMismatch {
                expected: format!("({},)", size),
                found: format!("({},)", other.shape().size()),
            });
        }
        let mut out = Array2::zeros((self.len(), size));
        for (mut row, field) in out.axis_iter_mut(Axis(0)).zip(self.fields.iter()) {
            row.assign(&field.values());
        }
        Ok(out)
    }

    /// Whether every field is defined on the grid of the first
    pub fn is_shared_grid(&self) -> bool {
        match self.fields.first() {
            Some(first) => self.fields.iter().all(|f| f.same_grid(first)),
            None => false,
        }
    }

    fn shared_grid_field(&self) -> FieldResult<Option<&Arc<Field>>> {
        if self.is_empty() {
            return Ok(None);
        }
        if !self.is_shared_grid() {
            return Err(FieldError::ShapeMismatch {
                expected: "a grid shared by all fields".to_string(),
                found: "fields on different grids".to_string(),
            });
        }
        Ok(self.fields.first())
    }

    /// Latitudes and longitudes of the grid shared by all fields
    ///
    /// `None` for an empty list.
    pub fn to_latlon(&self) -> FieldResult<Option<LatLon>> {
        Ok(self.shared_grid_field()?.map(|f| f.to_latlon()))
    }

    pub fn grid_points(&self) -> FieldResult<Option<(Vec<FloatValue>, Vec<FloatValue>)>> {
        Ok(self.shared_grid_field()?.map(|f| f.grid_points()))
    }

    /// Coordinates of the shared grid and/or the values of every field
    ///
    /// The result stacks, in key order, the latitudes of the grid for `Lat`, its longitudes
    /// for `Lon`, and one array per field for `Value`.
    pub fn data(&self, keys: &[DataKey], flatten: bool) -> FieldResult<ArrayD<FloatValue>> {
        if keys.is_empty() {
            return Err(FieldError::InvalidArgument(
                "data: at least one key is required".to_string(),
            ));
        }
        let first = match self.shared_grid_field()? {
            Some(f) => f,
            None => return Ok(ArrayD::zeros(IxDyn(&[0]))),
        };
        let mut arrays = Vec::new();
        for key in keys {
            match key {
                DataKey::Value => arrays.extend(
                    self.fields
                        .iter()
                        .map(|f| f.data_array(DataKey::Value, flatten)),
                ),
                coordinate => arrays.push(first.data_array(*coordinate, flatten)),
            }
        }
        stack_arrays(&arrays).ok_or_else(|| FieldError::ShapeMismatch {
            expected: first.shape().to_string(),
            found: "arrays that cannot be stacked".to_string(),
        })
    }

    pub fn bounding_box(&self) -> Vec<BoundingBox> {
        self.fields.iter().map(|f| f.bounding_box()).collect()
    }

    /// Unique, sorted values of `key` across all fields
    pub fn index(&self, key: &str) -> Vec<MetadataValue> {
        unique_sorted(self.fields.iter().filter_map(|f| f.metadata().get(key)))
    }

    /// Unique, sorted values for each configured index key
    ///
    /// Keys without any value are left out. With `squeeze`, only keys with more than one
    /// value are kept.
    pub fn indices(&self, squeeze: bool) -> BTreeMap<String, Vec<MetadataValue>> {
        self.settings
            .listing
            .index_keys
            .iter()
            .map(|key| (key.clone(), self.index(key)))
            .filter(|(_, values)| !values.is_empty() && (!squeeze || values.len() > 1))
            .collect()
    }

    pub fn datetime(&self) -> FieldListDatetime {
        let mut base_time = Vec::new();
        let mut valid_time = Vec::new();
        for field in &self.fields {
            let dt = field.datetime();
            base_time.extend(dt.base_time);
            valid_time.extend(dt.valid_time);
        }
        for times in [&mut base_time, &mut valid_time] {
            times.sort();
            times.dedup();
        }
        FieldListDatetime {
            base_time,
            valid_time,
        }
    }
}

/// Present values first, in the requested order; missing values last
fn compare_present_first(
    a: &Option<MetadataValue>,
    b: &Option<MetadataValue>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Ascending => a.sort_cmp(b),
            SortOrder::Descending => b.sort_cmp(a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn unique_sorted(values: impl Iterator<Item = MetadataValue>) -> Vec<MetadataValue> {
    let mut values: Vec<MetadataValue> = values.collect();
    values.sort_by(|a, b| a.sort_cmp(b));
    values.dedup();
    values
}

impl<'a> IntoIterator for &'a FieldList {
    type Item = &'a Arc<Field>;
    type IntoIter = std::slice::Iter<'a, Arc<Field>>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl IntoIterator for FieldList {
    type Item = Arc<Field>;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<Arc<Field>> for FieldList {
    fn from_iter<T: IntoIterator<Item = Arc<Field>>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
            settings: Arc::new(Settings::default()),
        }
    }
}

impl Extend<Arc<Field>> for FieldList {
    fn extend<T: IntoIterator<Item = Arc<Field>>>(&mut self, iter: T) {
        self.fields.extend(iter);
    }
}

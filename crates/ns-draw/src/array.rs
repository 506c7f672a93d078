//! Evaluated values.
//!
//! Every value carries its numeric payload together with an explicit validity
//! bitmap (`None` = all valid). Missing entries come from indexing past a
//! row's length or reducing an empty row, and are dropped only at the very
//! end of a draw so that all output dimensions stay aligned.

/// Numeric payload plus optional validity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Masked {
    /// Values; entries at invalid positions are unspecified (usually `NaN`).
    pub values: Vec<f64>,
    /// `valid[i] == false` marks position `i` missing. `None` means all valid.
    pub valid: Option<Vec<bool>>,
}

impl Masked {
    /// All-valid values.
    pub fn dense(values: Vec<f64>) -> Self {
        Self { values, valid: None }
    }

    /// Values with an explicit validity bitmap; an all-true bitmap collapses to `None`.
    pub fn with_validity(values: Vec<f64>, valid: Vec<bool>) -> Self {
        debug_assert_eq!(values.len(), valid.len());
        if valid.iter().all(|&v| v) {
            Self { values, valid: None }
        } else {
            Self { values, valid: Some(valid) }
        }
    }

    /// Build from optional values (`None` = missing).
    pub fn from_options(items: impl IntoIterator<Item = Option<f64>>) -> Self {
        let mut values = Vec::new();
        let mut valid = Vec::new();
        for item in items {
            values.push(item.unwrap_or(f64::NAN));
            valid.push(item.is_some());
        }
        Self::with_validity(values, valid)
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no positions.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether position `i` holds a value.
    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        self.valid.as_ref().is_none_or(|v| v[i])
    }

    /// Value at `i`, or `None` if missing.
    #[inline]
    pub fn get(&self, i: usize) -> Option<f64> {
        if self.is_valid(i) { Some(self.values[i]) } else { None }
    }

    /// Number of missing positions.
    pub fn null_count(&self) -> usize {
        self.valid.as_ref().map_or(0, |v| v.iter().filter(|&&b| !b).count())
    }

    /// Keep positions where `keep[i]` is true, preserving order.
    pub fn filter(&self, keep: &[bool]) -> Masked {
        let mut values = Vec::with_capacity(self.len());
        let mut valid = Vec::with_capacity(self.len());
        for (i, _) in keep.iter().enumerate().filter(|(_, k)| **k) {
            values.push(self.values[i]);
            valid.push(self.is_valid(i));
        }
        Masked::with_validity(values, valid)
    }

    /// Iterate as optional values.
    pub fn iter(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }
}

/// Variable-length rows stored as offsets into a flat, masked content array.
#[derive(Debug, Clone, PartialEq)]
pub struct Jagged {
    /// Row boundaries: `offsets.len() == n_rows + 1`, non-decreasing.
    pub offsets: Vec<usize>,
    /// Concatenated row contents.
    pub content: Masked,
}

impl Jagged {
    /// Build from rows of optional values.
    pub fn from_rows(rows: impl IntoIterator<Item = Vec<Option<f64>>>) -> Self {
        let mut offsets = vec![0usize];
        let mut items = Vec::new();
        for row in rows {
            items.extend(row);
            offsets.push(items.len());
        }
        Jagged { offsets, content: Masked::from_options(items) }
    }

    /// One single-element row per entry of `rows` (the `keepdims` shape).
    pub fn singletons(rows: Masked) -> Self {
        let offsets = (0..=rows.len()).collect();
        Jagged { offsets, content: rows }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Content range of row `row`.
    #[inline]
    pub fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.offsets[row]..self.offsets[row + 1]
    }

    /// Length of row `row` (including missing elements).
    #[inline]
    pub fn row_len(&self, row: usize) -> usize {
        self.offsets[row + 1] - self.offsets[row]
    }

    /// Row `row` as optional values.
    pub fn row(&self, row: usize) -> Vec<Option<f64>> {
        self.row_range(row).map(|i| self.content.get(i)).collect()
    }

    /// All rows as optional values.
    pub fn to_rows(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.n_rows()).map(|r| self.row(r)).collect()
    }

    /// Length of the longest row (`0` without rows).
    pub fn max_row_len(&self) -> usize {
        (0..self.n_rows()).map(|row| self.row_len(row)).max().unwrap_or(0)
    }

    /// Whether `other` has exactly the same row structure.
    pub fn same_shape(&self, other: &Jagged) -> bool {
        self.offsets == other.offsets
    }

    /// Keep rows where `keep[row]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Jagged {
        let mut offsets = vec![0usize];
        let mut elem_keep = vec![false; self.content.len()];
        for (row, _) in keep.iter().enumerate().filter(|(_, k)| **k) {
            let range = self.row_range(row);
            let len = range.len();
            for i in range {
                elem_keep[i] = true;
            }
            offsets.push(offsets[offsets.len() - 1] + len);
        }
        Jagged { offsets, content: self.content.filter(&elem_keep) }
    }

    /// Select one position per row; positions past the row end are missing.
    pub fn take_position(&self, pick: impl Fn(usize) -> Option<usize>) -> Masked {
        Masked::from_options((0..self.n_rows()).map(|row| {
            let len = self.row_len(row);
            match pick(len) {
                Some(i) if i < len => self.content.get(self.offsets[row] + i),
                _ => None,
            }
        }))
    }

    /// `[start:stop]` on every row, bounds clamped to the row; negative bounds count from the end.
    pub fn slice_rows(&self, start: Option<i64>, stop: Option<i64>) -> Jagged {
        Jagged::from_rows((0..self.n_rows()).map(|row| {
            let len = self.row_len(row) as i64;
            let clamp = |b: i64| if b < 0 { (len + b).max(0) } else { b.min(len) };
            let lo = start.map_or(0, clamp);
            let hi = stop.map_or(len, clamp);
            let base = self.offsets[row];
            (lo..hi.max(lo)).map(|i| self.content.get(base + i as usize)).collect()
        }))
    }
}

/// Value type tag, decides subscript semantics and output typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// Comparison / boolean result (`0.0` / `1.0`).
    Bool,
    /// Integer positions produced by `argmin` / `argmax`.
    Index,
    /// Any other number.
    Real,
}

/// Shape of an evaluated value.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Zero-dimensional constant.
    Scalar(f64),
    /// One value per row.
    Rows(Masked),
    /// Variable-length sequence per row.
    Nested(Jagged),
}

/// An evaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Payload and shape.
    pub data: Data,
    /// Type tag.
    pub dtype: DType,
}

impl Value {
    /// Real-valued scalar.
    pub fn scalar(v: f64) -> Self {
        Value { data: Data::Scalar(v), dtype: DType::Real }
    }

    /// Real-valued per-row value.
    pub fn rows(m: Masked) -> Self {
        Value { data: Data::Rows(m), dtype: DType::Real }
    }

    /// Real-valued nested value.
    pub fn nested(j: Jagged) -> Self {
        Value { data: Data::Nested(j), dtype: DType::Real }
    }

    /// Same payload with a different type tag.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Whether the value is still per-element (not reduced to one per row).
    pub fn is_nested(&self) -> bool {
        matches!(self.data, Data::Nested(_))
    }
}

/// Truthiness: any non-zero value (including `NaN`) is true.
#[inline]
pub fn truthy(v: f64) -> bool {
    v != 0.0
}

/// Boolean as `0.0` / `1.0`.
#[inline]
pub fn from_bool(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

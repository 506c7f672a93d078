//! Column bindings and the columnar-store contract.
//!
//! A column is either flat (one number per row) or jagged (a variable-length
//! sequence per row, stored as a flat buffer plus row offsets). [`Table`] is
//! the in-memory store used by tests and the CLI; anything else that can hand
//! out columns by name implements [`ColumnSource`].

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::array::{DType, Jagged, Masked, Value, from_bool};
use crate::error::{DrawError, Result};

/// Jagged column data: flat values + offsets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JaggedCol {
    /// Flat array of all values across all rows.
    pub flat: Vec<f64>,
    /// Row boundaries: `offsets.len() == n_rows + 1`.
    pub offsets: Vec<usize>,
}

impl JaggedCol {
    /// Validated constructor: offsets must start at 0, never decrease and end at `flat.len()`.
    pub fn new(flat: Vec<f64>, offsets: Vec<usize>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(DrawError::ShapeMismatch(
                "jagged column offsets must start at 0".to_string(),
            ));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(DrawError::ShapeMismatch(
                "jagged column offsets must be non-decreasing".to_string(),
            ));
        }
        let end = offsets[offsets.len() - 1];
        if end != flat.len() {
            return Err(DrawError::ShapeMismatch(format!(
                "jagged column offsets end at {end} but {} values are stored",
                flat.len()
            )));
        }
        Ok(Self { flat, offsets })
    }

    /// Build from one `Vec` per row.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let mut flat = Vec::new();
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        for row in rows {
            flat.extend_from_slice(row.as_ref());
            offsets.push(flat.len());
        }
        Self { flat, offsets }
    }

    /// Element `index` of row `row`, or `None` past the row end.
    pub fn get(&self, row: usize, index: usize) -> Option<f64> {
        let start = self.offsets[row];
        let end = self.offsets[row + 1];
        if index >= end - start { None } else { Some(self.flat[start + index]) }
    }

    /// Number of rows.
    pub fn n_entries(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Rows `[start, end)` as a new column with rebased offsets.
    pub fn slice(&self, start: usize, end: usize) -> JaggedCol {
        let base = self.offsets[start];
        let stop = self.offsets[end];
        JaggedCol {
            flat: self.flat[base..stop].to_vec(),
            offsets: self.offsets[start..=end].iter().map(|o| o - base).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Flat(Vec<f64>),
    Jagged(Vec<Vec<f64>>),
    FlatBool(Vec<bool>),
    JaggedBool(Vec<Vec<bool>>),
}

impl From<RawColumn> for Column {
    fn from(raw: RawColumn) -> Self {
        match raw {
            RawColumn::Flat(v) => Column::Flat(v),
            RawColumn::Jagged(rows) => Column::Jagged(JaggedCol::from_rows(&rows)),
            RawColumn::FlatBool(v) => Column::FlatBool(v),
            RawColumn::JaggedBool(rows) => Column::jagged_flags(&rows),
        }
    }
}

/// A bound column.
///
/// Deserializes from a JSON array of numbers (flat), an array of arrays of
/// numbers (jagged), or the same shapes holding `true` / `false` (flags).
/// Flag columns bind as booleans, so `Jet_pt[Jet_isGood]` masks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawColumn")]
pub enum Column {
    /// One value per row.
    Flat(Vec<f64>),
    /// Variable-length sequence per row.
    Jagged(JaggedCol),
    /// One flag per row.
    FlatBool(Vec<bool>),
    /// Variable-length flags per row, stored as `0.0` / `1.0`.
    JaggedBool(JaggedCol),
}

impl Column {
    /// Jagged flag column from one `Vec<bool>` per row.
    pub fn jagged_flags<R: AsRef<[bool]>>(rows: &[R]) -> Column {
        let rows: Vec<Vec<f64>> =
            rows.iter().map(|r| r.as_ref().iter().map(|&b| from_bool(b)).collect()).collect();
        Column::JaggedBool(JaggedCol::from_rows(&rows))
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        match self {
            Column::Flat(v) => v.len(),
            Column::FlatBool(v) => v.len(),
            Column::Jagged(j) | Column::JaggedBool(j) => j.n_entries(),
        }
    }

    /// Rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Column {
        match self {
            Column::Flat(v) => Column::Flat(v[start..end].to_vec()),
            Column::Jagged(j) => Column::Jagged(j.slice(start, end)),
            Column::FlatBool(v) => Column::FlatBool(v[start..end].to_vec()),
            Column::JaggedBool(j) => Column::JaggedBool(j.slice(start, end)),
        }
    }

    /// Evaluator value for this column (all entries valid).
    pub fn to_value(&self) -> Value {
        let nested = |j: &JaggedCol| Jagged {
            offsets: j.offsets.clone(),
            content: Masked::dense(j.flat.clone()),
        };
        match self {
            Column::Flat(v) => Value::rows(Masked::dense(v.clone())),
            Column::Jagged(j) => Value::nested(nested(j)),
            Column::FlatBool(v) => {
                Value::rows(Masked::dense(v.iter().map(|&b| from_bool(b)).collect()))
                    .with_dtype(DType::Bool)
            }
            Column::JaggedBool(j) => Value::nested(nested(j)).with_dtype(DType::Bool),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Flat(v)
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Column::FlatBool(v)
    }
}

impl From<JaggedCol> for Column {
    fn from(j: JaggedCol) -> Self {
        Column::Jagged(j)
    }
}

/// Columnar-store contract consumed by the draw engine.
pub trait ColumnSource {
    /// Number of rows every column has.
    fn n_rows(&self) -> usize;

    /// Whether a column named `name` exists.
    fn has_column(&self, name: &str) -> bool;

    /// Fetch a column by name.
    fn column(&self, name: &str) -> Result<Column>;
}

impl<T: ColumnSource + ?Sized> ColumnSource for &T {
    fn n_rows(&self) -> usize {
        (**self).n_rows()
    }

    fn has_column(&self, name: &str) -> bool {
        (**self).has_column(name)
    }

    fn column(&self, name: &str) -> Result<Column> {
        (**self).column(name)
    }
}

/// In-memory table of named columns sharing one row count.
///
/// Deserializes from a JSON object mapping names to columns.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Column>")]
pub struct Table {
    columns: BTreeMap<String, Column>,
    n_rows: Option<usize>,
}

impl Table {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table with a fixed row count (for constant-only draws).
    pub fn with_rows(n_rows: usize) -> Self {
        Self { columns: BTreeMap::new(), n_rows: Some(n_rows) }
    }

    /// Add a column; its row count must match the columns already present.
    pub fn insert(&mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<()> {
        let name = name.into();
        let column = column.into();
        match self.n_rows {
            Some(n) if n != column.n_rows() => {
                return Err(DrawError::ShapeMismatch(format!(
                    "column '{name}' has {} rows, table has {n}",
                    column.n_rows()
                )));
            }
            _ => self.n_rows = Some(column.n_rows()),
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Builder form of [`Table::insert`].
    pub fn with(mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<Self> {
        self.insert(name, column)?;
        Ok(self)
    }

    /// Column names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Rows `[start, end)` of every column.
    pub fn slice(&self, start: usize, end: usize) -> Table {
        Table {
            columns: self.columns.iter().map(|(k, c)| (k.clone(), c.slice(start, end))).collect(),
            n_rows: Some(end - start),
        }
    }

    /// Consecutive slices of at most `rows_per_chunk` rows (at least one row each).
    pub fn chunks(&self, rows_per_chunk: usize) -> impl Iterator<Item = Table> + '_ {
        let n = ColumnSource::n_rows(self);
        let step = rows_per_chunk.max(1);
        (0..n).step_by(step).map(move |start| self.slice(start, (start + step).min(n)))
    }
}

impl TryFrom<BTreeMap<String, Column>> for Table {
    type Error = DrawError;

    fn try_from(columns: BTreeMap<String, Column>) -> Result<Self> {
        let mut table = Table::new();
        for (name, column) in columns {
            table.insert(name, column)?;
        }
        Ok(table)
    }
}

impl ColumnSource for Table {
    fn n_rows(&self) -> usize {
        self.n_rows.unwrap_or(0)
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn column(&self, name: &str) -> Result<Column> {
        self.columns.get(name).cloned().ok_or_else(|| DrawError::MissingColumn {
            name: name.to_string(),
            expr: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jagged_col_validation() {
        assert!(JaggedCol::new(vec![1.0, 2.0], vec![0, 1, 2]).is_ok());
        assert!(JaggedCol::new(vec![1.0, 2.0], vec![0, 3]).is_err());
        assert!(JaggedCol::new(vec![1.0], vec![1, 1]).is_err());
        assert!(JaggedCol::new(vec![1.0, 2.0], vec![0, 2, 1, 2]).is_err());
        assert!(JaggedCol::new(vec![], vec![]).is_err());
    }

    #[test]
    fn jagged_col_get_and_slice() {
        let j = JaggedCol::from_rows(&[vec![1.0, 2.0], vec![], vec![3.0]]);
        assert_eq!(j.n_entries(), 3);
        assert_eq!(j.get(0, 1), Some(2.0));
        assert_eq!(j.get(1, 0), None);
        let s = j.slice(1, 3);
        assert_eq!(s.offsets, vec![0, 0, 1]);
        assert_eq!(s.flat, vec![3.0]);
    }

    #[test]
    fn table_from_json() {
        let t: Table =
            serde_json::from_str(r#"{"MET_pt": [1.0, 2.0], "Jet_pt": [[3.0, 4.0], []]}"#).unwrap();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["Jet_pt", "MET_pt"]);
        assert!(matches!(t.column("Jet_pt").unwrap(), Column::Jagged(_)));
        assert!(matches!(t.column("nope"), Err(DrawError::MissingColumn { .. })));
    }

    #[test]
    fn flag_columns_bind_as_booleans() {
        let t: Table = serde_json::from_str(
            r#"{"Jet_isGood": [[true, false], []], "pass": [true, false], "n": [[], [1.0]]}"#,
        )
        .unwrap();
        let good = t.column("Jet_isGood").unwrap();
        assert_eq!(good, Column::jagged_flags(&[vec![true, false], vec![]]));
        assert_eq!(good.to_value().dtype, DType::Bool);
        assert_eq!(t.column("pass").unwrap().to_value().dtype, DType::Bool);
        assert_eq!(t.column("n").unwrap().to_value().dtype, DType::Real);
        assert_eq!(good.slice(1, 2).n_rows(), 1);
    }

    #[test]
    fn table_rejects_row_mismatch() {
        let r: std::result::Result<Table, _> =
            serde_json::from_str(r#"{"a": [1.0, 2.0], "b": [[3.0]]}"#);
        assert!(r.is_err());
        let mut t = Table::new();
        t.insert("a", vec![1.0]).unwrap();
        assert!(matches!(t.insert("b", vec![1.0, 2.0]), Err(DrawError::ShapeMismatch(_))));
    }

    #[test]
    fn table_chunks_cover_all_rows() {
        let t = Table::new()
            .with("x", vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap()
            .with("j", JaggedCol::from_rows(&[vec![1.0], vec![], vec![2.0, 3.0], vec![], vec![4.0]]))
            .unwrap();
        let chunks: Vec<Table> = t.chunks(2).collect();
        assert_eq!(chunks.iter().map(|c| c.n_rows()).collect::<Vec<_>>(), vec![2, 2, 1]);
        match chunks[1].column("j").unwrap() {
            Column::Jagged(j) => assert_eq!(j.flat, vec![2.0, 3.0]),
            _ => panic!("expected jagged"),
        }
    }
}

//! Draw engine: compile, bind, evaluate, select, flatten and align.
//!
//! A draw takes one or two value expressions (`"x"` or `"x:y"`), an optional
//! selection and an optional weight. Every output dimension and the weight
//! go through the same pipeline so that position `i` of each output array
//! refers to the same row and inner element.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::array::{Data, Jagged, Masked, Value, truthy};
use crate::column::ColumnSource;
use crate::compile::{CompileCache, CompiledExpr, split_dims};
use crate::env::{Env, Symbols};
use crate::error::{DrawError, Result};
use crate::eval::Evaluator;
use crate::histogram::{Bins, FlowPolicy, Hist1D, Hist2D, Histogram, NegativeWeightPolicy};
use crate::kernels::{JaggedKernels, NativeKernels};
use crate::refs::column_refs_expanded;
use crate::transform::Aliases;

/// Per-draw configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawOptions {
    /// X binning; automatic when absent.
    pub bins: Option<Bins>,
    /// Y binning for 2D draws; falls back to `bins`, then automatic.
    pub y_bins: Option<Bins>,
    /// Under/overflow policy.
    pub flow_policy: FlowPolicy,
    /// Negative weight policy.
    pub negative_weight_policy: NegativeWeightPolicy,
}

/// Aligned flat output of a draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawArrays {
    /// One array per dimension, all the same length.
    pub dims: Vec<Vec<f64>>,
    /// Weights aligned with `dims`, if a weight expression was given.
    pub weights: Option<Vec<f64>>,
}

impl DrawArrays {
    /// Number of drawn points.
    pub fn len(&self) -> usize {
        self.dims.first().map_or(0, Vec::len)
    }

    /// Whether nothing was drawn.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// First dimension.
    pub fn x(&self) -> &[f64] {
        self.dims.first().map_or(&[], Vec::as_slice)
    }

    /// Second dimension, for 2D draws.
    pub fn y(&self) -> Option<&[f64]> {
        self.dims.get(1).map(Vec::as_slice)
    }
}

/// A draw request compiled once, runnable against any number of sources.
#[derive(Debug, Clone)]
pub struct PreparedDraw {
    varexp: String,
    dims: Vec<Arc<CompiledExpr>>,
    selection: Option<Arc<CompiledExpr>>,
    weights: Option<Arc<CompiledExpr>>,
    /// Column name -> first expression text that reads it.
    columns: BTreeMap<String, String>,
}

impl PreparedDraw {
    /// Number of output dimensions.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Columns the draw binds, extra symbols included.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Selection mask after evaluation.
enum Selection {
    All,
    Rows(Vec<bool>),
    Elements(Jagged),
}

/// Draw engine holding aliases, extra symbols, options and a compile cache.
#[derive(Debug, Default)]
pub struct Drawer<K: JaggedKernels = NativeKernels> {
    kernels: K,
    aliases: Aliases,
    whitelist: Vec<String>,
    symbols: Symbols,
    options: DrawOptions,
    cache: CompileCache,
}

impl Drawer<NativeKernels> {
    /// Drawer with the native kernels and no aliases or symbols.
    pub fn new() -> Self {
        Self::with_kernels(NativeKernels)
    }
}

impl<K: JaggedKernels> Drawer<K> {
    /// Drawer over a specific kernel backend.
    pub fn with_kernels(kernels: K) -> Self {
        Self {
            kernels,
            aliases: Aliases::new(),
            whitelist: Vec::new(),
            symbols: Symbols::new(),
            options: DrawOptions::default(),
            cache: CompileCache::new(),
        }
    }

    /// Replace the alias table.
    pub fn with_aliases(mut self, aliases: Aliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Reserved words (`len`, `sum`, ...) to bind as columns when used as bare names.
    pub fn with_whitelist(mut self, whitelist: Vec<String>) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Replace the extra symbols.
    pub fn with_symbols(mut self, symbols: Symbols) -> Self {
        self.symbols = symbols;
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    pub fn options(&self) -> &DrawOptions {
        &self.options
    }

    /// Compile cache `(hits, misses)`.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Compile a request. Empty selection or weight text means "none".
    pub fn prepare(
        &mut self,
        varexp: &str,
        selection: Option<&str>,
        weights: Option<&str>,
    ) -> Result<PreparedDraw> {
        let texts = split_dims(varexp);
        if texts.len() > 2 {
            return Err(DrawError::Unsupported {
                expr: varexp.to_string(),
                msg: format!("at most 2 dimensions can be drawn, got {}", texts.len()),
            });
        }
        let mut dims = Vec::with_capacity(texts.len());
        for text in texts {
            dims.push(self.cache.get_or_compile(text.trim(), &self.aliases)?);
        }
        let mut optional = |text: Option<&str>| -> Result<Option<Arc<CompiledExpr>>> {
            match text.map(str::trim).filter(|t| !t.is_empty()) {
                Some(t) => Ok(Some(self.cache.get_or_compile(t, &self.aliases)?)),
                None => Ok(None),
            }
        };
        let selection = optional(selection)?;
        let weights = optional(weights)?;

        let mut columns = BTreeMap::new();
        for expr in dims.iter().chain(&selection).chain(&weights) {
            for name in column_refs_expanded(&expr.source, &self.aliases, &self.whitelist)? {
                columns.entry(name).or_insert_with(|| expr.source.clone());
            }
        }
        Ok(PreparedDraw { varexp: varexp.to_string(), dims, selection, weights, columns })
    }

    /// Columns a request would read, after alias expansion and without extra symbols.
    pub fn required_columns(
        &mut self,
        varexp: &str,
        selection: Option<&str>,
        weights: Option<&str>,
    ) -> Result<BTreeSet<String>> {
        let prepared = self.prepare(varexp, selection, weights)?;
        Ok(prepared
            .columns()
            .filter(|n| !self.symbols.contains(n))
            .map(str::to_string)
            .collect())
    }

    /// Compile and draw flat aligned arrays.
    pub fn draw_arrays<S: ColumnSource>(
        &mut self,
        source: &S,
        varexp: &str,
        selection: Option<&str>,
        weights: Option<&str>,
    ) -> Result<DrawArrays> {
        let prepared = self.prepare(varexp, selection, weights)?;
        self.run_arrays(&prepared, source)
    }

    /// Compile, draw and fill a histogram (1D or 2D by the number of dimensions).
    pub fn draw_hist<S: ColumnSource>(
        &mut self,
        source: &S,
        varexp: &str,
        selection: Option<&str>,
        weights: Option<&str>,
    ) -> Result<Histogram> {
        let arrays = self.draw_arrays(source, varexp, selection, weights)?;
        self.histogram(&arrays)
    }

    /// Fill a new histogram from drawn arrays using the configured binning.
    pub fn histogram(&self, arrays: &DrawArrays) -> Result<Histogram> {
        let x_bins = self.options.bins.clone().unwrap_or_else(|| Bins::auto(arrays.x()));
        let mut hist = match arrays.y() {
            None => Histogram::OneD(Hist1D::new(&x_bins)?),
            Some(y) => {
                let y_bins = self
                    .options
                    .y_bins
                    .clone()
                    .or_else(|| self.options.bins.clone())
                    .unwrap_or_else(|| Bins::auto(y));
                Histogram::TwoD(Hist2D::new(&x_bins, &y_bins)?)
            }
        };
        self.fill(&mut hist, arrays)?;
        Ok(hist)
    }

    /// Fill an existing histogram with drawn arrays.
    pub fn fill(&self, hist: &mut Histogram, arrays: &DrawArrays) -> Result<()> {
        hist.fill(
            &arrays.dims,
            arrays.weights.as_deref(),
            self.options.flow_policy,
            self.options.negative_weight_policy,
        )
    }

    /// Evaluate a prepared request against `source`.
    pub fn run_arrays<S: ColumnSource>(
        &self,
        prepared: &PreparedDraw,
        source: &S,
    ) -> Result<DrawArrays> {
        let n_rows = source.n_rows();
        let mut env = Env::new(n_rows, &self.symbols);
        for (name, expr) in &prepared.columns {
            if self.symbols.contains(name) {
                continue;
            }
            if !source.has_column(name) {
                return Err(DrawError::MissingColumn { name: name.clone(), expr: expr.clone() });
            }
            let column = source.column(name)?;
            if column.n_rows() != n_rows {
                return Err(DrawError::ShapeMismatch(format!(
                    "column '{name}' has {} rows, expected {n_rows}",
                    column.n_rows()
                )));
            }
            env.bind(name.as_str(), column.to_value());
        }

        let selection = match &prepared.selection {
            Some(expr) => self.selection(self.evaluate(expr, &env)?, n_rows)?,
            None => Selection::All,
        };

        let mut outputs = Vec::with_capacity(prepared.dims.len() + 1);
        for expr in prepared.dims.iter().chain(&prepared.weights) {
            let value = self.evaluate(expr, &env)?;
            outputs.push(self.finish(value, &selection, n_rows, &expr.source)?);
        }

        let len = outputs.first().map_or(0, Masked::len);
        if outputs.iter().any(|o| o.len() != len) {
            let lens: Vec<usize> = outputs.iter().map(Masked::len).collect();
            return Err(DrawError::ShapeMismatch(format!(
                "drawn arrays of '{}' do not align (lengths {lens:?})",
                prepared.varexp
            )));
        }

        let mut keep = vec![true; len];
        let mut extracted = Vec::with_capacity(outputs.len());
        for output in &outputs {
            let ex = self.kernels.extract(output);
            for &i in &ex.missing {
                keep[i] = false;
            }
            extracted.push(ex.values);
        }
        let mut columns: Vec<Vec<f64>> = extracted
            .into_iter()
            .map(|values| values.into_iter().zip(&keep).filter(|(_, k)| **k).map(|(v, _)| v).collect())
            .collect();
        let weights = if prepared.weights.is_some() { columns.pop() } else { None };
        log::debug!(
            "drew '{}': {n_rows} rows -> {} points ({} dropped as missing)",
            prepared.varexp,
            keep.iter().filter(|k| **k).count(),
            keep.iter().filter(|k| !**k).count()
        );
        Ok(DrawArrays { dims: columns, weights })
    }

    fn evaluate(&self, expr: &CompiledExpr, env: &Env<'_>) -> Result<Value> {
        Evaluator::new(&self.kernels, env, &expr.source).eval(&expr.plan)
    }

    fn selection(&self, value: Value, n_rows: usize) -> Result<Selection> {
        Ok(match value.data {
            Data::Scalar(v) => Selection::Rows(vec![truthy(v); n_rows]),
            Data::Rows(m) => {
                if m.len() != n_rows {
                    return Err(DrawError::ShapeMismatch(format!(
                        "selection has {} rows, expected {n_rows}",
                        m.len()
                    )));
                }
                Selection::Rows(m.iter().map(|v| v.is_some_and(truthy)).collect())
            }
            Data::Nested(j) => Selection::Elements(j),
        })
    }

    /// Broadcast, select and flatten one evaluated output.
    fn finish(&self, value: Value, selection: &Selection, n_rows: usize, source: &str) -> Result<Masked> {
        let unreduced = || {
            DrawError::ShapeMismatch(format!(
                "selection is not reduced to one value per row, but '{source}' is"
            ))
        };
        match value.data {
            Data::Scalar(v) => match selection {
                Selection::All => Ok(Masked::dense(vec![v; n_rows])),
                Selection::Rows(keep) => Ok(Masked::dense(vec![v; keep.iter().filter(|k| **k).count()])),
                Selection::Elements(_) => Err(unreduced()),
            },
            Data::Rows(m) => {
                if m.len() != n_rows {
                    return Err(DrawError::ShapeMismatch(format!(
                        "'{source}' has {} rows, expected {n_rows}",
                        m.len()
                    )));
                }
                match selection {
                    Selection::All => Ok(m),
                    Selection::Rows(keep) => Ok(m.filter(keep)),
                    Selection::Elements(_) => Err(unreduced()),
                }
            }
            Data::Nested(j) => {
                if j.n_rows() != n_rows {
                    return Err(DrawError::ShapeMismatch(format!(
                        "'{source}' has {} rows, expected {n_rows}",
                        j.n_rows()
                    )));
                }
                let selected = match selection {
                    Selection::All => j,
                    Selection::Rows(keep) => j.filter_rows(keep),
                    Selection::Elements(mask) => self.kernels.mask(&j, mask)?,
                };
                Ok(self.kernels.flatten(&selected))
            }
        }
    }
}

/// One-shot draw with the native kernels and default options.
///
/// ```
/// use ns_draw::column::{JaggedCol, Table};
///
/// let table = Table::new()
///     .with("Jet_pt", JaggedCol::from_rows(&[vec![42.0, 15.0], vec![], vec![11.5]]))
///     .unwrap();
/// let out = ns_draw::draw(&table, "Jet_pt[0]", None, None).unwrap();
/// assert_eq!(out.dims, vec![vec![42.0, 11.5]]);
/// ```
pub fn draw<S: ColumnSource>(
    source: &S,
    varexp: &str,
    selection: Option<&str>,
    weights: Option<&str>,
) -> Result<DrawArrays> {
    Drawer::new().draw_arrays(source, varexp, selection, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{JaggedCol, Table};

    fn table() -> Table {
        Table::new()
            .with("a", vec![0.1, 0.4, 0.7, 0.2])
            .unwrap()
            .with("b", vec![0.3, 0.2, 0.9, 0.6])
            .unwrap()
            .with("j", JaggedCol::from_rows(&[vec![1.0, 2.0], vec![], vec![3.0], vec![4.0, 5.0]]))
            .unwrap()
    }

    #[test]
    fn constant_broadcasts_to_rows() {
        let out = draw(&table(), "10", None, None).unwrap();
        assert_eq!(out.dims, vec![vec![10.0; 4]]);
        let out = draw(&table(), "10", Some("a > 0.15"), None).unwrap();
        assert_eq!(out.x(), &[10.0, 10.0, 10.0]);
    }

    #[test]
    fn empty_selection_text_is_none() {
        let out = draw(&table(), "a", Some("  "), Some("")).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.weights.is_none());
    }

    #[test]
    fn flat_selection() {
        let out = draw(&table(), "a + b", Some("(a < b) and (a < 0.5)"), None).unwrap();
        assert_eq!(out.dims.len(), 1);
        assert_eq!(out.x().len(), 2);
        assert!((out.x()[0] - 0.4).abs() < 1e-12);
        assert!((out.x()[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn jagged_2d_with_flat_is_shape_mismatch() {
        let r = draw(&table(), "j:a", None, None);
        assert!(matches!(r, Err(DrawError::ShapeMismatch(_))));
    }

    #[test]
    fn nested_selection_on_flat_value_is_shape_mismatch() {
        let r = draw(&table(), "a", Some("j > 1"), None);
        assert!(matches!(r, Err(DrawError::ShapeMismatch(_))));
    }

    #[test]
    fn three_dims_unsupported() {
        assert!(matches!(draw(&table(), "a:b:a", None, None), Err(DrawError::Unsupported { .. })));
    }

    #[test]
    fn missing_column_names_expression() {
        match draw(&table(), "a", Some("c > 1"), None) {
            Err(DrawError::MissingColumn { name, expr }) => {
                assert_eq!(name, "c");
                assert_eq!(expr, "c > 1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn required_columns_skip_symbols_and_expand_aliases() {
        let mut aliases = Aliases::new();
        aliases.insert("ratio".into(), "a / b".into());
        let mut drawer = Drawer::new()
            .with_aliases(aliases)
            .with_symbols(Symbols::new().with_constant("k", 2.0));
        let cols = drawer.required_columns("ratio * k", Some("sum(j) > 1"), None).unwrap();
        assert_eq!(cols.into_iter().collect::<Vec<_>>(), vec!["a", "b", "j"]);
    }

    #[test]
    fn whitelist_applies_to_aliases_and_binding() {
        let mut aliases = Aliases::new();
        aliases.insert("scaled".into(), "len * a".into());
        let table = table().with("len", vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        let mut drawer = Drawer::new().with_aliases(aliases.clone());
        let cols = drawer.required_columns("scaled", None, None).unwrap();
        assert_eq!(cols.into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert!(matches!(
            drawer.draw_arrays(&table, "scaled", None, None),
            Err(DrawError::MissingColumn { .. })
        ));

        let mut drawer =
            Drawer::new().with_aliases(aliases).with_whitelist(vec!["len".to_string()]);
        let cols = drawer.required_columns("scaled", None, None).unwrap();
        assert_eq!(cols.into_iter().collect::<Vec<_>>(), vec!["a", "len"]);
        let out = drawer.draw_arrays(&table, "scaled", None, None).unwrap();
        assert_eq!(out.x().len(), 4);
        assert!((out.x()[3] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn prepared_draw_reuses_compiles() {
        let mut drawer = Drawer::new();
        let t = table();
        drawer.draw_arrays(&t, "a:b", Some("a > 0"), None).unwrap();
        drawer.draw_arrays(&t, "a:b", Some("a > 0"), None).unwrap();
        assert_eq!(drawer.cache_stats(), (3, 3));
    }

    #[test]
    fn histogram_uses_configured_bins() {
        let mut drawer = Drawer::new().with_options(DrawOptions {
            bins: Some("5,0,5".parse().unwrap()),
            ..DrawOptions::default()
        });
        let h = drawer.draw_hist(&table(), "j", None, None).unwrap();
        match h {
            Histogram::OneD(h) => {
                // 5.0 lands in the last bin, which is closed on the right
                assert_eq!(h.counts, vec![0.0, 1.0, 1.0, 1.0, 2.0]);
                assert_eq!(h.overflow, 0.0);
            }
            other => panic!("expected 1D, got {other:?}"),
        }
    }

    #[test]
    fn auto_binned_constant_column() {
        let table = Table::new().with("t", vec![1e17; 3]).unwrap();
        let h = Drawer::new().draw_hist(&table, "t", None, None).unwrap();
        match h {
            Histogram::OneD(h) => {
                assert_eq!(h.integral(), 3.0);
                assert_eq!(h.underflow + h.overflow, 0.0);
            }
            other => panic!("expected 1D, got {other:?}"),
        }
    }

    #[test]
    fn options_from_json() {
        let o: DrawOptions = serde_json::from_str(
            r#"{"bins": {"uniform": {"n": 10, "lo": 0.0, "hi": 1.0}}, "flow_policy": "fold"}"#,
        )
        .unwrap();
        assert_eq!(o.flow_policy, FlowPolicy::Fold);
        assert_eq!(o.negative_weight_policy, NegativeWeightPolicy::Allow);
        assert!(o.y_bins.is_none());
    }
}

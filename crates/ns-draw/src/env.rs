//! Evaluation environment: bound columns plus caller-supplied symbols.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::array::Value;
use crate::error::Result;

/// Caller-supplied function callable from an expression as `name(args...)`.
pub type ExternalFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Extra symbols: named values and functions that shadow columns.
#[derive(Clone, Default)]
pub struct Symbols {
    values: HashMap<String, Value>,
    functions: HashMap<String, ExternalFn>,
}

impl Symbols {
    /// No symbols.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named value.
    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Bind a named numeric constant.
    pub fn with_constant(self, name: impl Into<String>, value: f64) -> Self {
        self.with_value(name, Value::scalar(value))
    }

    /// Bind a named function.
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    /// Named value, if bound.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Named function, if bound.
    pub fn function(&self, name: &str) -> Option<&ExternalFn> {
        self.functions.get(name)
    }

    /// Whether `name` is bound as a value or a function.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.functions.contains_key(name)
    }
}

impl fmt::Debug for Symbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fns: Vec<&String> = self.functions.keys().collect();
        fns.sort();
        f.debug_struct("Symbols")
            .field("values", &self.values)
            .field("functions", &fns)
            .finish()
    }
}

/// Per-evaluation bindings. Built fresh for every draw.
#[derive(Debug)]
pub struct Env<'a> {
    n_rows: usize,
    columns: HashMap<String, Value>,
    symbols: &'a Symbols,
}

impl<'a> Env<'a> {
    /// Environment over `n_rows` rows with the given extra symbols.
    pub fn new(n_rows: usize, symbols: &'a Symbols) -> Self {
        Self { n_rows, columns: HashMap::new(), symbols }
    }

    /// Bind a column value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.columns.insert(name.into(), value);
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Resolve a name: extra symbols first, then columns.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.symbols.value(name).or_else(|| self.columns.get(name))
    }

    /// Resolve a caller-supplied function.
    pub fn function(&self, name: &str) -> Option<&ExternalFn> {
        self.symbols.function(name)
    }
}

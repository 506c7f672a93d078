//! Compiler driver: parse → transform → [`CompiledExpr`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast;
use crate::error::Result;
use crate::plan::Node;
use crate::transform::{Aliases, Transformer};

/// A compiled expression ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    /// Expression text as given by the caller.
    pub source: String,
    /// Array plan.
    pub plan: Node,
    /// Reductions introduced by the transformer (advisory).
    pub reductions: usize,
}

impl CompiledExpr {
    /// Parse and compile an expression without aliases.
    pub fn compile(input: &str) -> Result<Self> {
        Self::compile_with_aliases(input, &Aliases::new())
    }

    /// Parse and compile an expression, substituting bare names found in `aliases`.
    pub fn compile_with_aliases(input: &str, aliases: &Aliases) -> Result<Self> {
        let ast = ast::parse(input)?;
        let mut transformer = Transformer::new(aliases);
        let plan = transformer.transform(input, &ast)?;
        log::debug!("compiled '{input}' -> {plan}");
        Ok(CompiledExpr {
            source: input.to_string(),
            plan,
            reductions: transformer.reductions(),
        })
    }

    /// Names the plan reads (columns or extra symbols), after alias expansion.
    pub fn required_names(&self) -> Vec<String> {
        self.plan.names()
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plan)
    }
}

/// Split a 2D draw expression `"A:B"` at the first colon outside any brackets
/// and parentheses.
///
/// Brackets and parentheses are tracked separately since slices use `:` too.
/// Returns `(expr, None)` when there is no free colon.
///
/// ```
/// use ns_draw::compile::split_on_free_colon;
/// assert_eq!(
///     split_on_free_colon("sum(Jet_pt[:2]):Jet_eta"),
///     ("sum(Jet_pt[:2])", Some("Jet_eta"))
/// );
/// assert_eq!(split_on_free_colon("Jet_pt[1:]"), ("Jet_pt[1:]", None));
/// ```
pub fn split_on_free_colon(expr: &str) -> (&str, Option<&str>) {
    let mut brackets: i32 = 0;
    let mut parens: i32 = 0;
    for (i, b) in expr.bytes().enumerate() {
        match b {
            b'[' => brackets += 1,
            b']' => brackets -= 1,
            b'(' => parens += 1,
            b')' => parens -= 1,
            b':' if brackets == 0 && parens == 0 => {
                return (&expr[..i], Some(&expr[i + 1..]));
            }
            _ => {}
        }
    }
    (expr, None)
}

/// Split a draw expression into its dimension expressions (`"x"`, `"x:y"`, ...).
pub fn split_dims(expr: &str) -> Vec<&str> {
    let mut dims = Vec::new();
    let mut rest = expr;
    loop {
        match split_on_free_colon(rest) {
            (head, Some(tail)) => {
                dims.push(head);
                rest = tail;
            }
            (head, None) => {
                dims.push(head);
                return dims;
            }
        }
    }
}

/// Memoizes compiled expressions by `(text, aliases)`.
///
/// Entries are dropped whenever a lookup arrives with a different alias table.
#[derive(Debug, Default)]
pub struct CompileCache {
    aliases: Aliases,
    entries: HashMap<String, Arc<CompiledExpr>>,
    hits: u64,
    misses: u64,
}

impl CompileCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached compile of `input` under `aliases`.
    pub fn get_or_compile(&mut self, input: &str, aliases: &Aliases) -> Result<Arc<CompiledExpr>> {
        if &self.aliases != aliases {
            self.entries.clear();
            self.aliases = aliases.clone();
        }
        if let Some(hit) = self.entries.get(input) {
            self.hits += 1;
            return Ok(Arc::clone(hit));
        }
        self.misses += 1;
        let compiled = Arc::new(CompiledExpr::compile_with_aliases(input, aliases)?);
        self.entries.insert(input.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Number of cached expressions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

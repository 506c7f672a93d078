//! Plan interpreter.
//!
//! Walks a [`Node`] tree against an [`Env`], broadcasting scalars over rows
//! and per-row values over inner elements. A missing operand makes the
//! result missing; nothing is dropped here.

use crate::array::{DType, Data, Jagged, Masked, Value, from_bool, truthy};
use crate::env::Env;
use crate::error::{DrawError, Result};
use crate::kernels::{JaggedKernels, PadMode};
use crate::plan::{BinaryOp, MathFn, Node, Position, Reducer, UnaryOp};

/// Evaluates plans for one expression text (used in error messages).
pub struct Evaluator<'a, K: JaggedKernels> {
    kernels: &'a K,
    env: &'a Env<'a>,
    source: &'a str,
}

impl<'a, K: JaggedKernels> Evaluator<'a, K> {
    /// Evaluator over `env`; `source` is the expression text the plan came from.
    pub fn new(kernels: &'a K, env: &'a Env<'a>, source: &'a str) -> Self {
        Self { kernels, env, source }
    }

    /// Evaluate a plan node.
    pub fn eval(&self, node: &Node) -> Result<Value> {
        match node {
            Node::Const(v) => Ok(Value::scalar(*v)),
            Node::Bool(b) => Ok(Value::scalar(from_bool(*b)).with_dtype(DType::Bool)),
            Node::Name(name) => {
                self.env.lookup(name).cloned().ok_or_else(|| self.missing(name))
            }
            Node::Unary(op, arg) => {
                let v = self.eval(arg)?;
                Ok(match op {
                    UnaryOp::Neg => map_value(&v, |x| -x),
                    UnaryOp::Pos => v,
                    UnaryOp::Invert => {
                        map_value(&v, |x| from_bool(!truthy(x))).with_dtype(DType::Bool)
                    }
                })
            }
            Node::Binary(op, a, b) => apply_binary(*op, &self.eval(a)?, &self.eval(b)?),
            Node::Reduce { reducer, arg, keepdims } => {
                let v = self.eval(arg)?;
                let jagged = self.expect_nested(&v, reducer.name())?;
                let reduced = self.kernels.reduce(jagged, *reducer);
                let dtype = match reducer {
                    Reducer::ArgMin | Reducer::ArgMax => DType::Index,
                    Reducer::Min | Reducer::Max => v.dtype,
                    Reducer::Sum | Reducer::Mean => DType::Real,
                };
                let data = if *keepdims {
                    Data::Nested(Jagged::singletons(reduced))
                } else {
                    Data::Rows(reduced)
                };
                Ok(Value { data, dtype })
            }
            Node::Count(arg) => {
                let v = self.eval(arg)?;
                let jagged = self.expect_nested(&v, "length")?;
                Ok(Value::rows(self.kernels.count(jagged)))
            }
            Node::Math(func, args) => self.eval_math(*func, args),
            Node::PadIndex { base, position, .. } => {
                let v = self.eval(base)?;
                let jagged = self.expect_nested(&v, "index")?;
                // Positions past a row's end already read as missing; nothing to materialize.
                let picked = match position {
                    Position::At(i) => jagged.take_position(|_| Some(*i)),
                    Position::Last => jagged.take_position(|len| len.checked_sub(1)),
                };
                Ok(Value { data: Data::Rows(picked), dtype: v.dtype })
            }
            Node::PadSlice { base, pad, start, stop } => {
                let v = self.eval(base)?;
                let jagged = self.expect_nested(&v, "slice")?;
                let target = (*pad).min(jagged.max_row_len());
                let padded = self.kernels.pad(jagged, target, PadMode::Extend);
                Ok(Value { data: Data::Nested(padded.slice_rows(*start, *stop)), dtype: v.dtype })
            }
            Node::Subscript { base, selector } => {
                self.subscript(self.eval(base)?, self.eval(selector)?)
            }
            Node::External { name, args } => {
                let f = self.env.function(name).ok_or_else(|| self.missing(name))?;
                let values = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>>>()?;
                f(&values)
            }
        }
    }

    fn missing(&self, name: &str) -> DrawError {
        DrawError::MissingColumn { name: name.to_string(), expr: self.source.to_string() }
    }

    fn expect_nested<'v>(&self, v: &'v Value, what: &str) -> Result<&'v Jagged> {
        match &v.data {
            Data::Nested(j) => Ok(j),
            Data::Rows(_) => Err(DrawError::ShapeMismatch(format!(
                "'{what}' needs a nested value but got one value per row in '{}'",
                self.source
            ))),
            Data::Scalar(_) => Err(DrawError::ShapeMismatch(format!(
                "'{what}' needs a nested value but got a scalar in '{}'",
                self.source
            ))),
        }
    }

    fn eval_math(&self, func: MathFn, args: &[Node]) -> Result<Value> {
        match args {
            [a] => Ok(map_value(&self.eval(a)?, |x| func.apply(x, f64::NAN))),
            [a, b] => {
                let data = combine(&self.eval(a)?.data, &self.eval(b)?.data, |x, y| func.apply(x, y))?;
                Ok(Value { data, dtype: DType::Real })
            }
            _ => Err(DrawError::Unsupported {
                expr: self.source.to_string(),
                msg: format!("math function takes {} argument(s), got {}", func.arity(), args.len()),
            }),
        }
    }

    // ── Subscripts ─────────────────────────────────────────────

    fn subscript(&self, base: Value, selector: Value) -> Result<Value> {
        let dtype = base.dtype;
        let Data::Nested(jagged) = &base.data else {
            return Err(DrawError::ShapeMismatch(format!(
                "only nested values can be subscripted in '{}'",
                self.source
            )));
        };
        let data = match (&selector.data, selector.dtype) {
            (Data::Nested(mask), DType::Bool) => Data::Nested(self.kernels.mask(jagged, mask)?),
            (Data::Nested(index), _) => Data::Nested(self.gather(jagged, index)?),
            (Data::Rows(_) | Data::Scalar(_), DType::Bool) => {
                return Err(DrawError::ShapeMismatch(format!(
                    "a per-row boolean cannot mask a nested value in '{}'; \
                     use the selection expression instead",
                    self.source
                )));
            }
            (Data::Rows(index), _) => {
                if index.len() != jagged.n_rows() {
                    return Err(self.row_mismatch(index.len(), jagged.n_rows()));
                }
                Data::Rows(Masked::from_options((0..jagged.n_rows()).map(|row| {
                    index.get(row).and_then(|i| element(jagged, row, i))
                })))
            }
            (Data::Scalar(i), _) => {
                let i = *i;
                Data::Rows(Masked::from_options(
                    (0..jagged.n_rows()).map(|row| element(jagged, row, i)),
                ))
            }
        };
        Ok(Value { data, dtype })
    }

    /// Per-row gather: each selector element picks a position in the same row of `base`.
    fn gather(&self, base: &Jagged, index: &Jagged) -> Result<Jagged> {
        if index.n_rows() != base.n_rows() {
            return Err(self.row_mismatch(index.n_rows(), base.n_rows()));
        }
        Ok(Jagged::from_rows((0..index.n_rows()).map(|row| {
            index
                .row_range(row)
                .map(|k| index.content.get(k).and_then(|i| element(base, row, i)))
                .collect()
        })))
    }

    fn row_mismatch(&self, got: usize, want: usize) -> DrawError {
        DrawError::ShapeMismatch(format!(
            "subscript has {got} rows but the subscripted value has {want} in '{}'",
            self.source
        ))
    }
}

/// Element at a dynamic position; non-integral, negative or out-of-range positions are missing.
fn element(jagged: &Jagged, row: usize, position: f64) -> Option<f64> {
    if position.fract() != 0.0 || position < 0.0 {
        return None;
    }
    let i = position as usize;
    if i < jagged.row_len(row) { jagged.content.get(jagged.offsets[row] + i) } else { None }
}

// ── Elementwise helpers ────────────────────────────────────────

fn map_masked(m: &Masked, f: impl Fn(f64) -> f64) -> Masked {
    Masked { values: m.values.iter().map(|&x| f(x)).collect(), valid: m.valid.clone() }
}

/// Apply `f` to every element, keeping shape and validity. The result is `Real`.
pub fn map_value(v: &Value, f: impl Fn(f64) -> f64) -> Value {
    let data = match &v.data {
        Data::Scalar(x) => Data::Scalar(f(*x)),
        Data::Rows(m) => Data::Rows(map_masked(m, f)),
        Data::Nested(j) => {
            Data::Nested(Jagged { offsets: j.offsets.clone(), content: map_masked(&j.content, f) })
        }
    };
    Value { data, dtype: DType::Real }
}

fn zip_masked(a: &Masked, b: &Masked, f: impl Fn(f64, f64) -> f64) -> Masked {
    let values = a.values.iter().zip(&b.values).map(|(&x, &y)| f(x, y)).collect();
    let valid = match (&a.valid, &b.valid) {
        (None, None) => None,
        (Some(v), None) | (None, Some(v)) => Some(v.clone()),
        (Some(va), Some(vb)) => Some(va.iter().zip(vb).map(|(&x, &y)| x && y).collect()),
    };
    Masked { values, valid }
}

/// Repeat each per-row entry of `rows` once per inner element of `like`.
fn broadcast_rows(rows: &Masked, like: &Jagged) -> Masked {
    let mut values = Vec::with_capacity(like.content.len());
    let mut valid = Vec::with_capacity(like.content.len());
    for row in 0..like.n_rows() {
        let n = like.row_len(row);
        values.extend(std::iter::repeat_n(rows.values[row], n));
        valid.extend(std::iter::repeat_n(rows.is_valid(row), n));
    }
    Masked::with_validity(values, valid)
}

fn combine(a: &Data, b: &Data, f: impl Fn(f64, f64) -> f64) -> Result<Data> {
    let rows_mismatch = |x: usize, y: usize| {
        DrawError::ShapeMismatch(format!("cannot combine values with {x} and {y} rows"))
    };
    Ok(match (a, b) {
        (Data::Scalar(x), Data::Scalar(y)) => Data::Scalar(f(*x, *y)),
        (Data::Scalar(x), Data::Rows(m)) => Data::Rows(map_masked(m, |y| f(*x, y))),
        (Data::Rows(m), Data::Scalar(y)) => Data::Rows(map_masked(m, |x| f(x, *y))),
        (Data::Scalar(x), Data::Nested(j)) => Data::Nested(Jagged {
            offsets: j.offsets.clone(),
            content: map_masked(&j.content, |y| f(*x, y)),
        }),
        (Data::Nested(j), Data::Scalar(y)) => Data::Nested(Jagged {
            offsets: j.offsets.clone(),
            content: map_masked(&j.content, |x| f(x, *y)),
        }),
        (Data::Rows(m), Data::Rows(n)) => {
            if m.len() != n.len() {
                return Err(rows_mismatch(m.len(), n.len()));
            }
            Data::Rows(zip_masked(m, n, f))
        }
        (Data::Rows(m), Data::Nested(j)) => {
            if m.len() != j.n_rows() {
                return Err(rows_mismatch(m.len(), j.n_rows()));
            }
            Data::Nested(Jagged {
                offsets: j.offsets.clone(),
                content: zip_masked(&broadcast_rows(m, j), &j.content, f),
            })
        }
        (Data::Nested(j), Data::Rows(m)) => {
            if m.len() != j.n_rows() {
                return Err(rows_mismatch(j.n_rows(), m.len()));
            }
            Data::Nested(Jagged {
                offsets: j.offsets.clone(),
                content: zip_masked(&j.content, &broadcast_rows(m, j), f),
            })
        }
        (Data::Nested(x), Data::Nested(y)) => {
            if !x.same_shape(y) {
                return Err(DrawError::ShapeMismatch(format!(
                    "nested values have different row lengths ({} vs {} elements)",
                    x.content.len(),
                    y.content.len()
                )));
            }
            Data::Nested(Jagged { offsets: x.offsets.clone(), content: zip_masked(&x.content, &y.content, f) })
        }
    })
}

fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

fn binary_fn(op: BinaryOp) -> fn(f64, f64) -> f64 {
    match op {
        BinaryOp::Add => |a, b| a + b,
        BinaryOp::Sub => |a, b| a - b,
        BinaryOp::Mul => |a, b| a * b,
        BinaryOp::Div => |a, b| a / b,
        BinaryOp::FloorDiv => |a, b| (a / b).floor(),
        BinaryOp::Mod => floored_mod,
        BinaryOp::Pow => f64::powf,
        BinaryOp::Eq => |a, b| from_bool(a == b),
        BinaryOp::Ne => |a, b| from_bool(a != b),
        BinaryOp::Lt => |a, b| from_bool(a < b),
        BinaryOp::Le => |a, b| from_bool(a <= b),
        BinaryOp::Gt => |a, b| from_bool(a > b),
        BinaryOp::Ge => |a, b| from_bool(a >= b),
        BinaryOp::BitAnd => |a, b| from_bool(truthy(a) && truthy(b)),
        BinaryOp::BitOr => |a, b| from_bool(truthy(a) || truthy(b)),
        BinaryOp::BitXor => |a, b| from_bool(truthy(a) != truthy(b)),
        BinaryOp::Minimum => f64::min,
        BinaryOp::Maximum => f64::max,
    }
}

/// Elementwise binary operation with scalar/row/element broadcasting.
///
/// Also the building block for caller-supplied functions:
///
/// ```
/// use ns_draw::array::Value;
/// use ns_draw::eval::apply_binary;
/// use ns_draw::plan::BinaryOp;
///
/// let sum = apply_binary(BinaryOp::Add, &Value::scalar(1.0), &Value::scalar(2.0)).unwrap();
/// assert_eq!(sum, Value::scalar(3.0));
/// ```
pub fn apply_binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    let data = combine(&a.data, &b.data, binary_fn(op))?;
    let dtype = if op.is_boolean() { DType::Bool } else { DType::Real };
    Ok(Value { data, dtype })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompiledExpr;
    use crate::env::Symbols;
    use crate::kernels::NativeKernels;

    fn env(symbols: &Symbols) -> Env<'_> {
        let mut env = Env::new(4, symbols);
        env.bind(
            "Jet_pt",
            Value::nested(Jagged::from_rows(vec![
                vec![Some(42.0), Some(15.0), Some(10.5)],
                vec![],
                vec![Some(11.5)],
                vec![Some(50.0), Some(5.0)],
            ])),
        );
        env.bind(
            "Jet_eta",
            Value::nested(Jagged::from_rows(vec![
                vec![Some(-2.2), Some(0.4), Some(0.5)],
                vec![],
                vec![Some(1.5)],
                vec![Some(-0.1), Some(-3.0)],
            ])),
        );
        env.bind("MET_pt", Value::rows(Masked::dense(vec![46.5, 30.0, 82.0, 8.9])));
        env
    }

    fn eval(expr: &str) -> Result<Value> {
        let symbols = Symbols::new();
        let env = env(&symbols);
        let compiled = CompiledExpr::compile(expr)?;
        Evaluator::new(&NativeKernels, &env, expr).eval(&compiled.plan)
    }

    fn rows(expr: &str) -> Vec<Option<f64>> {
        match eval(expr).unwrap().data {
            Data::Rows(m) => m.iter().collect(),
            other => panic!("expected rows for '{expr}', got {other:?}"),
        }
    }

    fn nested(expr: &str) -> Vec<Vec<Option<f64>>> {
        match eval(expr).unwrap().data {
            Data::Nested(j) => j.to_rows(),
            other => panic!("expected nested for '{expr}', got {other:?}"),
        }
    }

    #[test]
    fn scalar_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::scalar(7.0));
        assert_eq!(eval("-7 % 3").unwrap(), Value::scalar(2.0));
        assert_eq!(eval("7 // 2").unwrap(), Value::scalar(3.0));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::scalar(512.0));
    }

    #[test]
    fn row_broadcast_into_elements() {
        assert_eq!(
            nested("Jet_pt > MET_pt / 2"),
            vec![
                vec![Some(1.0), Some(0.0), Some(0.0)],
                vec![],
                vec![Some(0.0)],
                vec![Some(1.0), Some(1.0)],
            ]
        );
    }

    #[test]
    fn comparison_is_bool_typed() {
        assert_eq!(eval("MET_pt > 40").unwrap().dtype, DType::Bool);
        assert_eq!(eval("MET_pt + 1").unwrap().dtype, DType::Real);
        assert_eq!(eval("argmin(Jet_pt)").unwrap().dtype, DType::Index);
    }

    #[test]
    fn index_past_end_is_missing() {
        assert_eq!(rows("Jet_pt[1]"), vec![Some(15.0), None, None, Some(5.0)]);
        assert_eq!(rows("Jet_pt[-1]"), vec![Some(10.5), None, Some(11.5), Some(5.0)]);
    }

    #[test]
    fn slice_after_pad() {
        assert_eq!(
            nested("Jet_pt[1:3]"),
            vec![vec![Some(15.0), Some(10.5)], vec![None, None], vec![None, None], vec![Some(5.0), None]]
        );
    }

    #[test]
    fn slice_padding_stops_at_longest_row() {
        assert_eq!(
            nested("Jet_pt[1:5]"),
            vec![vec![Some(15.0), Some(10.5)], vec![None, None], vec![None, None], vec![Some(5.0), None]]
        );
    }

    #[test]
    fn mask_then_index() {
        assert_eq!(rows("Jet_pt[Jet_pt > 12][1]"), vec![Some(15.0), None, None, None]);
    }

    #[test]
    fn gather_with_argmax() {
        assert_eq!(
            nested("Jet_eta[argmax(Jet_pt)]"),
            vec![vec![Some(-2.2)], vec![None], vec![Some(1.5)], vec![Some(-0.1)]]
        );
    }

    #[test]
    fn dynamic_row_index() {
        assert_eq!(rows("Jet_pt[length(Jet_pt) - 1]"), vec![Some(10.5), None, Some(11.5), Some(5.0)]);
    }

    #[test]
    fn missing_propagates_through_arithmetic() {
        assert_eq!(rows("min(Jet_pt) + MET_pt"), vec![Some(57.0), None, Some(93.5), Some(13.9)]);
    }

    #[test]
    fn reduce_of_rows_is_shape_mismatch() {
        assert!(matches!(eval("sum(MET_pt)"), Err(DrawError::ShapeMismatch(_))));
        assert!(matches!(eval("MET_pt[0]"), Err(DrawError::ShapeMismatch(_))));
        assert!(matches!(eval("Jet_pt[MET_pt > 40]"), Err(DrawError::ShapeMismatch(_))));
    }

    #[test]
    fn unknown_names() {
        match eval("nope + 1") {
            Err(DrawError::MissingColumn { name, expr }) => {
                assert_eq!(name, "nope");
                assert_eq!(expr, "nope + 1");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(eval("myfunc(MET_pt)"), Err(DrawError::MissingColumn { .. })));
    }

    #[test]
    fn external_function() {
        let symbols = Symbols::new()
            .with_function("twice", |args: &[Value]| Ok(map_value(&args[0], |x| 2.0 * x)));
        let env = env(&symbols);
        let compiled = CompiledExpr::compile("twice(MET_pt)").unwrap();
        let v = Evaluator::new(&NativeKernels, &env, "twice(MET_pt)").eval(&compiled.plan).unwrap();
        assert_eq!(v.data, Data::Rows(Masked::dense(vec![93.0, 60.0, 164.0, 17.8])));
    }

    #[test]
    fn nested_shape_mismatch() {
        let a = Value::nested(Jagged::from_rows(vec![vec![Some(1.0)]]));
        let b = Value::nested(Jagged::from_rows(vec![vec![Some(1.0), Some(2.0)]]));
        assert!(matches!(apply_binary(BinaryOp::Add, &a, &b), Err(DrawError::ShapeMismatch(_))));
    }
}

//! Rewrites a parsed expression into an array [`Node`] plan.
//!
//! - `and` / `or` / `not` become elementwise `&` / `|` / `~`.
//! - `a < b < c` becomes `(a < b) & (b < c)` for any chain length.
//! - One-argument `min, max, sum, mean, argmin, argmax` reduce the innermost
//!   axis; `length` / `len` count; two-argument `min` / `max` are elementwise.
//! - `x[i]`, `x[-1]` and `x[a:b]` with literal bounds pad short rows with
//!   missing markers before selecting, so they never fail on short rows.
//! - Any other subscript is resolved at runtime (mask or gather).
//! - Names found in the alias table are replaced by their own transformed plan.

use std::collections::BTreeMap;

use crate::ast::{self, BoolOpKind, CmpOp, Constant, Expr, ExprKind, Operator, Slice, UnaryOpKind};
use crate::error::Result;
use crate::lexer::unsupported_err;
use crate::plan::{BinaryOp, MathFn, Node, Position, Reducer, UnaryOp};

/// Alias table: name → expression text.
pub type Aliases = BTreeMap<String, String>;

/// Per-call transformer state.
///
/// Holds the alias table, the alias expansion stack (for cycle detection) and
/// the number of reductions introduced so far. Create one per compile.
#[derive(Debug)]
pub struct Transformer<'a> {
    aliases: &'a Aliases,
    expanding: Vec<String>,
    reductions: usize,
}

impl<'a> Transformer<'a> {
    /// New transformer resolving bare names through `aliases`.
    pub fn new(aliases: &'a Aliases) -> Self {
        Self { aliases, expanding: Vec::new(), reductions: 0 }
    }

    /// Reductions (including counts) introduced so far. Advisory only.
    pub fn reductions(&self) -> usize {
        self.reductions
    }

    /// Transform `expr`, parsed from `input` (used for error messages).
    pub fn transform(&mut self, input: &str, expr: &Expr) -> Result<Node> {
        match &expr.kind {
            ExprKind::Constant(c) => match c {
                Constant::Int(n) => Ok(Node::Const(*n as f64)),
                Constant::Float(v) => Ok(Node::Const(*v)),
                Constant::Bool(b) => Ok(Node::Bool(*b)),
                Constant::Str(_) => {
                    Err(unsupported_err(input, expr.span, "string literals are not supported"))
                }
            },
            ExprKind::Name(name) => self.transform_name(input, expr, name),
            ExprKind::Attribute { .. } => Err(unsupported_err(
                input,
                expr.span,
                "attribute access is only supported as a call target (e.g. np.exp(x))",
            )),
            ExprKind::BoolOp { op, values } => {
                let op = match op {
                    BoolOpKind::And => BinaryOp::BitAnd,
                    BoolOpKind::Or => BinaryOp::BitOr,
                };
                let mut iter = values.iter();
                let Some(first) = iter.next() else {
                    return Err(unsupported_err(input, expr.span, "empty boolean operation"));
                };
                let mut acc = self.transform(input, first)?;
                for v in iter {
                    let rhs = self.transform(input, v)?;
                    acc = Node::Binary(op, Box::new(acc), Box::new(rhs));
                }
                Ok(acc)
            }
            ExprKind::UnaryOp { op, operand } => {
                let inner = self.transform(input, operand)?;
                Ok(match op {
                    UnaryOpKind::Not | UnaryOpKind::Invert => {
                        Node::Unary(UnaryOp::Invert, Box::new(inner))
                    }
                    UnaryOpKind::USub => match inner {
                        Node::Const(v) => Node::Const(-v),
                        other => Node::Unary(UnaryOp::Neg, Box::new(other)),
                    },
                    UnaryOpKind::UAdd => match inner {
                        c @ Node::Const(_) => c,
                        other => Node::Unary(UnaryOp::Pos, Box::new(other)),
                    },
                })
            }
            ExprKind::Compare { left, ops, comparators } => {
                // Pairwise expansion: a < b < c  ->  (a < b) and (b < c)
                let mut operands = Vec::with_capacity(comparators.len() + 1);
                operands.push(self.transform(input, left)?);
                for c in comparators {
                    operands.push(self.transform(input, c)?);
                }
                let mut acc: Option<Node> = None;
                for (i, op) in ops.iter().enumerate() {
                    let pair = Node::Binary(
                        cmp_op(*op),
                        Box::new(operands[i].clone()),
                        Box::new(operands[i + 1].clone()),
                    );
                    acc = Some(match acc {
                        None => pair,
                        Some(prev) => Node::Binary(BinaryOp::BitAnd, Box::new(prev), Box::new(pair)),
                    });
                }
                acc.ok_or_else(|| unsupported_err(input, expr.span, "empty comparison"))
            }
            ExprKind::BinOp { op, left, right } => {
                let l = self.transform(input, left)?;
                let r = self.transform(input, right)?;
                Ok(Node::Binary(bin_op(*op), Box::new(l), Box::new(r)))
            }
            ExprKind::Call { func, args } => self.transform_call(input, expr, func, args),
            ExprKind::Subscript { value, slice } => {
                self.transform_subscript(input, expr, value, slice)
            }
        }
    }

    fn transform_name(&mut self, input: &str, expr: &Expr, name: &str) -> Result<Node> {
        let Some(text) = self.aliases.get(name) else {
            return Ok(Node::Name(name.to_string()));
        };
        if self.expanding.iter().any(|n| n == name) {
            let chain = self.expanding.join(" -> ");
            return Err(unsupported_err(
                input,
                expr.span,
                format!("recursive alias '{name}' (expanding {chain} -> {name})"),
            ));
        }
        log::debug!("expanding alias '{name}' -> '{text}'");
        let parsed = ast::parse(text)?;
        self.expanding.push(name.to_string());
        let out = self.transform(text, &parsed);
        self.expanding.pop();
        out
    }

    fn transform_call(
        &mut self,
        input: &str,
        expr: &Expr,
        func: &str,
        args: &[Expr],
    ) -> Result<Node> {
        let bad_arity = |expected: &str| {
            unsupported_err(
                input,
                expr.span,
                format!("{func}() takes {expected} argument(s), got {}", args.len()),
            )
        };

        if !func.contains('.') {
            let reducer = match func {
                "length" | "len" => {
                    if args.len() != 1 {
                        return Err(bad_arity("1"));
                    }
                    let arg = self.transform(input, &args[0])?;
                    self.reductions += 1;
                    return Ok(Node::Count(Box::new(arg)));
                }
                "sum" => Some(Reducer::Sum),
                "mean" => Some(Reducer::Mean),
                "argmin" => Some(Reducer::ArgMin),
                "argmax" => Some(Reducer::ArgMax),
                "min" | "max" => {
                    match args.len() {
                        1 => {}
                        2 => {
                            let a = self.transform(input, &args[0])?;
                            let b = self.transform(input, &args[1])?;
                            let op =
                                if func == "min" { BinaryOp::Minimum } else { BinaryOp::Maximum };
                            return Ok(Node::Binary(op, Box::new(a), Box::new(b)));
                        }
                        _ => return Err(bad_arity("1 or 2")),
                    }
                    Some(if func == "min" { Reducer::Min } else { Reducer::Max })
                }
                _ => None,
            };
            if let Some(reducer) = reducer {
                if args.len() != 1 {
                    return Err(bad_arity("1"));
                }
                let arg = self.transform(input, &args[0])?;
                self.reductions += 1;
                let keepdims = matches!(reducer, Reducer::ArgMin | Reducer::ArgMax);
                return Ok(Node::Reduce { reducer, arg: Box::new(arg), keepdims });
            }
        }

        // Dotted targets (np.exp) resolve by their last component.
        let leaf = func.rsplit('.').next().unwrap_or(func);
        if matches!(leaf, "minimum" | "maximum") {
            if args.len() != 2 {
                return Err(bad_arity("2"));
            }
            let a = self.transform(input, &args[0])?;
            let b = self.transform(input, &args[1])?;
            let op = if leaf == "minimum" { BinaryOp::Minimum } else { BinaryOp::Maximum };
            return Ok(Node::Binary(op, Box::new(a), Box::new(b)));
        }
        if let Some(m) = MathFn::from_name(leaf) {
            if args.len() != m.arity() {
                return Err(bad_arity(&m.arity().to_string()));
            }
            let args = args.iter().map(|a| self.transform(input, a)).collect::<Result<Vec<_>>>()?;
            return Ok(Node::Math(m, args));
        }

        let args = args.iter().map(|a| self.transform(input, a)).collect::<Result<Vec<_>>>()?;
        Ok(Node::External { name: func.to_string(), args })
    }

    fn transform_subscript(
        &mut self,
        input: &str,
        expr: &Expr,
        value: &Expr,
        slice: &Slice,
    ) -> Result<Node> {
        match slice {
            Slice::Index(index) => {
                if let Some(i) = literal_int(index) {
                    let base = Box::new(self.transform(input, value)?);
                    return match i {
                        i if i >= 0 => Ok(Node::PadIndex {
                            base,
                            pad: (i as usize).saturating_add(1),
                            position: Position::At(i as usize),
                        }),
                        -1 => Ok(Node::PadIndex { base, pad: 1, position: Position::Last }),
                        other => Err(unsupported_err(
                            input,
                            index.span,
                            format!("negative index {other} (only -1 is supported)"),
                        )),
                    };
                }
                if matches!(index.kind, ExprKind::Constant(Constant::Float(_))) {
                    return Err(unsupported_err(input, index.span, "index must be an integer"));
                }
                let base = self.transform(input, value)?;
                let selector = self.transform(input, index)?;
                Ok(Node::Subscript { base: Box::new(base), selector: Box::new(selector) })
            }
            Slice::Range { lower, upper, step } => {
                if let Some(step) = step {
                    return Err(unsupported_err(input, step.span, "slice steps are not supported"));
                }
                let bound = |b: &Option<Box<Expr>>| -> Result<Option<i64>> {
                    match b {
                        None => Ok(None),
                        Some(e) => literal_int(e).map(Some).ok_or_else(|| {
                            unsupported_err(input, e.span, "slice bounds must be integer literals")
                        }),
                    }
                };
                let start = bound(lower)?;
                let stop = bound(upper)?;
                let pad = start.unwrap_or(0).unsigned_abs().max(stop.unwrap_or(0).unsigned_abs());
                let base = self.transform(input, value)?;
                log::debug!("slice at {:?}: pad to {pad}", expr.span);
                Ok(Node::PadSlice { base: Box::new(base), pad: pad as usize, start, stop })
            }
        }
    }
}

fn literal_int(e: &Expr) -> Option<i64> {
    match &e.kind {
        ExprKind::Constant(Constant::Int(n)) => Some(*n),
        ExprKind::UnaryOp { op: UnaryOpKind::USub, operand } => match operand.kind {
            ExprKind::Constant(Constant::Int(n)) => Some(-n),
            _ => None,
        },
        ExprKind::UnaryOp { op: UnaryOpKind::UAdd, operand } => match operand.kind {
            ExprKind::Constant(Constant::Int(n)) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

fn cmp_op(op: CmpOp) -> BinaryOp {
    match op {
        CmpOp::Eq => BinaryOp::Eq,
        CmpOp::Ne => BinaryOp::Ne,
        CmpOp::Lt => BinaryOp::Lt,
        CmpOp::Le => BinaryOp::Le,
        CmpOp::Gt => BinaryOp::Gt,
        CmpOp::Ge => BinaryOp::Ge,
    }
}

fn bin_op(op: Operator) -> BinaryOp {
    match op {
        Operator::Add => BinaryOp::Add,
        Operator::Sub => BinaryOp::Sub,
        Operator::Mul => BinaryOp::Mul,
        Operator::Div => BinaryOp::Div,
        Operator::FloorDiv => BinaryOp::FloorDiv,
        Operator::Mod => BinaryOp::Mod,
        Operator::Pow => BinaryOp::Pow,
        Operator::BitAnd => BinaryOp::BitAnd,
        Operator::BitOr => BinaryOp::BitOr,
        Operator::BitXor => BinaryOp::BitXor,
    }
}

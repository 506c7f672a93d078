//! Array-oriented plan produced by the transformer.
//!
//! Every node describes a whole-column operation: arithmetic broadcasts across
//! rows and inner elements, reductions collapse the innermost axis, and
//! indexing goes through pad-then-select so short rows yield missing values
//! instead of errors. `Display` renders the canonical serialized form.

use std::fmt;

/// Reduction over a row's inner sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reducer {
    /// Sum of valid elements (`0` for an empty row).
    Sum,
    /// Mean of valid elements (missing for an empty row).
    Mean,
    /// Minimum (missing for an empty row).
    Min,
    /// Maximum (missing for an empty row).
    Max,
    /// Position of the minimum (missing for an empty row).
    ArgMin,
    /// Position of the maximum (missing for an empty row).
    ArgMax,
}

impl Reducer {
    /// Name used in expressions and in the serialized plan.
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::ArgMin => "argmin",
            Reducer::ArgMax => "argmax",
        }
    }
}

/// Elementwise unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

/// Elementwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    /// Elementwise two-argument `min(a, b)`.
    Minimum,
    /// Elementwise two-argument `max(a, b)`.
    Maximum,
}

impl BinaryOp {
    /// Whether the result is boolean-typed.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Maximum => "maximum",
        }
    }
}

/// Elementwise math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MathFn {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Atan2,
    Pow,
}

impl MathFn {
    /// Resolve a (namespace-stripped) function name.
    pub fn from_name(name: &str) -> Option<MathFn> {
        match name {
            "abs" | "fabs" | "absolute" => Some(MathFn::Abs),
            "sqrt" => Some(MathFn::Sqrt),
            "exp" => Some(MathFn::Exp),
            "log" => Some(MathFn::Log),
            "log10" => Some(MathFn::Log10),
            "sin" => Some(MathFn::Sin),
            "cos" => Some(MathFn::Cos),
            "tan" => Some(MathFn::Tan),
            "sinh" => Some(MathFn::Sinh),
            "cosh" => Some(MathFn::Cosh),
            "tanh" => Some(MathFn::Tanh),
            "atan2" | "arctan2" => Some(MathFn::Atan2),
            "pow" | "power" => Some(MathFn::Pow),
            _ => None,
        }
    }

    /// Number of arguments the function takes.
    pub fn arity(self) -> usize {
        match self {
            MathFn::Atan2 | MathFn::Pow => 2,
            _ => 1,
        }
    }

    /// Apply to scalar arguments (`b` is ignored for unary functions).
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MathFn::Abs => a.abs(),
            MathFn::Sqrt => a.sqrt(),
            MathFn::Exp => a.exp(),
            MathFn::Log => a.ln(),
            MathFn::Log10 => a.log10(),
            MathFn::Sin => a.sin(),
            MathFn::Cos => a.cos(),
            MathFn::Tan => a.tan(),
            MathFn::Sinh => a.sinh(),
            MathFn::Cosh => a.cosh(),
            MathFn::Tanh => a.tanh(),
            MathFn::Atan2 => a.atan2(b),
            MathFn::Pow => a.powf(b),
        }
    }

    fn name(self) -> &'static str {
        match self {
            MathFn::Abs => "abs",
            MathFn::Sqrt => "sqrt",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Sinh => "sinh",
            MathFn::Cosh => "cosh",
            MathFn::Tanh => "tanh",
            MathFn::Atan2 => "atan2",
            MathFn::Pow => "pow",
        }
    }
}

/// Position selected after padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Fixed position from the front.
    At(usize),
    /// Last real element of the row.
    Last,
}

/// Array plan node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Numeric constant.
    Const(f64),
    /// Boolean constant.
    Bool(bool),
    /// Column or extra-symbol reference.
    Name(String),
    /// Elementwise unary operator.
    Unary(UnaryOp, Box<Node>),
    /// Elementwise binary operator with row/element broadcasting.
    Binary(BinaryOp, Box<Node>, Box<Node>),
    /// Innermost-axis reduction.
    Reduce {
        /// Which reduction.
        reducer: Reducer,
        /// Reduced operand (must be nested).
        arg: Box<Node>,
        /// Keep a one-element inner list per row so a subscript can follow.
        keepdims: bool,
    },
    /// Count of valid inner elements per row.
    Count(Box<Node>),
    /// Elementwise math function.
    Math(MathFn, Vec<Node>),
    /// Pad each row to `pad` elements with missing markers, then select one position.
    PadIndex {
        /// Indexed operand (must be nested).
        base: Box<Node>,
        /// Minimum row length after padding.
        pad: usize,
        /// Position selected from each padded row.
        position: Position,
    },
    /// Pad each row to `pad` elements, then slice `[start:stop]` on the inner axis.
    ///
    /// Padding stops at the longest row, so an oversized bound costs nothing.
    PadSlice {
        /// Sliced operand (must be nested).
        base: Box<Node>,
        /// Minimum row length after padding.
        pad: usize,
        /// Start bound; negative counts from the row end.
        start: Option<i64>,
        /// Stop bound; negative counts from the row end.
        stop: Option<i64>,
    },
    /// Runtime subscript: boolean mask or integer gather, decided by the selector's dtype.
    Subscript {
        /// Subscripted operand.
        base: Box<Node>,
        /// Mask or index values.
        selector: Box<Node>,
    },
    /// Call into a caller-supplied function.
    External {
        /// Name as written in the expression.
        name: String,
        /// Arguments.
        args: Vec<Node>,
    },
}

impl Node {
    /// Names referenced anywhere in the plan, in first-occurrence order.
    pub fn names(&self) -> Vec<String> {
        fn walk(n: &Node, out: &mut Vec<String>) {
            match n {
                Node::Name(name) => {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
                Node::Const(_) | Node::Bool(_) => {}
                Node::Unary(_, a) | Node::Count(a) => walk(a, out),
                Node::Binary(_, a, b) | Node::Subscript { base: a, selector: b } => {
                    walk(a, out);
                    walk(b, out);
                }
                Node::Reduce { arg, .. } => walk(arg, out),
                Node::PadIndex { base, .. } | Node::PadSlice { base, .. } => walk(base, out),
                Node::Math(_, args) | Node::External { args, .. } => {
                    for a in args {
                        walk(a, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Node]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Const(v) => write!(f, "{v:?}"),
            Node::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Node::Name(n) => write!(f, "{n}"),
            Node::Unary(op, a) => match op {
                UnaryOp::Neg => write!(f, "(-{a})"),
                UnaryOp::Pos => write!(f, "(+{a})"),
                UnaryOp::Invert => write!(f, "(~{a})"),
            },
            Node::Binary(op @ (BinaryOp::Minimum | BinaryOp::Maximum), a, b) => {
                write!(f, "{}({a}, {b})", op.symbol())
            }
            Node::Binary(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            Node::Reduce { reducer, arg, keepdims } => {
                if *keepdims {
                    write!(f, "{}({arg}, axis=-1, keepdims=True)", reducer.name())
                } else {
                    write!(f, "{}({arg}, axis=-1)", reducer.name())
                }
            }
            Node::Count(a) => write!(f, "count({a}, axis=-1)"),
            Node::Math(func, args) => {
                write!(f, "{}(", func.name())?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Node::PadIndex { base, pad, position } => match position {
                Position::At(i) => write!(f, "pad({base}, {pad})[:, {i}]"),
                Position::Last => write!(f, "pad({base}, {pad})[:, -1]"),
            },
            Node::PadSlice { base, pad, start, stop } => {
                write!(f, "pad({base}, {pad})[:, ")?;
                if let Some(s) = start {
                    write!(f, "{s}")?;
                }
                write!(f, ":")?;
                if let Some(s) = stop {
                    write!(f, "{s}")?;
                }
                write!(f, "]")
            }
            Node::Subscript { base, selector } => write!(f, "{base}[{selector}]"),
            Node::External { name, args } => {
                write!(f, "{name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Box<Node> {
        Box::new(Node::Name(n.to_string()))
    }

    #[test]
    fn display_is_canonical() {
        let n = Node::Binary(
            BinaryOp::BitAnd,
            Box::new(Node::Binary(BinaryOp::Lt, name("a"), name("b"))),
            Box::new(Node::Binary(BinaryOp::Lt, name("b"), name("c"))),
        );
        assert_eq!(n.to_string(), "((a < b) & (b < c))");

        let n = Node::PadIndex { base: name("Jet_pt"), pad: 3, position: Position::At(2) };
        assert_eq!(n.to_string(), "pad(Jet_pt, 3)[:, 2]");

        let n = Node::PadSlice { base: name("Jet_pt"), pad: 2, start: None, stop: Some(2) };
        assert_eq!(n.to_string(), "pad(Jet_pt, 2)[:, :2]");

        let n = Node::Reduce { reducer: Reducer::ArgMin, arg: name("x"), keepdims: true };
        assert_eq!(n.to_string(), "argmin(x, axis=-1, keepdims=True)");

        let n = Node::Binary(BinaryOp::Minimum, name("x"), Box::new(Node::Const(50.0)));
        assert_eq!(n.to_string(), "minimum(x, 50.0)");
    }

    #[test]
    fn names_in_first_occurrence_order() {
        let n = Node::Binary(
            BinaryOp::Add,
            Box::new(Node::Subscript { base: name("b"), selector: name("a") }),
            Box::new(Node::Count(name("b"))),
        );
        assert_eq!(n.names(), vec!["b", "a"]);
    }

    #[test]
    fn math_fn_lookup() {
        assert_eq!(MathFn::from_name("arctan2"), Some(MathFn::Atan2));
        assert_eq!(MathFn::from_name("fabs"), Some(MathFn::Abs));
        assert_eq!(MathFn::from_name("nope"), None);
        assert_eq!(MathFn::Pow.arity(), 2);
        assert_eq!(MathFn::Pow.apply(3.0, 2.0), 9.0);
    }
}

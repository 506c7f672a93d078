//! Expression syntax tree and recursive-descent parser.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons (chainable),
//! `|`, `^`, `&`, `+ -`, `* / // %`, unary `+ - ~`, `**`, then postfix calls,
//! subscripts and attribute access.

use crate::error::Result;
use crate::lexer::{Span, Token, TokenKind, syntax_err, tokenize};

/// A parsed expression node with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Node payload.
    pub kind: ExprKind,
    /// Source range covered by the node.
    pub span: Span,
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// `True` / `False`.
    Bool(bool),
    /// Quoted string (parsed for error reporting, rejected by the transformer).
    Str(String),
}

/// Syntax tree node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal.
    Constant(Constant),
    /// Bare identifier.
    Name(String),
    /// `value.attr`.
    Attribute {
        /// Object the attribute is read from.
        value: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// Function call; `func` is the dotted target path (e.g. `np.exp`).
    Call {
        /// Dotted call target.
        func: String,
        /// Positional arguments.
        args: Vec<Expr>,
    },
    /// Comparison chain `left op0 c0 op1 c1 ...`.
    Compare {
        /// Leftmost operand.
        left: Box<Expr>,
        /// Operators, one per comparator.
        ops: Vec<CmpOp>,
        /// Right-hand operands.
        comparators: Vec<Expr>,
    },
    /// N-ary `and` / `or`.
    BoolOp {
        /// Which keyword.
        op: BoolOpKind,
        /// Operands, at least two.
        values: Vec<Expr>,
    },
    /// `value[slice]`.
    Subscript {
        /// Subscripted expression.
        value: Box<Expr>,
        /// Index, mask or slice.
        slice: Slice,
    },
    /// Binary arithmetic or bitwise operator.
    BinOp {
        /// Operator.
        op: Operator,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Unary operator.
    UnaryOp {
        /// Operator.
        op: UnaryOpKind,
        /// Operand.
        operand: Box<Expr>,
    },
}

/// Subscript contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    /// `x[e]`.
    Index(Box<Expr>),
    /// `x[lower:upper:step]`, each bound optional.
    Range {
        /// Start bound.
        lower: Option<Box<Expr>>,
        /// Stop bound.
        upper: Option<Box<Expr>>,
        /// Step.
        step: Option<Box<Expr>>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `and` / `or`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BoolOpKind {
    And,
    Or,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryOpKind {
    Not,
    Invert,
    USub,
    UAdd,
}

impl Expr {
    fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Dotted path of a `Name` / `Attribute` chain, e.g. `np.exp`.
    pub fn dotted_path(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(n) => Some(n.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted_path().map(|base| format!("{base}.{attr}"))
            }
            _ => None,
        }
    }
}

/// Parse `input` into a syntax tree.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(input, &tokens);
    let expr = parser.parse_expr()?;
    if let Some(t) = parser.peek() {
        return Err(syntax_err(
            input,
            t.span,
            format!("unexpected token after expression: {:?}", t.kind),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: &'a [Token]) -> Self {
        Self { input, tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eof_span(&self) -> Span {
        Span::new(self.input.len(), self.input.len())
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        match self.advance() {
            Some(t) if t.kind == expected => Ok(t),
            Some(t) => Err(syntax_err(
                self.input,
                t.span,
                format!("expected {:?}, got {:?}", expected, t.kind),
            )),
            None => Err(syntax_err(
                self.input,
                self.eof_span(),
                format!("expected {:?}, got end of input", expected),
            )),
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.parse_boolop(TokenKind::Or, BoolOpKind::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.parse_boolop(TokenKind::And, BoolOpKind::And, Self::parse_not)
    }

    fn parse_boolop(
        &mut self,
        tok: TokenKind,
        op: BoolOpKind,
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let first = next(self)?;
        if self.peek_kind() != Some(&tok) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.peek_kind() == Some(&tok) {
            self.advance();
            values.push(next(self)?);
        }
        let span = values[0].span.to(values[values.len() - 1].span);
        Ok(Expr::new(ExprKind::BoolOp { op, values }, span))
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if let Some(Token { kind: TokenKind::Not, span }) = self.peek().cloned() {
            self.advance();
            let operand = self.parse_not()?;
            let span = span.to(operand.span);
            return Ok(Expr::new(
                ExprKind::UnaryOp { op: UnaryOpKind::Not, operand: Box::new(operand) },
                span,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => CmpOp::Eq,
                Some(TokenKind::Ne) => CmpOp::Ne,
                Some(TokenKind::Lt) => CmpOp::Lt,
                Some(TokenKind::Le) => CmpOp::Le,
                Some(TokenKind::Gt) => CmpOp::Gt,
                Some(TokenKind::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let span = left.span.to(comparators[comparators.len() - 1].span);
        Ok(Expr::new(ExprKind::Compare { left: Box::new(left), ops, comparators }, span))
    }

    fn parse_binary_level(
        &mut self,
        table: &[(TokenKind, Operator)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in table {
                if self.peek_kind() == Some(tok) {
                    self.advance();
                    let rhs = next(self)?;
                    let span = lhs.span.to(rhs.span);
                    lhs = Expr::new(
                        ExprKind::BinOp { op: *op, left: Box::new(lhs), right: Box::new(rhs) },
                        span,
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Pipe, Operator::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Caret, Operator::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Amp, Operator::BitAnd)], Self::parse_arith)
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[(TokenKind::Plus, Operator::Add), (TokenKind::Minus, Operator::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, Operator::Mul),
                (TokenKind::Slash, Operator::Div),
                (TokenKind::DoubleSlash, Operator::FloorDiv),
                (TokenKind::Percent, Operator::Mod),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOpKind::USub,
            Some(TokenKind::Plus) => UnaryOpKind::UAdd,
            Some(TokenKind::Tilde) => UnaryOpKind::Invert,
            _ => return self.parse_power(),
        };
        let start = self.peek().map(|t| t.span).unwrap_or_default();
        self.advance();
        let operand = self.parse_factor()?;
        let span = start.to(operand.span);
        Ok(Expr::new(ExprKind::UnaryOp { op, operand: Box::new(operand) }, span))
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.peek_kind() == Some(&TokenKind::DoubleStar) {
            self.advance();
            // Right-associative, binds tighter than a unary minus on its left.
            let exp = self.parse_factor()?;
            let span = base.span.to(exp.span);
            return Ok(Expr::new(
                ExprKind::BinOp { op: Operator::Pow, left: Box::new(base), right: Box::new(exp) },
                span,
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::LParen) => {
                    let lp = self.peek().map(|t| t.span).unwrap_or_default();
                    self.advance();
                    let Some(func) = e.dotted_path() else {
                        return Err(syntax_err(
                            self.input,
                            lp,
                            "only names can be called (e.g. sum(x), np.exp(x))",
                        ));
                    };
                    let mut args = Vec::new();
                    if self.peek_kind() != Some(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        while self.peek_kind() == Some(&TokenKind::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    let rp = self.expect(TokenKind::RParen)?;
                    let span = e.span.to(rp.span);
                    e = Expr::new(ExprKind::Call { func, args }, span);
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let slice = self.parse_slice()?;
                    let rb = self.expect(TokenKind::RBracket)?;
                    let span = e.span.to(rb.span);
                    e = Expr::new(ExprKind::Subscript { value: Box::new(e), slice }, span);
                }
                Some(TokenKind::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token { kind: TokenKind::Ident(attr), span }) => {
                            let span = e.span.to(span);
                            e = Expr::new(ExprKind::Attribute { value: Box::new(e), attr }, span);
                        }
                        Some(t) => {
                            return Err(syntax_err(
                                self.input,
                                t.span,
                                format!("expected attribute name after '.', got {:?}", t.kind),
                            ));
                        }
                        None => {
                            return Err(syntax_err(
                                self.input,
                                self.eof_span(),
                                "expected attribute name after '.'",
                            ));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn slice_bound(&mut self) -> Result<Option<Box<Expr>>> {
        match self.peek_kind() {
            Some(TokenKind::Colon | TokenKind::RBracket) | None => Ok(None),
            _ => Ok(Some(Box::new(self.parse_expr()?))),
        }
    }

    fn parse_slice(&mut self) -> Result<Slice> {
        let lower = self.slice_bound()?;
        if self.peek_kind() != Some(&TokenKind::Colon) {
            return match lower {
                Some(index) => Ok(Slice::Index(index)),
                None => {
                    let span = self.peek().map(|t| t.span).unwrap_or_else(|| self.eof_span());
                    Err(syntax_err(self.input, span, "empty subscript"))
                }
            };
        }
        self.advance();
        let upper = self.slice_bound()?;
        let mut step = None;
        if self.peek_kind() == Some(&TokenKind::Colon) {
            self.advance();
            step = self.slice_bound()?;
        }
        Ok(Slice::Range { lower, upper, step })
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token { kind: TokenKind::Int(n), span }) => {
                Ok(Expr::new(ExprKind::Constant(Constant::Int(n)), span))
            }
            Some(Token { kind: TokenKind::Float(n), span }) => {
                Ok(Expr::new(ExprKind::Constant(Constant::Float(n)), span))
            }
            Some(Token { kind: TokenKind::Str(s), span }) => {
                Ok(Expr::new(ExprKind::Constant(Constant::Str(s)), span))
            }
            Some(Token { kind: TokenKind::True, span }) => {
                Ok(Expr::new(ExprKind::Constant(Constant::Bool(true)), span))
            }
            Some(Token { kind: TokenKind::False, span }) => {
                Ok(Expr::new(ExprKind::Constant(Constant::Bool(false)), span))
            }
            Some(Token { kind: TokenKind::Ident(name), span }) => {
                Ok(Expr::new(ExprKind::Name(name), span))
            }
            Some(Token { kind: TokenKind::LParen, span }) => {
                let mut e = self.parse_expr()?;
                let rp = self.expect(TokenKind::RParen)?;
                e.span = span.to(rp.span);
                Ok(e)
            }
            Some(Token { span, kind }) => Err(syntax_err(
                self.input,
                span,
                format!("expected number, name, or '(', got {:?}", kind),
            )),
            None => Err(syntax_err(
                self.input,
                self.eof_span(),
                "expected expression, got end of input",
            )),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

// src/expression.rs
use crate::keypath::{CollectionOp, Segment};
use crate::parser::{ParseError, Parser};
use crate::value::Value;
use itertools::Itertools;
use std::fmt;

/// Operand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Top-level key looked up in the context.
    Key(String),
    /// `SELF`: the context itself.
    SelfRef,
    /// `$NAME` substitution variable.
    Variable(String),
    /// `{a, b, c}`
    Aggregate(Vec<Expr>),
    /// `target.key` or `target.@count`
    Member { target: Box<Expr>, segment: Segment },
    /// `target[index]`
    Index { target: Box<Expr>, index: IndexSel },
    Call { name: String, args: Vec<Expr> },
    Cast { value: Box<Expr>, target: Box<Expr> },
    Negate(Box<Expr>),
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexSel {
    At(Box<Expr>),
    First,
    Last,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Words with grammatical meaning; as keys they must be written `#word`.
pub(crate) const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "ANY", "SOME", "ALL", "NONE", "IN", "LIKE", "MATCHES", "BEGINSWITH",
    "ENDSWITH", "CONTAINS", "BETWEEN", "TRUEPREDICATE", "FALSEPREDICATE", "TRUE", "FALSE", "YES",
    "NO", "NIL", "NULL", "SELF", "FIRST", "LAST", "SIZE", "CAST",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Parser for operand expressions. The predicate parser wraps it and shares
/// its nesting limit.
pub(crate) struct EParser<'a> {
    pub(crate) parser: Parser<'a>,
    depth: usize,
    max_depth: usize,
}

impl<'a> EParser<'a> {
    pub(crate) fn new(s: &'a str, max_depth: usize) -> Self {
        Self {
            parser: Parser::new(s),
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self
                .parser
                .error(format!("nesting exceeds the limit of {}", self.max_depth)));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.release(1);
    }

    /// Each link of an operator or postfix chain deepens the tree by one, so
    /// a chain holds one level per link until it is complete.
    fn release(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    /// Position and depth, for backtracking.
    pub(crate) fn checkpoint(&self) -> (usize, usize) {
        (self.parser.pos(), self.depth)
    }

    pub(crate) fn restore(&mut self, (pos, depth): (usize, usize)) {
        self.parser.reset(pos);
        self.depth = depth;
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut links = 0;
        let mut left = self.parse_term()?;
        loop {
            self.parser.skip_ws();
            let op = if self.parser.consume_char('+') {
                ArithOp::Add
            } else if self.parser.consume_char('-') {
                ArithOp::Sub
            } else {
                break;
            };
            self.enter()?;
            links += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.release(links + 1);
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut links = 0;
        let mut left = self.parse_unary()?;
        loop {
            self.parser.skip_ws();
            let op = if self.parser.consume_char('*') {
                ArithOp::Mul
            } else if self.parser.consume_char('/') {
                ArithOp::Div
            } else {
                break;
            };
            self.enter()?;
            links += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.release(links);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.parser.skip_ws();
        if self.parser.consume_char('-') {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(match inner {
                Expr::Literal(Value::Integer(i)) if i != i64::MIN => {
                    Expr::Literal(Value::Integer(-i))
                }
                Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                other => Expr::Negate(Box::new(other)),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut links = 0;
        let mut expr = self.parse_atom()?;
        loop {
            let member = self.parser.peek_str(".") && !self.parser.peek_str("..");
            if member || self.parser.peek_str("[") {
                self.enter()?;
                links += 1;
            }
            if self.parser.consume_char('[') {
                self.parser.skip_ws();
                let index = if self.parser.consume_keyword("FIRST") {
                    IndexSel::First
                } else if self.parser.consume_keyword("LAST") {
                    IndexSel::Last
                } else if self.parser.consume_keyword("SIZE") {
                    IndexSel::Size
                } else {
                    IndexSel::At(Box::new(self.parse_expr()?))
                };
                self.parser.expect(']')?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index,
                };
            } else if member {
                self.parser.consume_char('.');
                let segment = self.parse_segment()?;
                expr = Expr::Member {
                    target: Box::new(expr),
                    segment,
                };
            } else {
                break;
            }
        }
        self.release(links);
        Ok(expr)
    }

    fn parse_segment(&mut self) -> Result<Segment, ParseError> {
        if self.parser.consume_char('@') {
            let name = self.parser.parse_identifier()?;
            return match name.to_ascii_lowercase().as_str() {
                "count" => Ok(Segment::Operator(CollectionOp::Count)),
                "sum" => Ok(Segment::Operator(CollectionOp::Sum)),
                "avg" => Ok(Segment::Operator(CollectionOp::Avg)),
                "min" => Ok(Segment::Operator(CollectionOp::Min)),
                "max" => Ok(Segment::Operator(CollectionOp::Max)),
                _ => Err(self.parser.error(format!("unknown collection operator @{name}"))),
            };
        }
        self.parser.consume_char('#');
        Ok(Segment::Key(self.parser.parse_identifier()?))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        self.parser.skip_ws();
        match self.parser.peek_char() {
            Some('"' | '\'') => {
                return Ok(Expr::Literal(Value::String(self.parser.parse_quoted_string()?)));
            }
            Some(c) if c.is_ascii_digit() => {
                return Ok(Expr::Literal(self.parser.parse_number_literal()?));
            }
            Some('{') => {
                self.parser.consume_char('{');
                self.enter()?;
                let items = self.parse_list('}')?;
                self.leave();
                return Ok(Expr::Aggregate(items));
            }
            Some('(') => {
                self.parser.consume_char('(');
                let inner = self.parse_expr()?;
                self.parser.expect(')')?;
                return Ok(inner);
            }
            Some('$') => {
                self.parser.consume_char('$');
                return Ok(Expr::Variable(self.parser.parse_identifier()?));
            }
            Some('#') => {
                self.parser.consume_char('#');
                return Ok(Expr::Key(self.parser.parse_identifier()?));
            }
            None => return Err(self.parser.error("expression expected, found end of input")),
            _ => {}
        }

        let start = self.parser.pos();
        let ident = self.parser.parse_identifier()?;
        match ident.to_ascii_uppercase().as_str() {
            "TRUE" | "YES" => return Ok(Expr::Literal(Value::Bool(true))),
            "FALSE" | "NO" => return Ok(Expr::Literal(Value::Bool(false))),
            "NIL" | "NULL" => return Ok(Expr::Literal(Value::Null)),
            "SELF" => return Ok(Expr::SelfRef),
            "CAST" => {
                self.parser.expect('(')?;
                self.enter()?;
                let value = self.parse_expr()?;
                self.parser.expect(',')?;
                let target = self.parse_expr()?;
                self.parser.expect(')')?;
                self.leave();
                return Ok(Expr::Cast {
                    value: Box::new(value),
                    target: Box::new(target),
                });
            }
            _ => {}
        }

        let after_ident = self.parser.pos();
        self.parser.skip_ws();
        if self.parser.consume_char('(') {
            self.enter()?;
            let args = self.parse_list(')')?;
            self.leave();
            return Ok(Expr::Call { name: ident, args });
        }
        self.parser.reset(after_ident);

        if is_reserved(&ident) {
            self.parser.reset(start);
            return Err(self.parser.error(format!(
                "reserved word {ident} cannot be used as a key; write #{ident}"
            )));
        }
        Ok(Expr::Key(ident))
    }

    /// Comma-separated expressions up to `close`; the opener is already consumed.
    fn parse_list(&mut self, close: char) -> Result<Vec<Expr>, ParseError> {
        let mut out = Vec::new();
        self.parser.skip_ws();
        if self.parser.consume_char(close) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_expr()?);
            self.parser.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect(close)?;
            break;
        }
        Ok(out)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Key(k) if is_reserved(k) => write!(f, "#{k}"),
            Expr::Key(k) => write!(f, "{k}"),
            Expr::SelfRef => write!(f, "SELF"),
            Expr::Variable(name) => write!(f, "${name}"),
            Expr::Aggregate(items) => write!(f, "{{{}}}", items.iter().join(", ")),
            Expr::Member { target, segment } => write!(f, "{target}.{segment}"),
            Expr::Index { target, index } => match index {
                IndexSel::At(e) => write!(f, "{target}[{e}]"),
                IndexSel::First => write!(f, "{target}[FIRST]"),
                IndexSel::Last => write!(f, "{target}[LAST]"),
                IndexSel::Size => write!(f, "{target}[SIZE]"),
            },
            Expr::Call { name, args } => write!(f, "{name}({})", args.iter().join(", ")),
            Expr::Cast { value, target } => write!(f, "CAST({value}, {target})"),
            Expr::Negate(inner) => write!(f, "-{inner}"),
            Expr::Binary { op, left, right } => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                write!(f, "({left} {sym} {right})")
            }
        }
    }
}

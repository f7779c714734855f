use crate::context::EvalOptions;
use crate::expression::{EParser, Expr};
use crate::parser::ParseError;
use std::fmt;
use std::str::FromStr;

/// A parsed predicate. Parse once, evaluate against any number of contexts.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    /// Two or more operands; a flat chain stays flat.
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Comparison(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub quantifier: Option<Quantifier>,
    pub left: Expr,
    pub op: Operator,
    pub options: StringOptions,
    pub right: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
    Matches,
    In,
    Between,
}

/// The `[cd]` flags on a string comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringOptions {
    pub case_insensitive: bool,
    pub diacritic_insensitive: bool,
}

impl Predicate {
    /// Parses with the default nesting limit.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_predicate(input, EvalOptions::default().max_depth)
    }
}

impl FromStr for Predicate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}

pub fn parse_predicate(input: &str, max_depth: usize) -> Result<Predicate, ParseError> {
    let mut p = EParser::new(input, max_depth);
    p.parser.skip_ws();
    if p.parser.eof() {
        return Err(p.parser.error("empty predicate"));
    }
    let pred = parse_or(&mut p)?;
    p.parser.skip_ws();
    if !p.parser.eof() {
        return Err(p.parser.error("unexpected trailing input"));
    }
    Ok(pred)
}

fn parse_or(p: &mut EParser) -> Result<Predicate, ParseError> {
    let mut operands = vec![parse_and(p)?];
    loop {
        p.parser.skip_ws();
        if p.parser.consume_str("||") || p.parser.consume_keyword("OR") {
            operands.push(parse_and(p)?);
        } else {
            break;
        }
    }
    Ok(compound(operands, Predicate::Or))
}

fn parse_and(p: &mut EParser) -> Result<Predicate, ParseError> {
    let mut operands = vec![parse_not(p)?];
    loop {
        p.parser.skip_ws();
        if p.parser.consume_str("&&") || p.parser.consume_keyword("AND") {
            operands.push(parse_not(p)?);
        } else {
            break;
        }
    }
    Ok(compound(operands, Predicate::And))
}

fn compound(mut operands: Vec<Predicate>, build: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if operands.len() == 1 {
        operands.swap_remove(0)
    } else {
        build(operands)
    }
}

fn parse_not(p: &mut EParser) -> Result<Predicate, ParseError> {
    p.parser.skip_ws();
    let negated = if p.parser.peek_str("!") && !p.parser.peek_str("!=") {
        p.parser.consume_char('!')
    } else {
        p.parser.consume_keyword("NOT")
    };
    if negated {
        p.enter()?;
        let inner = parse_not(p)?;
        p.leave();
        Ok(Predicate::Not(Box::new(inner)))
    } else {
        parse_primary(p)
    }
}

fn parse_primary(p: &mut EParser) -> Result<Predicate, ParseError> {
    p.parser.skip_ws();
    if p.parser.peek_str("(") {
        // Either a parenthesised predicate or a comparison whose left operand
        // starts with a parenthesised expression; try the former first.
        let mark = p.checkpoint();
        let nested = grouped(p);
        match nested {
            Ok(pred) => return Ok(pred),
            Err(first) => {
                p.restore(mark);
                return parse_comparison(p).map_err(|second| {
                    if second.offset >= first.offset {
                        second
                    } else {
                        first
                    }
                });
            }
        }
    }
    if p.parser.consume_keyword("TRUEPREDICATE") {
        return Ok(Predicate::True);
    }
    if p.parser.consume_keyword("FALSEPREDICATE") {
        return Ok(Predicate::False);
    }
    parse_comparison(p)
}

fn grouped(p: &mut EParser) -> Result<Predicate, ParseError> {
    p.parser.consume_char('(');
    p.enter()?;
    let inner = parse_or(p)?;
    p.parser.expect(')')?;
    p.leave();
    Ok(inner)
}

fn parse_comparison(p: &mut EParser) -> Result<Predicate, ParseError> {
    p.parser.skip_ws();
    let quantifier = if p.parser.consume_keyword("ANY") || p.parser.consume_keyword("SOME") {
        Some(Quantifier::Any)
    } else if p.parser.consume_keyword("ALL") {
        Some(Quantifier::All)
    } else if p.parser.consume_keyword("NONE") {
        Some(Quantifier::None)
    } else {
        None
    };
    let left = p.parse_expr()?;
    p.parser.skip_ws();
    let op = parse_operator(p)?;
    let options = parse_options(p)?;
    let right = p.parse_expr()?;
    Ok(Predicate::Comparison(Comparison {
        quantifier,
        left,
        op,
        options,
        right,
    }))
}

fn parse_operator(p: &mut EParser) -> Result<Operator, ParseError> {
    const SYMBOLS: &[(&str, Operator)] = &[
        ("==", Operator::Eq),
        ("=<", Operator::Le),
        ("=>", Operator::Ge),
        ("=", Operator::Eq),
        ("!=", Operator::Ne),
        ("<>", Operator::Ne),
        ("<=", Operator::Le),
        ("<", Operator::Lt),
        (">=", Operator::Ge),
        (">", Operator::Gt),
    ];
    const WORDS: &[(&str, Operator)] = &[
        ("BEGINSWITH", Operator::BeginsWith),
        ("ENDSWITH", Operator::EndsWith),
        ("CONTAINS", Operator::Contains),
        ("LIKE", Operator::Like),
        ("MATCHES", Operator::Matches),
        ("IN", Operator::In),
        ("BETWEEN", Operator::Between),
    ];
    for (sym, op) in SYMBOLS {
        if p.parser.consume_str(sym) {
            return Ok(*op);
        }
    }
    for (word, op) in WORDS {
        if p.parser.consume_keyword(word) {
            return Ok(*op);
        }
    }
    Err(p.parser.error("comparison operator expected"))
}

fn parse_options(p: &mut EParser) -> Result<StringOptions, ParseError> {
    let mut options = StringOptions::default();
    if !p.parser.consume_char('[') {
        return Ok(options);
    }
    let flags = p.parser.parse_identifier()?;
    for flag in flags.chars() {
        match flag.to_ascii_lowercase() {
            'c' => options.case_insensitive = true,
            'd' => options.diacritic_insensitive = true,
            other => return Err(p.parser.error(format!("unknown comparison option '{other}'"))),
        }
    }
    p.parser.expect(']')?;
    Ok(options)
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::BeginsWith => "BEGINSWITH",
            Operator::EndsWith => "ENDSWITH",
            Operator::Contains => "CONTAINS",
            Operator::Like => "LIKE",
            Operator::Matches => "MATCHES",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quantifier::Any => "ANY",
            Quantifier::All => "ALL",
            Quantifier::None => "NONE",
        })
    }
}

impl fmt::Display for StringOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.case_insensitive, self.diacritic_insensitive) {
            (false, false) => Ok(()),
            (true, false) => f.write_str("[c]"),
            (false, true) => f.write_str("[d]"),
            (true, true) => f.write_str("[cd]"),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(q) = self.quantifier {
            write!(f, "{q} ")?;
        }
        write!(f, "{} {}{} {}", self.left, self.op, self.options, self.right)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn child(f: &mut fmt::Formatter<'_>, p: &Predicate) -> fmt::Result {
            match p {
                Predicate::And(..) | Predicate::Or(..) => write!(f, "({p})"),
                _ => write!(f, "{p}"),
            }
        }
        fn chain(f: &mut fmt::Formatter<'_>, operands: &[Predicate], sep: &str) -> fmt::Result {
            for (i, p) in operands.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                child(f, p)?;
            }
            Ok(())
        }
        match self {
            Predicate::True => f.write_str("TRUEPREDICATE"),
            Predicate::False => f.write_str("FALSEPREDICATE"),
            Predicate::Comparison(c) => write!(f, "{c}"),
            Predicate::Not(inner) => {
                f.write_str("NOT ")?;
                child(f, inner)
            }
            Predicate::And(operands) => chain(f, operands, " AND "),
            Predicate::Or(operands) => chain(f, operands, " OR "),
        }
    }
}

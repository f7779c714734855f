use crate::errors::{EvalError, Result};
use crate::predicate::{Operator, StringOptions};
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Applies a comparison operator to two evaluated operands.
pub fn compare(op: Operator, a: &Value, b: &Value, opts: StringOptions) -> Result<bool> {
    Comparator::new(op, b, opts).test(a)
}

/// An operator bound to its right operand. A `LIKE` or `MATCHES` pattern is
/// compiled once, however many left values are tested against it.
pub struct Comparator<'a> {
    op: Operator,
    right: &'a Value,
    opts: StringOptions,
    pattern: Option<Result<Regex>>,
}

impl<'a> Comparator<'a> {
    pub fn new(op: Operator, right: &'a Value, opts: StringOptions) -> Self {
        let pattern = match (op, right) {
            (Operator::Like, Value::String(p)) => Some(build_pattern(p, opts, like_to_regex)),
            (Operator::Matches, Value::String(p)) => Some(build_pattern(p, opts, str::to_string)),
            _ => None,
        };
        Self {
            op,
            right,
            opts,
            pattern,
        }
    }

    pub fn test(&self, a: &Value) -> Result<bool> {
        let (op, b, opts) = (self.op, self.right, self.opts);
        match op {
            Operator::Eq => values_equal(a, b, opts),
            Operator::Ne => values_equal(a, b, opts).map(|eq| !eq),
            Operator::Lt => ordered(a, b, opts, op, |o| o == Ordering::Less),
            Operator::Le => ordered(a, b, opts, op, |o| o != Ordering::Greater),
            Operator::Gt => ordered(a, b, opts, op, |o| o == Ordering::Greater),
            Operator::Ge => ordered(a, b, opts, op, |o| o != Ordering::Less),
            Operator::BeginsWith => strings(a, b, opts, op, |s, p| s.starts_with(p)),
            Operator::EndsWith => strings(a, b, opts, op, |s, p| s.ends_with(p)),
            Operator::Contains => match (a, b) {
                (Value::Array(items), needle) => Ok(contains(items, needle, opts)),
                _ => strings(a, b, opts, op, |s, p| s.contains(p)),
            },
            Operator::In => match (a, b) {
                (needle, Value::Array(items)) => Ok(contains(items, needle, opts)),
                (Value::String(k), Value::Dict(m)) => {
                    Ok(m.keys().any(|key| fold_eq(key, k, opts)))
                }
                (Value::String(_), Value::String(_)) => {
                    strings(b, a, opts, op, |s, p| s.contains(p))
                }
                (Value::Null, _) => Ok(false),
                _ => Err(EvalError::mismatch(op.to_string(), a, b)),
            },
            Operator::Like | Operator::Matches => self.pattern_match(a),
            Operator::Between => match b {
                Value::Array(bounds) if bounds.len() == 2 => {
                    let above = ordered(a, &bounds[0], opts, op, |o| o != Ordering::Less)?;
                    let below = ordered(a, &bounds[1], opts, op, |o| o != Ordering::Greater)?;
                    Ok(above && below)
                }
                _ => Err(EvalError::Runtime(
                    "BETWEEN needs a collection of exactly two bounds".into(),
                )),
            },
        }
    }

    fn pattern_match(&self, a: &Value) -> Result<bool> {
        match (a, &self.pattern) {
            (Value::String(s), Some(re)) => {
                let re = re.as_ref().map_err(|e| e.clone())?;
                Ok(re.is_match(&fold(s, diacritics_only(self.opts))))
            }
            _ if a.is_null() || self.right.is_null() => Ok(false),
            _ => Err(EvalError::mismatch(self.op.to_string(), a, self.right)),
        }
    }
}

/// Equality. Nil equals only nil; otherwise operands must be comparable.
pub fn values_equal(a: &Value, b: &Value, opts: StringOptions) -> Result<bool> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Integer(x), Value::Integer(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Bool(x), n) | (n, Value::Bool(x)) if n.is_number() => {
            Ok(n.as_f64() == Some(if *x { 1.0 } else { 0.0 }))
        }
        (x, y) if x.is_number() && y.is_number() => Ok(x.as_f64() == y.as_f64()),
        (Value::String(x), Value::String(y)) => Ok(fold_eq(x, y, opts)),
        (Value::Date(_), _) | (_, Value::Date(_)) => match (a.as_date(), b.as_date()) {
            (Some(x), Some(y)) => Ok(x == y),
            _ => Err(EvalError::mismatch("==", a, b)),
        },
        (Value::Array(x), Value::Array(y)) => Ok(x.len() == y.len()
            && x.iter().zip(y).all(|(l, r)| loose_eq(l, r, opts))),
        (Value::Dict(x), Value::Dict(y)) => Ok(x.len() == y.len()
            && x.iter()
                .all(|(k, v)| y.get(k).is_some_and(|w| loose_eq(v, w, opts)))),
        _ => Err(EvalError::mismatch("==", a, b)),
    }
}

/// Equality for collection members, where a type mismatch is just "not equal".
fn loose_eq(a: &Value, b: &Value, opts: StringOptions) -> bool {
    values_equal(a, b, opts).unwrap_or(false)
}

fn contains(items: &[Value], needle: &Value, opts: StringOptions) -> bool {
    items.iter().any(|item| loose_eq(item, needle, opts))
}

/// Ordering between numbers, strings or dates. `Ok(None)` when either side is
/// nil or the numbers are unordered (NaN); such comparisons are false.
pub fn ordering(a: &Value, b: &Value, opts: StringOptions, op: &str) -> Result<Option<Ordering>> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Integer(x), Value::Integer(y)) => Ok(Some(x.cmp(y))),
        (x, y) if x.is_number() && y.is_number() => match (x.as_f64(), y.as_f64()) {
            (Some(l), Some(r)) => Ok(l.partial_cmp(&r)),
            _ => Ok(None),
        },
        (Value::String(x), Value::String(y)) => Ok(Some(fold(x, opts).cmp(&fold(y, opts)))),
        (Value::Date(_), _) | (_, Value::Date(_)) => match (a.as_date(), b.as_date()) {
            (Some(x), Some(y)) => Ok(Some(x.cmp(&y))),
            _ => Err(EvalError::mismatch(op, a, b)),
        },
        _ => Err(EvalError::mismatch(op, a, b)),
    }
}

fn ordered(
    a: &Value,
    b: &Value,
    opts: StringOptions,
    op: Operator,
    accept: impl Fn(Ordering) -> bool,
) -> Result<bool> {
    Ok(ordering(a, b, opts, &op.to_string())?.is_some_and(accept))
}

fn strings(
    a: &Value,
    b: &Value,
    opts: StringOptions,
    op: Operator,
    test: impl Fn(&str, &str) -> bool,
) -> Result<bool> {
    match (a, b) {
        (Value::String(s), Value::String(p)) => Ok(test(&fold(s, opts), &fold(p, opts))),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        _ => Err(EvalError::mismatch(op.to_string(), a, b)),
    }
}

/// Case folding is left to the regex engine; `[d]` is applied to both the
/// pattern and the subject.
fn diacritics_only(opts: StringOptions) -> StringOptions {
    StringOptions {
        case_insensitive: false,
        diacritic_insensitive: opts.diacritic_insensitive,
    }
}

fn build_pattern(
    pattern: &str,
    opts: StringOptions,
    to_regex: impl Fn(&str) -> String,
) -> Result<Regex> {
    compile(&to_regex(&fold(pattern, diacritics_only(opts))), opts.case_insensitive)
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EvalError::InvalidPattern(e.to_string()))
}

/// `*` matches any run of characters, `?` exactly one; a backslash makes the
/// next character literal.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// Applies `[c]` and `[d]` folding.
pub fn fold(s: &str, opts: StringOptions) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(s);
    if opts.diacritic_insensitive {
        out = Cow::Owned(out.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect());
    }
    if opts.case_insensitive {
        out = Cow::Owned(out.to_lowercase());
    }
    out
}

fn fold_eq(a: &str, b: &str, opts: StringOptions) -> bool {
    fold(a, opts) == fold(b, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLAIN: StringOptions = StringOptions {
        case_insensitive: false,
        diacritic_insensitive: false,
    };
    const CD: StringOptions = StringOptions {
        case_insensitive: true,
        diacritic_insensitive: true,
    };

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert!(compare(Operator::Eq, &Value::Integer(2), &Value::Float(2.0), PLAIN).unwrap());
        assert!(compare(Operator::Lt, &Value::Float(1.5), &Value::Integer(2), PLAIN).unwrap());
        assert!(compare(Operator::Eq, &Value::Bool(true), &Value::Integer(1), PLAIN).unwrap());
    }

    #[test]
    fn nil_is_unequal_without_error() {
        assert!(!compare(Operator::Eq, &Value::Null, &s("x"), PLAIN).unwrap());
        assert!(compare(Operator::Ne, &Value::Null, &s("x"), PLAIN).unwrap());
        assert!(!compare(Operator::Gt, &Value::Null, &Value::Integer(1), PLAIN).unwrap());
    }

    #[test]
    fn incompatible_types_are_errors() {
        let err = compare(Operator::Eq, &s("10"), &Value::Integer(10), PLAIN).unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                op: "==".into(),
                left: "string",
                right: "integer"
            }
        );
        assert!(compare(Operator::Lt, &Value::Bool(true), &Value::Bool(false), PLAIN).is_err());
        assert!(compare(Operator::BeginsWith, &Value::Integer(1), &s("1"), PLAIN).is_err());
    }

    #[test]
    fn string_operators_honour_options() {
        let model = s("MacBookPro18,3");
        assert!(compare(Operator::BeginsWith, &model, &s("macbook"), CD).unwrap());
        assert!(!compare(Operator::BeginsWith, &model, &s("macbook"), PLAIN).unwrap());
        assert!(compare(Operator::Eq, &s("Café"), &s("cafe"), CD).unwrap());
        assert!(compare(Operator::EndsWith, &s("14.6.1"), &s(".1"), PLAIN).unwrap());
        assert!(compare(Operator::Contains, &s("hello world"), &s("o w"), PLAIN).unwrap());
    }

    #[test]
    fn like_and_matches() {
        assert!(compare(Operator::Like, &s("14.6.1"), &s("14.*"), PLAIN).unwrap());
        assert!(compare(Operator::Like, &s("a.c"), &s("a?c"), PLAIN).unwrap());
        assert!(!compare(Operator::Like, &s("abc"), &s("a\\?c"), PLAIN).unwrap());
        assert!(compare(Operator::Matches, &s("Mac14,2"), &s("mac[0-9]+,[0-9]+"), CD).unwrap());
        assert!(!compare(Operator::Matches, &s("xMac14,2"), &s("Mac.*"), PLAIN).unwrap());
        assert!(matches!(
            compare(Operator::Matches, &s("a"), &s("("), PLAIN),
            Err(EvalError::InvalidPattern(_))
        ));
    }

    #[test]
    fn comparator_reuses_one_pattern() {
        let pattern = s("14.*");
        let like = Comparator::new(Operator::Like, &pattern, CD);
        assert!(like.pattern.as_ref().is_some_and(|re| re.is_ok()));
        assert!(like.test(&s("14.6.1")).unwrap());
        assert!(!like.test(&s("13.1")).unwrap());
        assert!(!like.test(&Value::Null).unwrap());
        assert!(like.test(&Value::Integer(14)).is_err());

        let bad = s("(");
        let matches = Comparator::new(Operator::Matches, &bad, PLAIN);
        assert!(!matches.test(&Value::Null).unwrap());
        assert!(matches!(matches.test(&s("a")), Err(EvalError::InvalidPattern(_))));
        assert!(Comparator::new(Operator::Eq, &pattern, PLAIN).pattern.is_none());
    }

    #[test]
    fn membership() {
        let catalogs = Value::from(vec!["testing", "production"]);
        assert!(compare(Operator::In, &s("testing"), &catalogs, PLAIN).unwrap());
        assert!(compare(Operator::Contains, &catalogs, &s("production"), PLAIN).unwrap());
        assert!(!compare(Operator::In, &Value::Integer(3), &catalogs, PLAIN).unwrap());
        assert!(compare(Operator::In, &s("ell"), &s("hello"), PLAIN).unwrap());
    }

    #[test]
    fn between_is_inclusive() {
        let bounds = Value::from(vec![1, 5]);
        assert!(compare(Operator::Between, &Value::Integer(1), &bounds, PLAIN).unwrap());
        assert!(compare(Operator::Between, &Value::Integer(5), &bounds, PLAIN).unwrap());
        assert!(!compare(Operator::Between, &Value::Integer(6), &bounds, PLAIN).unwrap());
        assert!(compare(Operator::Between, &Value::Integer(6), &Value::Integer(1), PLAIN).is_err());
    }

    #[test]
    fn dates_compare_with_timestamps() {
        let d = Value::Date(crate::value::parse_date("2024-08-24T00:00:00Z").unwrap());
        assert!(compare(Operator::Gt, &d, &s("2024-01-01T00:00:00Z"), PLAIN).unwrap());
        assert!(compare(Operator::Gt, &d, &s("not a date"), PLAIN).is_err());
    }
}

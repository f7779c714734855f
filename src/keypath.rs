use crate::comparison::ordering;
use crate::errors::{EvalError, Result};
use crate::predicate::StringOptions;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// One step after a `.` in a key path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Operator(CollectionOp),
}

/// `@count`, `@sum`, `@avg`, `@min`, `@max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Resolved index selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    At(i64),
    Key(String),
    First,
    Last,
    Size,
}

/// Applies one segment to a value. `Ok(None)` means the key is absent.
///
/// A key applied to an array is applied to each element, with nil standing in
/// for elements that lack it.
pub fn step(base: &Value, segment: &Segment) -> Result<Option<Value>> {
    match segment {
        Segment::Key(k) => match base {
            Value::Dict(m) => Ok(m.get(k).cloned()),
            Value::Array(items) => Ok(Some(Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Dict(m) => m.get(k).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    })
                    .collect(),
            ))),
            Value::Null => Ok(Some(Value::Null)),
            other => Err(EvalError::TypeMismatch {
                op: format!("key '{k}'"),
                left: other.type_name(),
                right: "key",
            }),
        },
        Segment::Operator(op) => match base {
            Value::Array(items) => aggregate(*op, items).map(Some),
            Value::Dict(m) if *op == CollectionOp::Count => {
                Ok(Some(Value::Integer(len_i64(m.len()))))
            }
            Value::Null => Ok(Some(Value::Null)),
            other => Err(EvalError::TypeMismatch {
                op: op.to_string(),
                left: other.type_name(),
                right: "collection operator",
            }),
        },
    }
}

/// Subscript. `Ok(None)` means a dictionary key is absent; positions past the
/// end of an array are an error.
pub fn index(base: &Value, index: &Index) -> Result<Option<Value>> {
    match (base, index) {
        (Value::Null, _) => Ok(Some(Value::Null)),
        (Value::Array(a), Index::Size) => Ok(Some(Value::Integer(len_i64(a.len())))),
        (Value::Dict(m), Index::Size) => Ok(Some(Value::Integer(len_i64(m.len())))),
        (Value::Array(a), Index::First) => a
            .first()
            .cloned()
            .map(Some)
            .ok_or(EvalError::IndexOutOfRange { index: 0, len: 0 }),
        (Value::Array(a), Index::Last) => a
            .last()
            .cloned()
            .map(Some)
            .ok_or(EvalError::IndexOutOfRange { index: -1, len: 0 }),
        (Value::Array(a), Index::At(i)) => usize::try_from(*i)
            .ok()
            .and_then(|u| a.get(u))
            .cloned()
            .map(Some)
            .ok_or(EvalError::IndexOutOfRange {
                index: *i,
                len: a.len(),
            }),
        (Value::Dict(m), Index::Key(k)) => Ok(m.get(k).cloned()),
        (other, idx) => Err(EvalError::TypeMismatch {
            op: "subscript".into(),
            left: other.type_name(),
            right: match idx {
                Index::At(_) => "integer",
                Index::Key(_) => "string",
                _ => "selector",
            },
        }),
    }
}

/// Folds a collection with one of the `@` operators. Nil elements are skipped
/// by everything but `@count`.
pub fn aggregate(op: CollectionOp, items: &[Value]) -> Result<Value> {
    let present: Vec<&Value> = items.iter().filter(|v| !v.is_null()).collect();
    match op {
        CollectionOp::Count => Ok(Value::Integer(len_i64(items.len()))),
        CollectionOp::Sum | CollectionOp::Avg => {
            let mut int_sum: Option<i64> = Some(0);
            let mut float_sum = 0.0;
            for v in &present {
                let x = v.as_f64().ok_or_else(|| EvalError::TypeMismatch {
                    op: op.to_string(),
                    left: "array",
                    right: v.type_name(),
                })?;
                float_sum += x;
                int_sum = match (int_sum, v) {
                    (Some(acc), Value::Integer(i)) => acc.checked_add(*i),
                    _ => None,
                };
            }
            if op == CollectionOp::Avg {
                if present.is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(Value::Float(float_sum / present.len() as f64));
            }
            Ok(int_sum.map_or(Value::Float(float_sum), Value::Integer))
        }
        CollectionOp::Min | CollectionOp::Max => {
            let want = if op == CollectionOp::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for v in present {
                best = match best {
                    None => Some(v),
                    Some(b) => match ordering(v, b, StringOptions::default(), &op.to_string())? {
                        Some(o) if o == want => Some(v),
                        _ => Some(b),
                    },
                };
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
    }
}

fn len_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl fmt::Display for CollectionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollectionOp::Count => "@count",
            CollectionOp::Sum => "@sum",
            CollectionOp::Avg => "@avg",
            CollectionOp::Min => "@min",
            CollectionOp::Max => "@max",
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) if crate::expression::is_reserved(k) => write!(f, "#{k}"),
            Segment::Key(k) => f.write_str(k),
            Segment::Operator(op) => write!(f, "{op}"),
        }
    }
}

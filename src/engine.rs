use crate::comparison::Comparator;
use crate::context::{Context, EvalOptions, MissingKeyPolicy};
use crate::errors::{EvalError, Result};
use crate::expression::{ArithOp, Expr, IndexSel};
use crate::functions::Registry;
use crate::keypath::{self, Index};
use crate::predicate::{Comparison, Predicate, Quantifier};
use crate::value::{parse_date, Value, REFERENCE_DATE_OFFSET};
use chrono::{DateTime, Utc};
use tracing::trace;

/// Tree-walking evaluator for one predicate against one context.
pub struct Engine<'a> {
    ctx: &'a Context,
    options: &'a EvalOptions,
    registry: &'a Registry,
}

impl<'a> Engine<'a> {
    pub fn new(ctx: &'a Context, options: &'a EvalOptions, registry: &'a Registry) -> Self {
        Self {
            ctx,
            options,
            registry,
        }
    }

    /// `AND` and `OR` short-circuit: operands after the one that decides the
    /// result are not evaluated and cannot fail.
    pub fn eval_predicate(&self, pred: &Predicate) -> Result<bool> {
        match pred {
            Predicate::True => Ok(true),
            Predicate::False => Ok(false),
            Predicate::And(operands) => {
                for p in operands {
                    if !self.eval_predicate(p)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(operands) => {
                for p in operands {
                    if self.eval_predicate(p)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!self.eval_predicate(inner)?),
            Predicate::Comparison(c) => self.eval_comparison(c),
        }
    }

    fn eval_comparison(&self, c: &Comparison) -> Result<bool> {
        let left = self.eval_expr(&c.left)?;
        let right = self.eval_expr(&c.right)?;
        let comparator = Comparator::new(c.op, &right, c.options);
        let Some(quantifier) = c.quantifier else {
            return comparator.test(&left);
        };
        let items = match &left {
            Value::Array(items) => items,
            other => {
                return Err(EvalError::TypeMismatch {
                    op: format!("{quantifier} {}", c.op),
                    left: other.type_name(),
                    right: right.type_name(),
                })
            }
        };
        let mut hits = 0usize;
        for item in items {
            if comparator.test(item)? {
                hits += 1;
                if quantifier != Quantifier::All {
                    break;
                }
            }
        }
        Ok(match quantifier {
            Quantifier::Any => hits > 0,
            Quantifier::None => hits == 0,
            Quantifier::All => hits == items.len(),
        })
    }

    pub fn eval_expr(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Key(name) => match self.ctx.get(name) {
                Some(v) => {
                    trace!(key = %name, value = %v, "resolved key");
                    Ok(v.clone())
                }
                None => self.missing(name),
            },
            Expr::SelfRef => Ok(self.ctx.to_value()),
            Expr::Variable(name) => self
                .ctx
                .variable(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Aggregate(items) => items
                .iter()
                .map(|e| self.eval_expr(e))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Member { target, segment } => {
                let base = self.eval_expr(target)?;
                match keypath::step(&base, segment)? {
                    Some(v) => {
                        trace!(path = %expr, value = %v, "resolved key path");
                        Ok(v)
                    }
                    None => self.missing(&expr.to_string()),
                }
            }
            Expr::Index { target, index } => {
                let base = self.eval_expr(target)?;
                let index = match index {
                    IndexSel::First => Index::First,
                    IndexSel::Last => Index::Last,
                    IndexSel::Size => Index::Size,
                    IndexSel::At(e) => match self.eval_expr(e)? {
                        Value::Integer(i) => Index::At(i),
                        Value::String(k) => Index::Key(k),
                        other => {
                            return Err(EvalError::TypeMismatch {
                                op: "subscript".into(),
                                left: base.type_name(),
                                right: other.type_name(),
                            })
                        }
                    },
                };
                match keypath::index(&base, &index)? {
                    Some(v) => Ok(v),
                    None => self.missing(&expr.to_string()),
                }
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|e| self.eval_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                self.registry.call(name, &args)
            }
            Expr::Cast { value, target } => {
                let v = self.eval_expr(value)?;
                match self.eval_expr(target)? {
                    Value::String(t) => cast(v, &t),
                    other => Err(EvalError::Runtime(format!(
                        "CAST target must be a type name string, got {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Negate(inner) => match self.eval_expr(inner)? {
                Value::Integer(i) => Ok(i
                    .checked_neg()
                    .map_or(Value::Float(-(i as f64)), Value::Integer)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::mismatch("unary -", &other, &other)),
            },
            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                arithmetic(*op, &l, &r)
            }
        }
    }

    fn missing(&self, path: &str) -> Result<Value> {
        match self.options.missing_keys {
            MissingKeyPolicy::Error => Err(EvalError::MissingKey(path.to_string())),
            MissingKeyPolicy::Null => {
                trace!(path, "key absent, resolving to nil");
                Ok(Value::Null)
            }
        }
    }
}

fn arithmetic(op: ArithOp, l: &Value, r: &Value) -> Result<Value> {
    let symbol = match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
    };
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        let (a, b) = (*a, *b);
        let exact = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div if b == 0 => return Err(EvalError::Runtime("division by zero".into())),
            ArithOp::Div => match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                _ => None,
            },
        };
        if let Some(v) = exact {
            return Ok(Value::Integer(v));
        }
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(EvalError::mismatch(symbol, l, r));
    };
    Ok(Value::Float(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div if b == 0.0 => return Err(EvalError::Runtime("division by zero".into())),
        ArithOp::Div => a / b,
    }))
}

/// `CAST(value, "NSDate" | "NSNumber" | "NSString")`
fn cast(v: Value, target: &str) -> Result<Value> {
    let fail = |what: &str| {
        Err(EvalError::Runtime(format!("cannot cast {what} to {target}")))
    };
    match target {
        "NSDate" => match v {
            Value::Date(d) => Ok(Value::Date(d)),
            Value::Integer(i) => seconds_to_date(i as f64),
            Value::Float(f) => seconds_to_date(f),
            Value::String(s) => match parse_date(&s) {
                Some(d) => Ok(Value::Date(d)),
                None => match s.trim().parse::<f64>() {
                    Ok(secs) => seconds_to_date(secs),
                    Err(_) => fail(&format!("{s:?}")),
                },
            },
            other => fail(other.type_name()),
        },
        "NSNumber" => match v {
            Value::Integer(i) => Ok(Value::Integer(i)),
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
            Value::String(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = t.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    fail(&format!("{s:?}"))
                }
            }
            Value::Date(d) => {
                let millis = d.timestamp_millis() - REFERENCE_DATE_OFFSET * 1000;
                Ok(Value::Float(millis as f64 / 1000.0))
            }
            other => fail(other.type_name()),
        },
        "NSString" => match v {
            Value::String(s) => Ok(Value::String(s)),
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            Value::Bool(b) => Ok(Value::String(if b { "1" } else { "0" }.into())),
            Value::Date(d) => Ok(Value::String(d.to_rfc3339())),
            other => fail(other.type_name()),
        },
        other => Err(EvalError::Runtime(format!("unsupported CAST target {other:?}"))),
    }
}

/// Seconds since 2001-01-01T00:00:00Z.
fn seconds_to_date(secs: f64) -> Result<Value> {
    let millis = (secs * 1000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 / 2.0 {
        return Err(EvalError::Runtime(format!("date out of range: {secs}")));
    }
    (millis as i64)
        .checked_add(REFERENCE_DATE_OFFSET * 1000)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(Value::Date)
        .ok_or_else(|| EvalError::Runtime(format!("date out of range: {secs}")))
}

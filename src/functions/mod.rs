use crate::errors::{EvalError, Result};
use crate::value::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Trait for pluggable functions callable from a predicate, e.g. `lowercase(name)`.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> RangeInclusive<usize>;
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut map: HashMap<&'static str, Arc<dyn Function>> = HashMap::new();
        let builtins: [Arc<dyn Function>; 9] = [
            Arc::new(builtins::Lowercase),
            Arc::new(builtins::Uppercase),
            Arc::new(builtins::Aggregate("count", crate::keypath::CollectionOp::Count)),
            Arc::new(builtins::Aggregate("sum", crate::keypath::CollectionOp::Sum)),
            Arc::new(builtins::Aggregate("average", crate::keypath::CollectionOp::Avg)),
            Arc::new(builtins::Aggregate("min", crate::keypath::CollectionOp::Min)),
            Arc::new(builtins::Aggregate("max", crate::keypath::CollectionOp::Max)),
            Arc::new(builtins::Abs),
            Arc::new(builtins::Now),
        ];
        for f in builtins {
            map.insert(f.name(), f);
        }
        Self {
            inner: Arc::new(map),
        }
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    /// Looks up `name`, checks the argument count, and calls it.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let f = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        let arity = f.arity();
        if !arity.contains(&args.len()) {
            let expected = if arity.start() == arity.end() {
                arity.start().to_string()
            } else {
                format!("{} to {}", arity.start(), arity.end())
            };
            return Err(EvalError::Arity {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }
        f.call(args)
    }
}

pub mod builtins {
    use super::*;
    use crate::keypath::{aggregate, CollectionOp};

    fn arg(args: &[Value]) -> &Value {
        args.first().unwrap_or(&Value::Null)
    }

    fn mismatch(name: &str, v: &Value, expected: &'static str) -> EvalError {
        EvalError::TypeMismatch {
            op: format!("{name}()"),
            left: v.type_name(),
            right: expected,
        }
    }

    pub struct Lowercase;
    impl Function for Lowercase {
        fn name(&self) -> &'static str { "lowercase" }
        fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match arg(args) {
                Value::String(t) => Ok(Value::String(t.to_lowercase())),
                Value::Null => Ok(Value::Null),
                other => Err(mismatch(self.name(), other, "string")),
            }
        }
    }

    pub struct Uppercase;
    impl Function for Uppercase {
        fn name(&self) -> &'static str { "uppercase" }
        fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match arg(args) {
                Value::String(t) => Ok(Value::String(t.to_uppercase())),
                Value::Null => Ok(Value::Null),
                other => Err(mismatch(self.name(), other, "string")),
            }
        }
    }

    /// `count(x)`, `sum(x)` and friends: the function form of the `@` operators.
    pub struct Aggregate(pub &'static str, pub CollectionOp);
    impl Function for Aggregate {
        fn name(&self) -> &'static str { self.0 }
        fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match arg(args) {
                Value::Array(items) => aggregate(self.1, items),
                Value::Dict(m) if self.1 == CollectionOp::Count => {
                    Ok(Value::Integer(i64::try_from(m.len()).unwrap_or(i64::MAX)))
                }
                other => Err(mismatch(self.0, other, "array")),
            }
        }
    }

    pub struct Abs;
    impl Function for Abs {
        fn name(&self) -> &'static str { "abs" }
        fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match arg(args) {
                Value::Integer(i) => Ok(i
                    .checked_abs()
                    .map_or(Value::Float((*i as f64).abs()), Value::Integer)),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(mismatch(self.name(), other, "number")),
            }
        }
    }

    pub struct Now;
    impl Function for Now {
        fn name(&self) -> &'static str { "now" }
        fn arity(&self) -> RangeInclusive<usize> { 0..=0 }
        fn call(&self, _args: &[Value]) -> Result<Value> {
            Ok(Value::Date(chrono::Utc::now()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Double;
    impl Function for Double {
        fn name(&self) -> &'static str { "double" }
        fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match args.first() {
                Some(Value::Integer(i)) => Ok(Value::Integer(i * 2)),
                _ => Err(EvalError::Runtime("double() wants an integer".into())),
            }
        }
    }

    #[test]
    fn builtins_are_registered() {
        let r = Registry::with_builtins();
        let names = [
            "lowercase", "uppercase", "count", "sum", "average", "min", "max", "abs", "now",
        ];
        for name in names {
            assert!(r.get(name).is_some(), "{name} missing");
        }
        assert_eq!(r.call("uppercase", &[Value::from("x")]).unwrap(), Value::from("X"));
        assert_eq!(r.call("abs", &[Value::Integer(-3)]).unwrap(), Value::Integer(3));
    }

    #[test]
    fn arity_and_unknown_names() {
        let r = Registry::with_builtins();
        assert_eq!(
            r.call("lowercase", &[]).unwrap_err(),
            EvalError::Arity {
                name: "lowercase".into(),
                expected: "1".into(),
                got: 0
            }
        );
        assert_eq!(
            r.call("nope", &[]).unwrap_err(),
            EvalError::UnknownFunction("nope".into())
        );
    }

    #[test]
    fn registering_does_not_affect_clones() {
        let base = Registry::with_builtins();
        let mut extended = base.clone();
        extended.register(Double);
        assert_eq!(extended.call("double", &[Value::Integer(4)]).unwrap(), Value::Integer(8));
        assert!(base.get("double").is_none());
    }
}

//! Evaluates predicate format strings such as
//! `os_vers BEGINSWITH "14." AND ANY catalogs == "testing"` against a
//! dictionary of named values.
//!
//! ```
//! use predicate_eval::{evaluate, Context};
//!
//! let ctx = Context::new().with("arch", "arm64").with("os_vers_major", 14);
//! assert_eq!(evaluate("arch == 'arm64' AND os_vers_major >= 13", &ctx), Ok(true));
//! assert!(evaluate("arch ==", &ctx).unwrap_err().is_parse());
//! ```

pub mod context;
pub mod engine;
pub mod errors;
pub mod expression;
pub mod functions; // plugin model
pub mod predicate;
pub mod value;
mod comparison;
mod keypath;
mod parser;

use tracing::{debug, warn};

pub use context::{Context, EvalOptions, MissingKeyPolicy};
pub use errors::{ErrorKind, EvalError, Result};
pub use functions::{Function, Registry};
pub use keypath::{CollectionOp, Segment};
pub use parser::ParseError;
pub use predicate::Predicate;
pub use value::Value;

use engine::Engine;

/// The main evaluator: options plus the functions predicates may call.
/// Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Evaluator {
    options: EvalOptions,
    registry: Registry,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Registry::with_builtins())
    }
}

impl Evaluator {
    pub fn new(registry: Registry) -> Self {
        Self {
            options: EvalOptions::default(),
            registry,
        }
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Parse once for repeated evaluation.
    pub fn compile(&self, expr: &str) -> Result<Predicate> {
        let pred = predicate::parse_predicate(expr, self.options.max_depth)?;
        debug!(expression = expr, parsed = %pred, "compiled predicate");
        Ok(pred)
    }

    pub fn evaluate(&self, expr: &str, ctx: &Context) -> Result<bool> {
        let pred = self.compile(expr)?;
        self.evaluate_compiled(&pred, ctx)
    }

    pub fn evaluate_compiled(&self, pred: &Predicate, ctx: &Context) -> Result<bool> {
        let verdict = Engine::new(ctx, &self.options, &self.registry).eval_predicate(pred);
        debug!(predicate = %pred, ?verdict, "evaluated predicate");
        verdict
    }
}

/// Convenience: evaluate with default options and the built-in functions.
pub fn evaluate(expr: &str, ctx: &Context) -> Result<bool> {
    Evaluator::default().evaluate(expr, ctx)
}

/// Helper that treats any failure as "does not hold", logging why.
pub fn evaluates_as_true(expr: &str, ctx: &Context) -> bool {
    match evaluate(expr, ctx) {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(
                expression = expr,
                error = %e,
                "predicate could not be evaluated; treating as false"
            );
            false
        }
    }
}

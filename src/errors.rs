use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

/// Coarse grouping of failures: the expression could not be read, or it was
/// read but could not produce a verdict against the given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Evaluation,
}

// Every way a predicate can fail to produce a boolean
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    // The expression text is not a valid predicate
    #[error("parse error at offset {offset}: {message}")]
    Parse { message: String, offset: usize },

    // A key path named by the predicate is absent from the context
    #[error("key not found in context: {0}")]
    MissingKey(String),

    // A `$NAME` substitution variable with no binding
    #[error("unbound variable: ${0}")]
    UnboundVariable(String),

    // An operator was applied to values it cannot compare or combine
    #[error("type mismatch: cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("unknown function: {0}()")]
    UnknownFunction(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("index {index} out of range for collection of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    // LIKE / MATCHES pattern that does not compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    // Variant for any other failure during evaluation, with a message
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Parse { .. } => ErrorKind::Parse,
            _ => ErrorKind::Evaluation,
        }
    }

    pub fn is_parse(&self) -> bool {
        self.kind() == ErrorKind::Parse
    }

    pub(crate) fn mismatch(
        op: impl Into<String>,
        left: &crate::Value,
        right: &crate::Value,
    ) -> Self {
        EvalError::TypeMismatch {
            op: op.into(),
            left: left.type_name(),
            right: right.type_name(),
        }
    }
}

// Type alias for results that use `EvalError` as the error type
pub type Result<T> = std::result::Result<T, EvalError>;

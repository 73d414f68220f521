use thiserror::Error;

/// Why an expression could not be turned into a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalErrorKind {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{name}` takes exactly one argument, got {given}")]
    Arity { name: String, given: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{function} is undefined for {argument}")]
    Domain { function: &'static str, argument: f64 },

    #[error("result of {operation} is not a finite number")]
    NonFinite { operation: &'static str },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot evaluate `{expression}`: {cause}")]
pub struct EvaluationError {
    pub expression: String,
    pub cause: EvalErrorKind,
}

impl EvaluationError {
    pub fn new(expression: impl Into<String>, cause: EvalErrorKind) -> Self {
        Self {
            expression: expression.into(),
            cause,
        }
    }
}

/// Coarse classification a front end can map onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parameter,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuadratureError {
    #[error("invalid `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl QuadratureError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        QuadratureError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QuadratureError::InvalidParameter { .. } => ErrorKind::Parameter,
            QuadratureError::Evaluation(_) => ErrorKind::Evaluation,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

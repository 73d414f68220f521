pub mod analytical;
pub mod config;
pub mod error;
pub mod expression;
pub mod integral;
pub mod parser;
pub mod quadrature;

pub use analytical::{try_integrate, Analytical};
pub use config::QuadratureConfig;
pub use error::{ErrorKind, EvaluationError, QuadratureError};
pub use expression::{compile, evaluate, CompiledExpression};
pub use quadrature::{
    compute, compute_simpson, compute_trapezoid, Node, Quadrature, QuadratureRequest,
    QuadratureResult, Resolution, Rule,
};

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use crate::error::{EvalErrorKind, EvaluationError};
use crate::parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::E => std::f64::consts::E,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    /// Not reachable from text; closed forms use it for `ln|u|`.
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "log" => Some(Function::Log),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
        }
    }

    fn apply(self, argument: f64) -> Result<f64, EvalErrorKind> {
        let value = match self {
            Function::Log if argument <= 0. => {
                return Err(EvalErrorKind::Domain {
                    function: "log",
                    argument,
                })
            }
            Function::Sqrt if argument < 0. => {
                return Err(EvalErrorKind::Domain {
                    function: "sqrt",
                    argument,
                })
            }
            Function::Sin => argument.sin(),
            Function::Cos => argument.cos(),
            Function::Tan => argument.tan(),
            Function::Exp => argument.exp(),
            Function::Log => argument.ln(),
            Function::Sqrt => argument.sqrt(),
            Function::Abs => argument.abs(),
        };
        finite(value, self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Constant(Constant),
    X,
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

fn finite(value: f64, operation: &'static str) -> Result<f64, EvalErrorKind> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalErrorKind::NonFinite { operation })
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, EvalErrorKind> {
    if base == 0. && exponent < 0. {
        return Err(EvalErrorKind::DivisionByZero);
    }
    if base < 0. && exponent.fract() != 0. {
        return Err(EvalErrorKind::Domain {
            function: "power",
            argument: base,
        });
    }
    finite(base.powf(exponent), "power")
}

impl Expr {
    pub fn eval(&self, x: f64) -> Result<f64, EvalErrorKind> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Constant(constant) => Ok(constant.value()),
            Expr::X => Ok(x),
            Expr::Neg(inner) => Ok(-inner.eval(x)?),
            Expr::Add(lhs, rhs) => finite(lhs.eval(x)? + rhs.eval(x)?, "addition"),
            Expr::Sub(lhs, rhs) => finite(lhs.eval(x)? - rhs.eval(x)?, "subtraction"),
            Expr::Mul(lhs, rhs) => finite(lhs.eval(x)? * rhs.eval(x)?, "multiplication"),
            Expr::Div(lhs, rhs) => {
                let numerator = lhs.eval(x)?;
                let denominator = rhs.eval(x)?;
                if denominator == 0. {
                    return Err(EvalErrorKind::DivisionByZero);
                }
                finite(numerator / denominator, "division")
            }
            Expr::Pow(base, exponent) => power(base.eval(x)?, exponent.eval(x)?),
            Expr::Call(function, argument) => function.apply(argument.eval(x)?),
        }
    }

    pub fn contains_x(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::Constant(_) => false,
            Expr::X => true,
            Expr::Neg(inner) | Expr::Call(_, inner) => inner.contains_x(),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => lhs.contains_x() || rhs.contains_x(),
        }
    }

    pub fn call(function: Function, argument: Expr) -> Expr {
        Expr::Call(function, Box::new(argument))
    }

    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Mul(..) | Expr::Div(..) => 2,
            Expr::Neg(_) => 3,
            Expr::Number(value) if value.is_sign_negative() => 3,
            Expr::Pow(..) => 4,
            _ => 5,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{value}"),
            Expr::Constant(Constant::Pi) => write!(f, "pi"),
            Expr::Constant(Constant::E) => write!(f, "e"),
            Expr::X => write!(f, "x"),
            Expr::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_operand(f, 4)
            }
            Expr::Add(lhs, rhs) => {
                lhs.fmt_operand(f, 1)?;
                write!(f, " + ")?;
                rhs.fmt_operand(f, 2)
            }
            Expr::Sub(lhs, rhs) => {
                lhs.fmt_operand(f, 1)?;
                write!(f, " - ")?;
                rhs.fmt_operand(f, 2)
            }
            Expr::Mul(lhs, rhs) => {
                lhs.fmt_operand(f, 2)?;
                write!(f, "*")?;
                rhs.fmt_operand(f, 4)
            }
            Expr::Div(lhs, rhs) => {
                lhs.fmt_operand(f, 2)?;
                write!(f, "/")?;
                rhs.fmt_operand(f, 4)
            }
            Expr::Pow(base, exponent) => {
                base.fmt_operand(f, 5)?;
                write!(f, "^")?;
                exponent.fmt_operand(f, 3)
            }
            Expr::Call(function, argument) => write!(f, "{}({argument})", function.name()),
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// A formula parsed once and evaluated at many sample points.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    ast: Expr,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn evaluate(&self, x: f64) -> Result<f64, EvaluationError> {
        self.ast
            .eval(x)
            .map_err(|cause| EvaluationError::new(self.source.as_str(), cause))
    }
}

impl FromStr for CompiledExpression {
    type Err = EvaluationError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        compile(source)
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

pub fn compile(expression: &str) -> Result<CompiledExpression, EvaluationError> {
    let ast = parser::parse(expression).map_err(|cause| EvaluationError::new(expression, cause))?;
    Ok(CompiledExpression {
        source: expression.to_string(),
        ast,
    })
}

pub fn evaluate(expression: &str, x: f64) -> Result<f64, EvaluationError> {
    compile(expression)?.evaluate(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_evaluate_arithmetic() {
        assert_relative_eq!(evaluate("x^2 + 2*x + 1", 3.).unwrap(), 16.);
        assert_relative_eq!(evaluate("-x**2", 3.).unwrap(), -9.);
        assert_relative_eq!(evaluate("2^-1", 0.).unwrap(), 0.5);
        assert_relative_eq!(evaluate("(-2)^3", 0.).unwrap(), -8.);
        assert_relative_eq!(evaluate("1/x - 3", 0.5).unwrap(), -1.);
    }

    #[test]
    fn test_evaluate_functions_and_constants() {
        assert_relative_eq!(evaluate("sin(pi/2)", 0.).unwrap(), 1.);
        assert_relative_eq!(evaluate("log(e)", 0.).unwrap(), 1.);
        assert_relative_eq!(evaluate("exp(x) * sqrt(x)", 4.).unwrap(), 4f64.exp() * 2.);
        assert_relative_eq!(evaluate("cos(x) + tan(x)", 0.).unwrap(), 1.);
    }

    #[test]
    fn test_log_domain() {
        for x in [0., -1.] {
            let error = evaluate("log(x)", x).unwrap_err();
            assert_eq!(error.expression, "log(x)");
            assert_eq!(
                error.cause,
                EvalErrorKind::Domain {
                    function: "log",
                    argument: x
                }
            );
        }
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            evaluate("1/x", 0.).unwrap_err().cause,
            EvalErrorKind::DivisionByZero
        );
        assert_eq!(
            evaluate("x^-1", 0.).unwrap_err().cause,
            EvalErrorKind::DivisionByZero
        );
    }

    #[test]
    fn test_non_real_results_are_errors() {
        assert!(matches!(
            evaluate("sqrt(x)", -4.).unwrap_err().cause,
            EvalErrorKind::Domain { function: "sqrt", .. }
        ));
        assert!(matches!(
            evaluate("x^0.5", -4.).unwrap_err().cause,
            EvalErrorKind::Domain { function: "power", .. }
        ));
        assert!(matches!(
            evaluate("exp(x)", 1000.).unwrap_err().cause,
            EvalErrorKind::NonFinite { operation: "exp" }
        ));
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        for source in ["-x^2 + 3*x", "(x + 1)^(2 - x)", "sin(2*x)/(1 + x)", "2^-x", "x - (x - 1)"] {
            let compiled = compile(source).unwrap();
            let reparsed = compile(&compiled.to_string()).unwrap();
            assert_eq!(compiled.ast(), reparsed.ast());
        }
    }

    #[test]
    fn test_compile_once_evaluate_many() {
        let f: CompiledExpression = "x^3".parse().unwrap();
        let values: Vec<f64> = [1., 2., 3.].iter().map(|&x| f.evaluate(x).unwrap()).collect();
        assert_eq!(values, vec![1., 8., 27.]);
    }
}

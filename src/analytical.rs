use std::f64::consts::{FRAC_PI_2, PI};

use log::debug;
use serde::Serialize;

use crate::expression::{compile, CompiledExpression, Expr, Function};

const MAX_DEGREE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "Option<f64>")]
pub enum Analytical {
    Value(f64),
    Unavailable,
}

impl Analytical {
    pub fn value(&self) -> Option<f64> {
        match self {
            Analytical::Value(value) => Some(*value),
            Analytical::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Analytical::Value(_))
    }
}

impl From<Analytical> for Option<f64> {
    fn from(analytical: Analytical) -> Self {
        analytical.value()
    }
}

/// Dense polynomial, coefficients in ascending order, no trailing zeros.
#[derive(Debug, Clone, PartialEq)]
struct Polynomial(Vec<f64>);

impl Polynomial {
    fn new(mut coefficients: Vec<f64>) -> Self {
        while coefficients.last() == Some(&0.) {
            coefficients.pop();
        }
        Polynomial(coefficients)
    }

    fn constant(value: f64) -> Self {
        Polynomial::new(vec![value])
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    fn degree(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    fn coefficient(&self, power: usize) -> f64 {
        self.0.get(power).copied().unwrap_or(0.)
    }

    fn add(&self, other: &Polynomial) -> Polynomial {
        let len = self.0.len().max(other.0.len());
        Polynomial::new((0..len).map(|i| self.coefficient(i) + other.coefficient(i)).collect())
    }

    fn scale(&self, factor: f64) -> Polynomial {
        Polynomial::new(self.0.iter().map(|c| c * factor).collect())
    }

    fn mul(&self, other: &Polynomial) -> Option<Polynomial> {
        if self.is_zero() || other.is_zero() {
            return Some(Polynomial(Vec::new()));
        }
        if self.degree() + other.degree() > MAX_DEGREE {
            return None;
        }
        let mut product = vec![0.; self.0.len() + other.0.len() - 1];
        for (i, a) in self.0.iter().enumerate() {
            for (j, b) in other.0.iter().enumerate() {
                product[i + j] += a * b;
            }
        }
        Some(Polynomial::new(product))
    }

    fn derivative(&self) -> Polynomial {
        Polynomial::new(
            self.0
                .iter()
                .enumerate()
                .skip(1)
                .map(|(power, c)| c * power as f64)
                .collect(),
        )
    }

    fn antiderivative(&self) -> Polynomial {
        let mut coefficients = vec![0.];
        coefficients.extend(
            self.0
                .iter()
                .enumerate()
                .map(|(power, c)| c / (power + 1) as f64),
        );
        Polynomial::new(coefficients)
    }

    /// `Some((α, β))` when this is `αx + β` with `α ≠ 0`.
    fn as_linear(&self) -> Option<Linear> {
        if self.0.len() == 2 {
            Some(Linear {
                alpha: self.0[1],
                beta: self.0[0],
            })
        } else {
            None
        }
    }

    fn as_constant(&self) -> Option<f64> {
        Some(self.coefficient(0)).filter(|c| self.0.len() <= 1 && c.is_finite())
    }

    fn from_expr(expr: &Expr) -> Option<Polynomial> {
        match expr {
            Expr::Number(value) => Some(Polynomial::constant(*value)),
            Expr::Constant(constant) => Some(Polynomial::constant(constant.value())),
            Expr::X => Some(Polynomial::new(vec![0., 1.])),
            Expr::Neg(inner) => Some(Polynomial::from_expr(inner)?.scale(-1.)),
            Expr::Add(lhs, rhs) => Some(Polynomial::from_expr(lhs)?.add(&Polynomial::from_expr(rhs)?)),
            Expr::Sub(lhs, rhs) => {
                Some(Polynomial::from_expr(lhs)?.add(&Polynomial::from_expr(rhs)?.scale(-1.)))
            }
            Expr::Mul(lhs, rhs) => Polynomial::from_expr(lhs)?.mul(&Polynomial::from_expr(rhs)?),
            Expr::Div(lhs, rhs) => {
                let divisor = Polynomial::from_expr(rhs)?.as_constant().filter(|c| *c != 0.)?;
                Some(Polynomial::from_expr(lhs)?.scale(1. / divisor))
            }
            Expr::Pow(base, exponent) => {
                let power = Polynomial::from_expr(exponent)?.as_constant()?;
                let base = Polynomial::from_expr(base)?;
                if let Some(c) = base.as_constant() {
                    return folded(Expr::Number(c).pow(Expr::Number(power)));
                }
                if power < 0. || power.fract() != 0. || power > MAX_DEGREE as f64 {
                    return None;
                }
                let mut result = Polynomial::constant(1.);
                for _ in 0..power as usize {
                    result = result.mul(&base)?;
                }
                Some(result)
            }
            Expr::Call(function, argument) => {
                let c = Polynomial::from_expr(argument)?.as_constant()?;
                folded(Expr::call(*function, Expr::Number(c)))
            }
        }
    }

    fn to_expr(&self) -> Expr {
        let mut terms = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0.)
            .map(|(power, c)| (*c, power));

        let Some((first_c, first_power)) = terms.next() else {
            return Expr::Number(0.);
        };

        let mut result = monomial(first_c, first_power);
        for (c, power) in terms {
            result = if c < 0. {
                result - monomial(-c, power)
            } else {
                result + monomial(c, power)
            };
        }
        result
    }
}

fn monomial(c: f64, power: usize) -> Expr {
    let x_power = match power {
        0 => return Expr::Number(c),
        1 => Expr::X,
        _ => Expr::X.pow(Expr::Number(power as f64)),
    };
    if c == 1. {
        x_power
    } else if c == -1. {
        -x_power
    } else {
        Expr::Number(c) * x_power
    }
}

fn folded(expr: Expr) -> Option<Polynomial> {
    expr.eval(0.).ok().map(Polynomial::constant)
}

/// Value of a subexpression that does not vary with `x`.
fn constant(expr: &Expr) -> Option<f64> {
    Polynomial::from_expr(expr)?.as_constant()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Linear {
    alpha: f64,
    beta: f64,
}

impl Linear {
    fn of(expr: &Expr) -> Option<Linear> {
        Polynomial::from_expr(expr)?.as_linear()
    }

    fn range(&self, support: (f64, f64)) -> (f64, f64) {
        let (a, b) = support;
        let ua = self.alpha * a + self.beta;
        let ub = self.alpha * b + self.beta;
        (ua.min(ub), ua.max(ub))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Constraint {
    NonZero(Linear),
    Positive(Linear),
    NonNegative(Linear),
    CosNonZero(Linear),
}

impl Constraint {
    fn holds(&self, support: (f64, f64)) -> bool {
        match self {
            Constraint::NonZero(u) => {
                let (low, high) = u.range(support);
                !(low <= 0. && 0. <= high)
            }
            Constraint::Positive(u) => u.range(support).0 > 0.,
            Constraint::NonNegative(u) => u.range(support).0 >= 0.,
            Constraint::CosNonZero(u) => {
                let (low, high) = u.range(support);
                let k = ((low - FRAC_PI_2) / PI).ceil();
                FRAC_PI_2 + k * PI > high
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Antiderivative {
    expr: Expr,
    constraints: Vec<Constraint>,
}

impl Antiderivative {
    fn plain(expr: Expr) -> Self {
        Self {
            expr,
            constraints: Vec::new(),
        }
    }

    fn constrained(expr: Expr, constraint: Constraint) -> Self {
        Self {
            expr,
            constraints: vec![constraint],
        }
    }

    fn map(self, f: impl FnOnce(Expr) -> Expr) -> Self {
        Self {
            expr: f(self.expr),
            constraints: self.constraints,
        }
    }

    fn combine(mut self, other: Antiderivative, f: impl FnOnce(Expr, Expr) -> Expr) -> Self {
        self.constraints.extend(other.constraints);
        Self {
            expr: f(self.expr, other.expr),
            constraints: self.constraints,
        }
    }
}

fn over(expr: Expr, divisor: f64) -> Expr {
    if divisor == 1. {
        expr
    } else {
        expr / Expr::Number(divisor)
    }
}

fn times(poly: &Polynomial, expr: Expr) -> Option<Expr> {
    if poly.is_zero() {
        None
    } else if poly.0 == [1.] {
        Some(expr)
    } else {
        Some(poly.to_expr() * expr)
    }
}

fn sum(terms: impl IntoIterator<Item = Option<Expr>>) -> Expr {
    terms
        .into_iter()
        .flatten()
        .reduce(|acc, term| acc + term)
        .unwrap_or(Expr::Number(0.))
}

/// `Σⱼ (-1)ʲ P⁽ᶠⁱʳˢᵗ ⁺ ˢᵗʳⁱᵈᵉ·ʲ⁾ / rate^(first + stride·j + 1)`, the
/// coefficient polynomials of repeated integration by parts.
fn by_parts_series(p: &Polynomial, first: usize, stride: usize, rate: f64) -> Polynomial {
    let mut derivative = p.clone();
    for _ in 0..first {
        derivative = derivative.derivative();
    }

    let mut result = Polynomial(Vec::new());
    let mut order = first;
    let mut sign = 1.;
    while !derivative.is_zero() {
        result = result.add(&derivative.scale(sign / rate.powi(order as i32 + 1)));
        for _ in 0..stride {
            derivative = derivative.derivative();
        }
        order += stride;
        sign = -sign;
    }
    result
}

/// `∫ u^k dx` for `u = αx + β`.
fn power_of_linear(u: &Expr, linear: Linear, k: f64) -> Antiderivative {
    if k == -1. {
        let log_abs = Expr::call(Function::Log, Expr::call(Function::Abs, u.clone()));
        return Antiderivative::constrained(over(log_abs, linear.alpha), Constraint::NonZero(linear));
    }

    let raised = u.clone().pow(Expr::Number(k + 1.));
    let expr = over(raised, (k + 1.) * linear.alpha);
    if k.fract() != 0. {
        let constraint = if k < 0. {
            Constraint::Positive(linear)
        } else {
            Constraint::NonNegative(linear)
        };
        Antiderivative::constrained(expr, constraint)
    } else if k < 0. {
        Antiderivative::constrained(expr, Constraint::NonZero(linear))
    } else {
        Antiderivative::plain(expr)
    }
}

enum Kernel {
    /// `K' = rate · K`.
    Exponential { rate: f64 },
    Sin(Linear),
    Cos(Linear),
}

fn kernel(expr: &Expr) -> Option<Kernel> {
    match expr {
        Expr::Call(Function::Exp, u) => Some(Kernel::Exponential {
            rate: Linear::of(u)?.alpha,
        }),
        Expr::Call(Function::Sin, u) => Some(Kernel::Sin(Linear::of(u)?)),
        Expr::Call(Function::Cos, u) => Some(Kernel::Cos(Linear::of(u)?)),
        Expr::Pow(base, u) => {
            let c = constant(base).filter(|c| *c > 0. && *c != 1.)?;
            Some(Kernel::Exponential {
                rate: Linear::of(u)?.alpha * c.ln(),
            })
        }
        _ => None,
    }
}

/// `∫ P(x) · K(x) dx` by tabular integration by parts.
fn polynomial_times_kernel(p: &Polynomial, k: &Expr) -> Option<Antiderivative> {
    let expr = match (kernel(k)?, k) {
        (Kernel::Exponential { rate }, _) => times(&by_parts_series(p, 0, 1, rate), k.clone())?,
        (Kernel::Sin(linear), Expr::Call(_, u)) => {
            let cos = Expr::call(Function::Cos, (**u).clone());
            let sin = Expr::call(Function::Sin, (**u).clone());
            sum([
                times(&by_parts_series(p, 0, 2, linear.alpha).scale(-1.), cos),
                times(&by_parts_series(p, 1, 2, linear.alpha), sin),
            ])
        }
        (Kernel::Cos(linear), Expr::Call(_, u)) => {
            let cos = Expr::call(Function::Cos, (**u).clone());
            let sin = Expr::call(Function::Sin, (**u).clone());
            sum([
                times(&by_parts_series(p, 0, 2, linear.alpha), sin),
                times(&by_parts_series(p, 1, 2, linear.alpha), cos),
            ])
        }
        _ => return None,
    };
    Some(Antiderivative::plain(expr))
}

fn integrate_product(lhs: &Expr, rhs: &Expr) -> Option<Antiderivative> {
    if !lhs.contains_x() {
        constant(lhs)?;
        return Some(integrate(rhs)?.map(|f| lhs.clone() * f));
    }
    polynomial_times_kernel(&Polynomial::from_expr(lhs)?, rhs)
}

fn integrate_quotient(lhs: &Expr, rhs: &Expr) -> Option<Antiderivative> {
    if !rhs.contains_x() {
        constant(rhs).filter(|c| *c != 0.)?;
        return Some(integrate(lhs)?.map(|f| f / rhs.clone()));
    }
    if lhs.contains_x() {
        return None;
    }
    constant(lhs)?;

    let reciprocal = match rhs {
        Expr::Pow(base, exponent) => {
            power_of_linear(base, Linear::of(base)?, -constant(exponent)?)
        }
        _ => power_of_linear(rhs, Linear::of(rhs)?, -1.),
    };
    Some(reciprocal.map(|f| lhs.clone() * f))
}

fn integrate_power(base: &Expr, exponent: &Expr) -> Option<Antiderivative> {
    if !exponent.contains_x() {
        let k = constant(exponent)?;
        return Some(power_of_linear(base, Linear::of(base)?, k));
    }
    if !base.contains_x() {
        let c = constant(base).filter(|c| *c > 0. && *c != 1.)?;
        let rate = Linear::of(exponent)?.alpha * c.ln();
        return Some(Antiderivative::plain(over(base.clone().pow(exponent.clone()), rate)));
    }
    None
}

fn integrate_call(function: Function, argument: &Expr) -> Option<Antiderivative> {
    let linear = Linear::of(argument)?;
    let u = argument.clone();
    let alpha = linear.alpha;

    let result = match function {
        Function::Sin => Antiderivative::plain(over(-Expr::call(Function::Cos, u), alpha)),
        Function::Cos => Antiderivative::plain(over(Expr::call(Function::Sin, u), alpha)),
        Function::Exp => Antiderivative::plain(over(Expr::call(Function::Exp, u), alpha)),
        Function::Tan => {
            let log_abs_cos = Expr::call(
                Function::Log,
                Expr::call(Function::Abs, Expr::call(Function::Cos, u)),
            );
            Antiderivative::constrained(over(-log_abs_cos, alpha), Constraint::CosNonZero(linear))
        }
        Function::Log => {
            let u_log_u = u.clone() * Expr::call(Function::Log, u.clone());
            Antiderivative::constrained(over(u_log_u - u, alpha), Constraint::Positive(linear))
        }
        Function::Sqrt => {
            let raised = u.pow(Expr::Number(1.5));
            Antiderivative::constrained(over(raised, 1.5 * alpha), Constraint::NonNegative(linear))
        }
        Function::Abs => return None,
    };
    Some(result)
}

fn integrate(expr: &Expr) -> Option<Antiderivative> {
    if let Some(polynomial) = Polynomial::from_expr(expr) {
        return Some(Antiderivative::plain(polynomial.antiderivative().to_expr()));
    }

    match expr {
        Expr::Neg(inner) => Some(integrate(inner)?.map(|f| -f)),
        Expr::Add(lhs, rhs) => Some(integrate(lhs)?.combine(integrate(rhs)?, |f, g| f + g)),
        Expr::Sub(lhs, rhs) => Some(integrate(lhs)?.combine(integrate(rhs)?, |f, g| f - g)),
        Expr::Mul(lhs, rhs) => integrate_product(lhs, rhs).or_else(|| integrate_product(rhs, lhs)),
        Expr::Div(lhs, rhs) => integrate_quotient(lhs, rhs),
        Expr::Pow(base, exponent) => integrate_power(base, exponent),
        Expr::Call(function, argument) => integrate_call(*function, argument),
        Expr::Number(_) | Expr::Constant(_) | Expr::X => None,
    }
}

/// Closed-form antiderivative of `expression`, without the constant of
/// integration.
pub fn antiderivative(expression: &CompiledExpression) -> Option<Expr> {
    integrate(expression.ast()).map(|f| f.expr)
}

pub fn definite_integral(expression: &CompiledExpression, support: (f64, f64)) -> Analytical {
    let Some(antiderivative) = integrate(expression.ast()) else {
        debug!("no closed form for `{}`", expression.source());
        return Analytical::Unavailable;
    };

    if let Some(violated) = antiderivative.constraints.iter().find(|c| !c.holds(support)) {
        debug!(
            "closed form of `{}` is singular on {:?}: {:?}",
            expression.source(),
            support,
            violated
        );
        return Analytical::Unavailable;
    }

    let (a, b) = support;
    match (antiderivative.expr.eval(b), antiderivative.expr.eval(a)) {
        (Ok(upper), Ok(lower)) if (upper - lower).is_finite() => Analytical::Value(upper - lower),
        (upper, lower) => {
            debug!(
                "cannot evaluate `{}` at the bounds: {:?}, {:?}",
                antiderivative.expr, upper, lower
            );
            Analytical::Unavailable
        }
    }
}

pub fn try_integrate(expression: &str, a: f64, b: f64) -> Analytical {
    match compile(expression) {
        Ok(compiled) => definite_integral(&compiled, (a, b)),
        Err(error) => {
            debug!("{error}");
            Analytical::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use std::f64::consts::E;

    fn value(expression: &str, a: f64, b: f64) -> f64 {
        match try_integrate(expression, a, b) {
            Analytical::Value(value) => value,
            Analytical::Unavailable => panic!("no closed form for {expression}"),
        }
    }

    #[test]
    fn test_identity() {
        assert_relative_eq!(value("x", 0., 1.), 0.5);
    }

    #[test]
    fn test_polynomials() {
        assert_relative_eq!(value("x^2", 0., 2.), 8. / 3.);
        assert_relative_eq!(value("(x + 1)^3", 0., 1.), 3.75);
        assert_relative_eq!(value("3*x^2 - 2*x + pi", -1., 1.), 2. + 2. * PI);
        assert_relative_eq!(value("x*x/2", 0., 3.), 4.5);
        assert_relative_eq!(value("7", 2., 5.), 21.);
    }

    #[test]
    fn test_elementary_functions() {
        assert_relative_eq!(value("sin(x)", 0., PI), 2., epsilon = 1e-12);
        assert_relative_eq!(value("cos(2*x)", 0., PI / 4.), 0.5, epsilon = 1e-12);
        assert_relative_eq!(value("exp(x)", 0., 1.), E - 1.);
        assert_relative_eq!(value("e^x", 0., 1.), E - 1.);
        assert_relative_eq!(value("2^x", 0., 1.), 1. / 2f64.ln());
        assert_relative_eq!(value("log(x)", 1., E), 1., epsilon = 1e-12);
        assert_relative_eq!(value("sqrt(x)", 0., 4.), 16. / 3.);
        assert_relative_eq!(value("tan(x)", 0., 1.), -(1f64.cos().ln()));
    }

    #[test]
    fn test_reciprocals() {
        assert_relative_eq!(value("1/x", 1., E), 1.);
        assert_relative_eq!(value("3/(2*x + 1)", 0., 1.), 1.5 * 3f64.ln());
        assert_relative_eq!(value("x^-2", 1., 2.), 0.5);
        assert_relative_eq!(value("1/x^2", 1., 2.), 0.5);
    }

    #[test]
    fn test_integration_by_parts() {
        assert_relative_eq!(value("x*exp(x)", 0., 1.), 1., epsilon = 1e-12);
        assert_relative_eq!(
            value("x^2*cos(x)", 0., PI / 2.),
            PI * PI / 4. - 2.,
            epsilon = 1e-12
        );
        assert_relative_eq!(value("sin(x)*x", 0., PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_combinations() {
        assert_relative_eq!(value("2*sin(x) - x/2", 0., PI), 4. - PI * PI / 4., epsilon = 1e-12);
        assert_relative_eq!(value("-exp(x)/2", 0., 1.), (1. - E) / 2.);
    }

    #[test]
    fn test_singular_intervals_are_unavailable() {
        assert_eq!(try_integrate("1/x", -1., 1.), Analytical::Unavailable);
        assert_eq!(try_integrate("1/x", -1., 2.), Analytical::Unavailable);
        assert_eq!(try_integrate("x^-2", -1., 1.), Analytical::Unavailable);
        assert_eq!(try_integrate("tan(x)", 0., 2.), Analytical::Unavailable);
        assert_eq!(try_integrate("log(x)", -1., 1.), Analytical::Unavailable);
        assert_eq!(try_integrate("sqrt(x)", -1., 1.), Analytical::Unavailable);
    }

    #[test]
    fn test_unsupported_or_malformed_is_unavailable() {
        for expression in ["x +", "sin(x^2)", "exp(x^2)", "x^x", "foo(x)", "1/sin(x)"] {
            assert_eq!(try_integrate(expression, 0.5, 1.), Analytical::Unavailable);
        }
    }

    #[test]
    fn test_zero_width_interval() {
        assert_eq!(try_integrate("x^2", 1., 1.), Analytical::Value(0.));
    }

    #[test]
    fn test_constant_subexpressions_fold() {
        assert_relative_eq!(value("sin(pi/2)*x", 0., 2.), 2., epsilon = 1e-12);
        assert_relative_eq!(value("x/sqrt(4)", 0., 2.), 1.);
        assert_relative_eq!(value("2^0.5", 0., 1.), 2f64.sqrt());
        assert_eq!(try_integrate("x/log(1)", 0., 1.), Analytical::Unavailable);
        assert_eq!(try_integrate("(-2)^0.5", 0., 1.), Analytical::Unavailable);
    }

    #[test]
    fn test_long_sums() {
        let source = vec!["sin(x)"; 200].join(" + ");
        assert_relative_eq!(value(&source, 0., PI), 400., epsilon = 1e-9);
    }

    #[test]
    fn test_antiderivative_display() {
        let f = compile("2*x").unwrap();
        assert_eq!(antiderivative(&f).unwrap().to_string(), "x^2");

        let f = compile("3*x^2 - 1").unwrap();
        assert_eq!(antiderivative(&f).unwrap().to_string(), "-x + x^3");

        let f = compile("cos(x)").unwrap();
        assert_eq!(antiderivative(&f).unwrap().to_string(), "sin(x)");
    }

    #[test]
    fn test_serializes_as_optional_number() {
        assert_eq!(serde_json::to_string(&Analytical::Value(0.5)).unwrap(), "0.5");
        assert_eq!(serde_json::to_string(&Analytical::Unavailable).unwrap(), "null");
    }
}

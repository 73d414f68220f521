use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::analytical::{definite_integral, Analytical};
use crate::config::QuadratureConfig;
use crate::error::{ConfigError, EvalErrorKind, EvaluationError, QuadratureError};
use crate::expression::{compile, CompiledExpression};
use crate::integral::{linspace, Integral, Simpson, Trapezoidal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    #[serde(alias = "trapezoidal", alias = "trapesium")]
    Trapezoid,
    Simpson,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Trapezoid => write!(f, "trapezoid"),
            Rule::Simpson => write!(f, "simpson"),
        }
    }
}

/// How densely to sample the interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Intervals(usize),
    Step(f64),
}

impl Resolution {
    /// Builds a resolution from loosely typed form fields. The interval
    /// count wins when both are given.
    pub fn from_fields(
        n_intervals: Option<f64>,
        h_value: Option<f64>,
    ) -> Result<Resolution, QuadratureError> {
        match (n_intervals, h_value) {
            (Some(n), _) => {
                if !n.is_finite() || n.fract() != 0. || n < 1. {
                    return Err(QuadratureError::invalid(
                        "n_intervals",
                        format!("must be a positive integer, got {n}"),
                    ));
                }
                Ok(Resolution::Intervals(n as usize))
            }
            (None, Some(h)) => Ok(Resolution::Step(h)),
            (None, None) => Err(QuadratureError::invalid(
                "n_intervals",
                "either the interval count or the step width is required",
            )),
        }
    }

    /// Number of subintervals this resolution asks for on `support`.
    pub fn intervals(&self, support: (f64, f64)) -> Result<usize, QuadratureError> {
        match *self {
            Resolution::Intervals(0) => Err(QuadratureError::invalid(
                "n_intervals",
                "must be a positive integer, got 0",
            )),
            Resolution::Intervals(n) => Ok(n),
            Resolution::Step(h) => {
                if !(h.is_finite() && h > 0.) {
                    return Err(QuadratureError::invalid(
                        "h_value",
                        format!("must be greater than 0, got {h}"),
                    ));
                }
                let (a, b) = support;
                let n = ((b - a) / h).round_ties_even();
                if !(n >= 1.) {
                    return Err(QuadratureError::invalid(
                        "h_value",
                        format!("step {h} gives {n} intervals on [{a}, {b}]"),
                    ));
                }
                Ok(n as usize)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRequest {
    pub expression: String,
    pub lower: f64,
    pub upper: f64,
    pub resolution: Resolution,
}

impl QuadratureRequest {
    pub fn new(expression: impl Into<String>, lower: f64, upper: f64, resolution: Resolution) -> Self {
        Self {
            expression: expression.into(),
            lower,
            upper,
            resolution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Node {
    pub index: usize,
    pub x: f64,
    pub fx: f64,
    pub weight: u32,
}

/// Distance of the numeric result from the closed form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorAnalysis {
    pub absolute: f64,
    /// Percent of `|exact|`; absent when the exact value is 0.
    pub relative_percent: Option<f64>,
}

impl ErrorAnalysis {
    pub fn new(approx: f64, exact: f64) -> Self {
        let absolute = (approx - exact).abs();
        let relative_percent = (exact != 0.).then(|| absolute / exact.abs() * 100.);
        Self {
            absolute,
            relative_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuadratureResult {
    pub rule: Rule,
    pub expression: String,
    pub approx_value: f64,
    pub analytical: Analytical,
    pub error: Option<ErrorAnalysis>,
    pub node_table: Vec<Node>,
    pub smooth_curve: Vec<(f64, f64)>,
    pub resolution_requested: usize,
    pub resolution_used: usize,
    pub step_used: f64,
}

impl QuadratureResult {
    pub fn smooth_curve_x(&self) -> Vec<f64> {
        self.smooth_curve.iter().map(|&(x, _)| x).collect()
    }

    pub fn smooth_curve_y(&self) -> Vec<f64> {
        self.smooth_curve.iter().map(|&(_, y)| y).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Quadrature {
    config: QuadratureConfig,
}

impl Quadrature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QuadratureConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    pub fn config(&self) -> &QuadratureConfig {
        &self.config
    }

    pub fn trapezoid(
        &self,
        expression: &str,
        lower: f64,
        upper: f64,
        resolution: Resolution,
    ) -> Result<QuadratureResult, QuadratureError> {
        self.compute(Rule::Trapezoid, &QuadratureRequest::new(expression, lower, upper, resolution))
    }

    pub fn simpson(
        &self,
        expression: &str,
        lower: f64,
        upper: f64,
        resolution: Resolution,
    ) -> Result<QuadratureResult, QuadratureError> {
        self.compute(Rule::Simpson, &QuadratureRequest::new(expression, lower, upper, resolution))
    }

    pub fn compute(
        &self,
        rule: Rule,
        request: &QuadratureRequest,
    ) -> Result<QuadratureResult, QuadratureError> {
        match rule {
            Rule::Trapezoid => self.run(rule, &Trapezoidal, request),
            Rule::Simpson => self.run(
                rule,
                &Simpson {
                    cap: self.config.simpson_cap,
                },
                request,
            ),
        }
    }

    fn run<I>(
        &self,
        rule: Rule,
        integral: &I,
        request: &QuadratureRequest,
    ) -> Result<QuadratureResult, QuadratureError>
    where
        I: Integral,
    {
        let support = (request.lower, request.upper);
        let (a, b) = support;
        if !a.is_finite() {
            return Err(QuadratureError::invalid("lower_bound", format!("must be finite, got {a}")));
        }
        if !b.is_finite() {
            return Err(QuadratureError::invalid("upper_bound", format!("must be finite, got {b}")));
        }

        let requested = request.resolution.intervals(support)?;
        if requested > self.config.max_intervals {
            return Err(QuadratureError::invalid(
                "n_intervals",
                format!("{requested} intervals exceed the limit of {}", self.config.max_intervals),
            ));
        }

        let n = integral.intervals(requested);
        if n != requested {
            warn!("{rule} rule needs an even interval count, using n = {n} instead of {requested}");
        }

        let compiled = compile(&request.expression)?;
        let h = (b - a) / n as f64;

        let xs = linspace(support, n + 1);
        let values = sample(&compiled, &xs)?;
        let approx_value = integral.weighted_sum(&values, h);
        if !approx_value.is_finite() {
            return Err(EvaluationError::new(
                request.expression.as_str(),
                EvalErrorKind::NonFinite {
                    operation: "quadrature sum",
                },
            )
            .into());
        }

        let node_table = xs
            .iter()
            .zip(&values)
            .enumerate()
            .map(|(index, (&x, &fx))| Node {
                index,
                x,
                fx,
                weight: integral.weight(index, n),
            })
            .collect();

        let smooth_xs = linspace(support, self.config.smooth_points);
        let smooth_ys = sample(&compiled, &smooth_xs)?;
        let smooth_curve = smooth_xs.into_iter().zip(smooth_ys).collect();

        let analytical = definite_integral(&compiled, support);
        let error = analytical
            .value()
            .map(|exact| ErrorAnalysis::new(approx_value, exact));

        debug!(
            "{rule} rule for `{}` on [{a}, {b}]: n = {n}, h = {h}, result = {approx_value}, analytical = {:?}",
            request.expression,
            analytical.value()
        );

        Ok(QuadratureResult {
            rule,
            expression: request.expression.clone(),
            approx_value,
            analytical,
            error,
            node_table,
            smooth_curve,
            resolution_requested: requested,
            resolution_used: n,
            step_used: h,
        })
    }
}

fn sample(expression: &CompiledExpression, xs: &[f64]) -> Result<Vec<f64>, QuadratureError> {
    xs.iter()
        .map(|&x| expression.evaluate(x).map_err(QuadratureError::from))
        .collect()
}

pub fn compute(rule: Rule, request: &QuadratureRequest) -> Result<QuadratureResult, QuadratureError> {
    Quadrature::new().compute(rule, request)
}

pub fn compute_trapezoid(
    expression: &str,
    lower: f64,
    upper: f64,
    resolution: Resolution,
) -> Result<QuadratureResult, QuadratureError> {
    Quadrature::new().trapezoid(expression, lower, upper, resolution)
}

pub fn compute_simpson(
    expression: &str,
    lower: f64,
    upper: f64,
    resolution: Resolution,
) -> Result<QuadratureResult, QuadratureError> {
    Quadrature::new().simpson(expression, lower, upper, resolution)
}

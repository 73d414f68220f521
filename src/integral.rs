/// A composite Newton-Cotes rule over evenly spaced nodes.
///
/// The approximation is `scale(h) * Σ weight(i, n) * f(xᵢ)` for nodes
/// `x₀ = a, …, xₙ = b`.
pub trait Integral {
    /// Number of subintervals the rule uses when `requested` are asked for.
    fn intervals(&self, requested: usize) -> usize;

    fn weight(&self, index: usize, n: usize) -> u32;

    fn scale(&self, h: f64) -> f64;

    fn weighted_sum(&self, values: &[f64], h: f64) -> f64 {
        if values.len() < 2 {
            return 0.;
        }
        let n = values.len() - 1;
        let sum: f64 = values
            .iter()
            .enumerate()
            .map(|(i, fx)| self.weight(i, n) as f64 * fx)
            .sum();
        self.scale(h) * sum
    }

    fn integrate<F>(&self, f: F, support: (f64, f64), n: usize) -> f64
    where
        F: Fn(f64) -> f64,
    {
        let n = self.intervals(n);
        let (a, b) = support;
        let values: Vec<f64> = linspace(support, n + 1).into_iter().map(f).collect();
        self.weighted_sum(&values, (b - a) / n as f64)
    }
}

pub struct Trapezoidal;

impl Integral for Trapezoidal {
    fn intervals(&self, requested: usize) -> usize {
        requested
    }

    fn weight(&self, index: usize, n: usize) -> u32 {
        if index == 0 || index == n {
            1
        } else {
            2
        }
    }

    fn scale(&self, h: f64) -> f64 {
        h / 2.
    }
}

/// Simpson's 1/3 rule. An odd interval count is bumped to the next even
/// number, but never above `cap` rounded down to an even number (at least 2).
pub struct Simpson {
    pub cap: usize,
}

impl Integral for Simpson {
    fn intervals(&self, requested: usize) -> usize {
        if requested % 2 == 0 {
            requested
        } else {
            let cap = (self.cap - self.cap % 2).max(2);
            (requested + 1).min(cap)
        }
    }

    fn weight(&self, index: usize, n: usize) -> u32 {
        if index == 0 || index == n {
            1
        } else if index % 2 == 1 {
            4
        } else {
            2
        }
    }

    fn scale(&self, h: f64) -> f64 {
        h / 3.
    }
}

/// `count` evenly spaced points from `a` to `b`, both included.
pub fn linspace(support: (f64, f64), count: usize) -> Vec<f64> {
    let (a, b) = support;
    match count {
        0 => Vec::new(),
        1 => vec![a],
        _ => {
            let step = (b - a) / (count - 1) as f64;
            let mut points: Vec<f64> = (0..count).map(|i| a + step * i as f64).collect();
            points[count - 1] = b;
            points
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use peroxide::numerical::integral::newton_cotes_quadrature;

    #[test]
    fn test_linspace_hits_endpoints() {
        let points = linspace((0., 2.), 5);
        assert_eq!(points, vec![0., 0.5, 1., 1.5, 2.]);

        let points = linspace((0.1, 0.7), 100);
        assert_eq!(points.len(), 100);
        assert_eq!(points[0], 0.1);
        assert_eq!(points[99], 0.7);
    }

    #[test]
    fn test_trapezoidal_weights() {
        let weights: Vec<u32> = (0..=4).map(|i| Trapezoidal.weight(i, 4)).collect();
        assert_eq!(weights, vec![1, 2, 2, 2, 1]);
    }

    #[test]
    fn test_simpson_weights() {
        let weights: Vec<u32> = (0..=6).map(|i| Simpson { cap: 1000 }.weight(i, 6)).collect();
        assert_eq!(weights, vec![1, 4, 2, 4, 2, 4, 1]);
    }

    #[test]
    fn test_simpson_intervals() {
        let simpson = Simpson { cap: 1000 };
        assert_eq!(simpson.intervals(4), 4);
        assert_eq!(simpson.intervals(5), 6);
        assert_eq!(simpson.intervals(1), 2);
        assert_eq!(simpson.intervals(999), 1000);
        assert_eq!(simpson.intervals(1001), 1000);
        assert_eq!(simpson.intervals(1002), 1002);
    }

    #[test]
    fn test_simpson_cap_stays_even() {
        assert_eq!(Simpson { cap: 3 }.intervals(3), 2);
        assert_eq!(Simpson { cap: 3 }.intervals(5), 2);
        assert_eq!(Simpson { cap: 0 }.intervals(1), 2);
        assert_eq!(Simpson { cap: 0 }.intervals(7), 2);

        let result = Simpson { cap: 3 }.integrate(|x| x * x, (0., 3.), 3);
        assert_relative_eq!(result, 9., epsilon = 1e-12);
    }

    #[test]
    fn test_trapezoidal_square() {
        let result = Trapezoidal.integrate(|x| x * x, (0., 2.), 4);
        assert_relative_eq!(result, 2.75);
    }

    #[test]
    fn test_simpson_exact_for_cubics() {
        let simpson = Simpson { cap: 1000 };
        let cubic = |x: f64| x.powi(3) - 2. * x + 1.;

        let result = simpson.integrate(cubic, (-1., 3.), 2);
        let reference = newton_cotes_quadrature(cubic, 4, (-1., 3.));

        assert_relative_eq!(result, 16., epsilon = 1e-12);
        assert_relative_eq!(result, reference, epsilon = 1e-9);
    }

    #[test]
    fn test_against_newton_cotes() {
        let f = |x: f64| x.sin();
        let reference = newton_cotes_quadrature(f, 8, (0., 2.));

        let simpson = Simpson { cap: 1000 }.integrate(f, (0., 2.), 200);
        let trapezoid = Trapezoidal.integrate(f, (0., 2.), 2000);

        assert_relative_eq!(simpson, reference, epsilon = 1e-6);
        assert_relative_eq!(trapezoid, reference, epsilon = 1e-6);
    }

    #[test]
    fn test_reversed_support_flips_sign() {
        let forward = Trapezoidal.integrate(|x| x.exp(), (0., 1.), 16);
        let backward = Trapezoidal.integrate(|x| x.exp(), (1., 0.), 16);
        assert_relative_eq!(forward, -backward, epsilon = 1e-12);
    }
}

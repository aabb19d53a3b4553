//! Single-axis polynomials
//!
//! Coefficients are stored by ascending power, so `coeffs[k]` multiplies
//! `t^k`. Derivative evaluation is closed-form; no coefficient vectors are
//! materialized per call.

use serde::{Deserialize, Serialize};

/// A polynomial in one variable, represented by its coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial from ascending-power coefficients.
    ///
    /// An empty coefficient list is the zero polynomial.
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    /// Number of coefficients (degree + 1 for a nonzero polynomial).
    pub fn num_coeffs(&self) -> usize {
        self.coeffs.len()
    }

    /// Ascending-power coefficients.
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Evaluate the polynomial at `t` (Horner).
    pub fn eval(&self, t: f64) -> f64 {
        self.coeffs
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    /// Evaluate the `order`-th derivative at `t`.
    ///
    /// Order 0 is the polynomial itself. Orders beyond the degree are zero.
    pub fn eval_derivative(&self, t: f64, order: usize) -> f64 {
        if order == 0 {
            return self.eval(t);
        }
        if order >= self.coeffs.len() {
            return 0.0;
        }
        // d^m/dt^m t^k = k!/(k-m)! t^(k-m)
        let mut acc = 0.0;
        for k in (order..self.coeffs.len()).rev() {
            acc = acc * t + self.coeffs[k] * falling_factorial(k, order);
        }
        acc
    }
}

/// k · (k-1) · … · (k-m+1) as f64.
pub(crate) fn falling_factorial(k: usize, m: usize) -> f64 {
    ((k - m + 1)..=k).map(|v| v as f64).product()
}

/// Basis row for constraint assembly: the `order`-th derivative of each
/// monomial `t^k`, `k = 0..num_coeffs`, evaluated at `t`.
pub(crate) fn basis_row(num_coeffs: usize, order: usize, t: f64, out: &mut [f64]) {
    debug_assert_eq!(out.len(), num_coeffs);
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = if k < order {
            0.0
        } else {
            falling_factorial(k, order) * t.powi((k - order) as i32)
        };
    }
}

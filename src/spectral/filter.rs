//! Modal filters
//!
//! A modal filter damps high-frequency modes after each explicit update to
//! keep aliasing errors from the nonlinear terms under control. The filter
//! sees a normalised frequency `x` in `[0, 1]`, where `x = 1` is the largest
//! radius present on the grid.

use num_complex::Complex64;

use super::FrequencyLookup;

/// Number of samples in the tabulated Vandeven filter
const VANDEVEN_SAMPLES: usize = 1000;

/// Damping factor as a function of normalised frequency
pub trait ModalFilter: Send + Sync {
    /// Factor applied to a mode with normalised frequency `x`
    fn eval(&self, x: f64) -> f64;
}

impl<F> ModalFilter for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn eval(&self, x: f64) -> f64 {
        self(x)
    }
}

/// Normalised radius of a frequency vector
///
/// Each component lies in `[-0.5, 0.5]`, so the largest radius on a
/// `d`-dimensional grid is `0.5 * sqrt(d)`. The result is clamped to 1.
pub fn normalized_frequency(freq: &[f64]) -> f64 {
    if freq.is_empty() {
        return 0.0;
    }
    let radius = freq.iter().map(|f| f * f).sum::<f64>().sqrt();
    let max_radius = 0.5 * (freq.len() as f64).sqrt();
    (radius / max_radius).min(1.0)
}

/// Multiply every mode of `data` by the filter factor of its frequency
pub fn apply_modal_filter(filter: &dyn ModalFilter, freq: &dyn FrequencyLookup, data: &mut [Complex64]) {
    for (node, value) in data.iter_mut().enumerate() {
        let x = normalized_frequency(&freq.freq(node));
        *value *= filter.eval(x);
    }
}

// =================================================================================================
// Vandeven Filter
// =================================================================================================

/// Vandeven filter of integer order `p`
///
/// ```text
/// σ(x) = 1 - Γ(2p) / Γ(p)² ∫₀ˣ [t(1-t)]^(p-1) dt
/// ```
///
/// The integral is tabulated on a uniform grid at construction and linearly
/// interpolated on evaluation. `σ(0) = 1` and `σ(1) = 0`.
#[derive(Debug, Clone)]
pub struct Vandeven {
    order: u32,
    table: Vec<f64>,
}

impl Vandeven {
    /// Tabulate the filter of the given order
    ///
    /// # Errors
    ///
    /// Returns an error if `order` is zero.
    pub fn new(order: u32) -> Result<Self, String> {
        if order == 0 {
            return Err("Vandeven filter order must be at least 1".to_string());
        }

        let p = order as i32;
        let prefactor = factorial(2 * order - 1) / (factorial(order - 1) * factorial(order - 1));
        let dx = 1.0 / (VANDEVEN_SAMPLES - 1) as f64;

        let integrand = |t: f64| (t * (1.0 - t)).powi(p - 1);

        let mut table = Vec::with_capacity(VANDEVEN_SAMPLES);
        table.push(1.0);
        let mut integral = 0.0;
        for i in 1..VANDEVEN_SAMPLES {
            let a = (i - 1) as f64 * dx;
            let b = i as f64 * dx;
            // Simpson on each sub-interval
            integral += (b - a) / 6.0 * (integrand(a) + 4.0 * integrand(0.5 * (a + b)) + integrand(b));
            table.push((1.0 - prefactor * integral).clamp(0.0, 1.0));
        }

        Ok(Self { order, table })
    }

    pub fn order(&self) -> u32 {
        self.order
    }
}

impl ModalFilter for Vandeven {
    fn eval(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        let last = self.table.len() - 1;
        let position = x * last as f64;
        let idx = position.floor() as usize;
        if idx >= last {
            return self.table[last];
        }
        let weight = position - idx as f64;
        self.table[idx] * (1.0 - weight) + self.table[idx + 1] * weight
    }
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

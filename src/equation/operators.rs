//! Node-wise operators shared by compiled terms

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::spectral::FrequencyLookup;

/// Tolerance under which a power is treated as an integer
const INTEGER_POWER_TOLERANCE: f64 = 1e-12;

/// Raise a complex value to a real power
///
/// Integer powers go through repeated multiplication, so `(-4)^2` stays
/// exactly `16` without picking up a branch-cut imaginary part.
pub fn complex_pow(value: Complex64, power: f64) -> Complex64 {
    if power == 1.0 {
        return value;
    }
    let rounded = power.round();
    if (power - rounded).abs() < INTEGER_POWER_TOLERANCE && rounded.abs() <= i32::MAX as f64 {
        value.powi(rounded as i32)
    } else {
        value.powf(power)
    }
}

/// Fourier symbol of `LAP^power` at a node with squared frequency norm `k2`
///
/// ```rust
/// use spectral_pf::equation::laplacian_symbol;
/// use std::f64::consts::PI;
///
/// assert_eq!(laplacian_symbol(0.0, 1), 0.0);
/// let k2 = 0.125;
/// assert!((laplacian_symbol(k2, 1) + 4.0 * PI * PI * k2).abs() < 1e-12);
/// ```
pub fn laplacian_symbol(k2: f64, power: i32) -> f64 {
    (-4.0 * PI * PI * k2).powi(power)
}

/// Multiply every node by the Laplacian symbol of its frequency
pub fn apply_laplacian(power: i32, freq: &dyn FrequencyLookup, data: &mut [Complex64]) {
    if power == 0 {
        return;
    }
    for (node, value) in data.iter_mut().enumerate() {
        *value *= laplacian_symbol(freq.freq_norm_sq(node), power);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_integer_powers_are_exact() {
        let value = Complex64::new(-4.0, 0.0);
        assert_eq!(complex_pow(value, 2.0), Complex64::new(16.0, 0.0));
        assert_eq!(complex_pow(value, 3.0), Complex64::new(-64.0, 0.0));
        assert_relative_eq!(complex_pow(value, -2.0).re, 1.0 / 16.0);
    }

    #[test]
    fn test_fractional_power() {
        let value = Complex64::new(4.0, 0.0);
        let root = complex_pow(value, 0.5);
        assert_relative_eq!(root.re, 2.0, epsilon = 1e-12);
        assert_relative_eq!(root.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_laplacian_powers() {
        // freq(i) = [i, i] gives |k|² = 2 i²
        let freq = |i: usize| vec![i as f64, i as f64];
        let mut data = vec![Complex64::new(1.0, 0.0); 2];

        apply_laplacian(1, &freq, &mut data);
        assert_eq!(data[0].re, 0.0);
        assert_relative_eq!(data[1].re, -2.0 * 4.0 * PI * PI);

        let mut data = vec![Complex64::new(1.0, 0.0); 2];
        apply_laplacian(2, &freq, &mut data);
        assert_relative_eq!(data[1].re, (2.0 * 4.0 * PI * PI).powi(2));
    }
}

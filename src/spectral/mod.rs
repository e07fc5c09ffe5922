//! Spectral transforms
//!
//! This module provides the Fourier machinery the engine is built on.
//! Every field lives on a periodic grid; differential operators become
//! per-node multiplications once a field is transformed to frequency space.
//!
//! # Core Concepts
//!
//! - **Frequency lookup** (`FrequencyLookup`): maps a flat node index to its
//!   fractional frequency vector, one component per axis, in `[-0.5, 0.5]`
//! - **Spectral transform** (`SpectralTransform`): in-place forward and
//!   inverse transform over the whole grid
//! - **Modal filter** (`ModalFilter`): damping factor applied to each mode
//!   after an update
//!
//! # Normalisation
//!
//! Neither direction is normalised. After an inverse transform the caller
//! divides by the number of nodes:
//!
//! ```rust
//! use spectral_pf::spectral::{FourierTransform, SpectralTransform};
//! use num_complex::Complex64;
//!
//! let mut ft = FourierTransform::new(&[4, 4]).unwrap();
//! let mut data = vec![Complex64::new(1.0, 0.0); 16];
//! ft.fft(&mut data);
//! ft.ifft(&mut data);
//! let n = data.len() as f64;
//! assert!((data[3].re / n - 1.0).abs() < 1e-12);
//! ```

// =================================================================================================
// Module Declarations
// =================================================================================================

mod fft;
mod filter;

pub use fft::FourierTransform;
pub use filter::{apply_modal_filter, normalized_frequency, ModalFilter, Vandeven};

use num_complex::Complex64;

// =================================================================================================
// Frequency Lookup
// =================================================================================================

/// Frequency provider for a flat node index
///
/// Terms only need to know *which* wave vector a node carries. Keeping this
/// separate from the transform itself allows terms to be evaluated against a
/// synthetic table in tests:
///
/// ```rust
/// use spectral_pf::spectral::FrequencyLookup;
///
/// let freq = |i: usize| vec![i as f64, i as f64];
/// assert_eq!(freq.freq_norm_sq(2), 8.0);
/// ```
pub trait FrequencyLookup {
    /// Fractional frequency of `node` along every axis
    fn freq(&self, node: usize) -> Vec<f64>;

    /// Squared Euclidean norm of the frequency vector of `node`
    fn freq_norm_sq(&self, node: usize) -> f64 {
        self.freq(node).iter().map(|f| f * f).sum()
    }
}

impl<F> FrequencyLookup for F
where
    F: Fn(usize) -> Vec<f64>,
{
    fn freq(&self, node: usize) -> Vec<f64> {
        self(node)
    }
}

// =================================================================================================
// Spectral Transform
// =================================================================================================

/// In-place discrete Fourier transform over an N-dimensional periodic grid
///
/// Implementations own whatever scratch space they need, so both directions
/// take `&mut self`. A single transform must not be driven from two logical
/// steps at once.
pub trait SpectralTransform: FrequencyLookup + Send + Sync {
    /// Forward transform (unnormalised)
    fn fft(&mut self, data: &mut [Complex64]);

    /// Inverse transform (unnormalised, divide by `num_nodes()` afterwards)
    fn ifft(&mut self, data: &mut [Complex64]);

    /// Grid extent along every axis
    fn dimensions(&self) -> &[usize];

    /// Total number of grid nodes
    fn num_nodes(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// The transform seen as a plain frequency provider
    fn frequencies(&self) -> &dyn FrequencyLookup;
}

//! N-dimensional FFT backed by `rustfft`
//!
//! The grid is stored row-major (last axis fastest), which is the layout
//! `ndarray` uses by default. A multi-dimensional transform is a sequence of
//! 1D transforms, one pass per axis, each pass running over every lane of
//! that axis.

use std::sync::Arc;

use ndarray::{ArrayViewMutD, Axis, IxDyn};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::{FrequencyLookup, SpectralTransform};

/// Largest grid dimensionality accepted by the engine
pub const MAX_DIMENSIONS: usize = 3;

// =================================================================================================
// Fourier Transform
// =================================================================================================

/// Complex-to-complex FFT over a periodic grid
///
/// # Frequencies
///
/// Node `i` is unravelled into one index per axis. The fractional frequency
/// along an axis of length `n` is `index / n`, folded by `-1` when it exceeds
/// one half, so values lie in `[-0.5, 0.5]`.
///
/// # Example
///
/// ```rust
/// use spectral_pf::spectral::{FourierTransform, FrequencyLookup};
///
/// let ft = FourierTransform::new(&[4, 4]).unwrap();
/// assert_eq!(ft.freq(0), vec![0.0, 0.0]);
/// assert_eq!(ft.freq(3), vec![0.0, -0.25]);
/// assert_eq!(ft.freq(4), vec![0.25, 0.0]);
/// ```
pub struct FourierTransform {
    dimensions: Vec<usize>,
    forward: Vec<Arc<dyn Fft<f64>>>,
    inverse: Vec<Arc<dyn Fft<f64>>>,
    lane: Vec<Complex64>,
    scratch: Vec<Complex64>,
    norm_sq: Vec<f64>,
}

impl FourierTransform {
    /// Plan forward and inverse transforms for a grid of the given extent
    ///
    /// # Errors
    ///
    /// Returns an error if the grid has no axis, more than three axes, or an
    /// axis of length zero.
    pub fn new(dimensions: &[usize]) -> Result<Self, String> {
        if dimensions.is_empty() || dimensions.len() > MAX_DIMENSIONS {
            return Err(format!(
                "Unsupported grid dimensionality {} (expected 1 to {})",
                dimensions.len(),
                MAX_DIMENSIONS
            ));
        }
        if dimensions.contains(&0) {
            return Err(format!("Grid extent {:?} contains an empty axis", dimensions));
        }

        let mut planner = FftPlanner::<f64>::new();
        let forward: Vec<_> = dimensions.iter().map(|&n| planner.plan_fft_forward(n)).collect();
        let inverse: Vec<_> = dimensions.iter().map(|&n| planner.plan_fft_inverse(n)).collect();

        let scratch_len = forward
            .iter()
            .chain(inverse.iter())
            .map(|plan| plan.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        let mut transform = Self {
            dimensions: dimensions.to_vec(),
            forward,
            inverse,
            lane: Vec::with_capacity(dimensions.iter().copied().max().unwrap_or(0)),
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            norm_sq: Vec::new(),
        };

        let nodes = transform.num_nodes();
        transform.norm_sq = (0..nodes)
            .map(|node| transform.freq(node).iter().map(|f| f * f).sum())
            .collect();

        Ok(transform)
    }

    /// Per-axis indices of a flat node index
    pub fn unravel(&self, node: usize) -> Vec<usize> {
        let mut indices = vec![0; self.dimensions.len()];
        let mut rest = node;
        for (axis, &n) in self.dimensions.iter().enumerate().rev() {
            indices[axis] = rest % n;
            rest /= n;
        }
        indices
    }

    /// Flat node index of per-axis indices
    pub fn ravel(&self, indices: &[usize]) -> usize {
        indices
            .iter()
            .zip(self.dimensions.iter())
            .fold(0, |acc, (&i, &n)| acc * n + i)
    }

    /// Node carrying the negated frequency of `node`
    ///
    /// For real-valued fields the amplitude at the conjugate node is the
    /// complex conjugate of the amplitude at `node`.
    pub fn conjugate_node(&self, node: usize) -> usize {
        let conjugate: Vec<usize> = self
            .unravel(node)
            .iter()
            .zip(self.dimensions.iter())
            .map(|(&i, &n)| (n - i) % n)
            .collect();
        self.ravel(&conjugate)
    }

    fn process(&mut self, data: &mut [Complex64], forward: bool) {
        assert_eq!(
            data.len(),
            self.num_nodes(),
            "Data length does not match the number of grid nodes"
        );

        let mut grid = ArrayViewMutD::from_shape(IxDyn(&self.dimensions), data)
            .expect("grid shape matches the data length checked above");

        for axis in 0..self.dimensions.len() {
            let plan = if forward {
                Arc::clone(&self.forward[axis])
            } else {
                Arc::clone(&self.inverse[axis])
            };

            for mut lane in grid.lanes_mut(Axis(axis)) {
                self.lane.clear();
                self.lane.extend(lane.iter().copied());
                plan.process_with_scratch(&mut self.lane, &mut self.scratch);
                for (dst, src) in lane.iter_mut().zip(self.lane.iter()) {
                    *dst = *src;
                }
            }
        }
    }
}

impl FrequencyLookup for FourierTransform {
    fn freq(&self, node: usize) -> Vec<f64> {
        self.unravel(node)
            .iter()
            .zip(self.dimensions.iter())
            .map(|(&i, &n)| {
                let f = i as f64 / n as f64;
                if f > 0.5 { f - 1.0 } else { f }
            })
            .collect()
    }

    fn freq_norm_sq(&self, node: usize) -> f64 {
        self.norm_sq[node]
    }
}

impl SpectralTransform for FourierTransform {
    fn fft(&mut self, data: &mut [Complex64]) {
        self.process(data, true);
    }

    fn ifft(&mut self, data: &mut [Complex64]) {
        self.process(data, false);
    }

    fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    fn frequencies(&self) -> &dyn FrequencyLookup {
        self
    }
}

impl std::fmt::Debug for FourierTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FourierTransform")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

// =================================================================================================
// Tests
// =================================================================================================

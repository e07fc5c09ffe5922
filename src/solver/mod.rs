//! Time integration of spectral models
//!
//! This module turns a compiled [`Model`] into a trajectory. It separates
//! three concerns:
//!
//! 1. **Time stepper** ([`TimeStepper`]) - HOW one step is taken
//!    - Owns the spectral transform, time step and optional modal filter
//!    - Advances every field by `dt`
//!
//! 2. **Configuration** ([`SolverConfiguration`]) - run parameters
//!    - Scheme selection, time step, Newton-Krylov settings
//!    - Loadable from JSON, validated once
//!
//! 3. **Driver** ([`Solver`]) - the epoch loop
//!    - Runs `nsteps` steps per epoch
//!    - Invokes callbacks and monitors between epochs
//!
//! # Module Organization
//!
//! - **`traits`**: `TimeStepper`, `StepperKind`, `SolverConfiguration`
//! - **`methods`**: `Euler`, `Rk4`, `ImplicitEuler`
//! - **`newton_krylov`**: matrix-free nonlinear solver used by `ImplicitEuler`
//! - **`driver`**: `Solver`
//! - **`monitor`**: `Monitor`, `PointMonitor`
//!
//! # Quick Start Example
//!
//! ```rust
//! use spectral_pf::physics::{Field, Model, Scalar};
//! use spectral_pf::solver::Solver;
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 16, 1.0))?;
//! model.add_scalar(Scalar::new("rate", -0.5))?;
//! model.add_equation("dconc/dt = LAP conc + rate*conc")?;
//!
//! let mut solver = Solver::new(model, &[16], 0.01)?;
//! solver.set_stepper("rk4")?;
//! solver.solve(10, 10)?;
//!
//! let value = solver.model().field("conc").unwrap().get(0).re;
//! assert!((value - (-0.5_f64).exp()).abs() < 1e-3);
//! # Ok(())
//! # }
//! ```
//!
//! # Choosing a Scheme
//!
//! - **Diffusion-dominated problems**: `Euler` or `Rk4`; the linear part is
//!   always treated backward, so `LAP` terms never limit the time step
//! - **Stiff nonlinear or explicit terms**: `ImplicitEuler`, more expensive
//!   per step but stable for much larger steps
//!
//! # Error Handling
//!
//! All operations return `Result<T, String>`. Common errors:
//! - Invalid configuration (non-positive `dt`, unknown scheme)
//! - Field length different from the domain size
//! - Numerical instability caught by [`validate_fields`]
//! - Non-convergence under [`NonConvergencePolicy::Fail`]

// =================================================================================================
// Module Declarations
// =================================================================================================
mod driver;
mod methods;
mod monitor;
pub mod newton_krylov;
mod traits;

// =================================================================================================
// Parallel Execution Threshold
// =================================================================================================
//
// The threshold is stored in an AtomicUsize so that it can be changed at
// runtime (benchmarks, tests) without a mutex on every node-wise update.
// Relaxed ordering is sufficient: the value is a performance hint.
// =================================================================================================

use std::sync::atomic::{AtomicUsize, Ordering};

use num_complex::Complex64;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::physics::Model;

/// Default number of nodes above which [`update_nodes`] switches to rayon
const DEFAULT_PARALLEL_THRESHOLD: usize = 999;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Return the current parallel-execution threshold.
///
/// Node-wise updates run sequentially below this many nodes and switch to
/// rayon above it, only when the crate is compiled with the `parallel`
/// feature.
///
/// ```rust
/// use spectral_pf::solver::parallel_threshold;
///
/// assert!(parallel_threshold() > 0);
/// ```
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Set the parallel-execution threshold to a new value.
///
/// # Panics
///
/// Panics when `threshold == 0`.
///
/// ```rust
/// use spectral_pf::solver::{parallel_threshold, set_parallel_threshold};
///
/// let previous = parallel_threshold();
/// set_parallel_threshold(4096);
/// assert_eq!(parallel_threshold(), 4096);
/// set_parallel_threshold(previous);
/// ```
pub fn set_parallel_threshold(threshold: usize) {
    assert!(threshold > 0, "parallel threshold must be at least 1");
    PARALLEL_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Saves the current threshold and restores it on drop
#[cfg(test)]
pub(crate) struct ThresholdGuard {
    previous: usize,
}

#[cfg(test)]
impl ThresholdGuard {
    pub(crate) fn save(new_value: usize) -> Self {
        let previous = parallel_threshold();
        set_parallel_threshold(new_value);
        Self { previous }
    }
}

#[cfg(test)]
impl Drop for ThresholdGuard {
    fn drop(&mut self) {
        PARALLEL_THRESHOLD.store(self.previous, Ordering::Relaxed);
    }
}

/// Overwrite every node with `f(node, value)`
///
/// Runs on the rayon pool when the `parallel` feature is enabled and the
/// buffer is larger than [`parallel_threshold`].
pub(crate) fn update_nodes<F>(data: &mut [Complex64], f: F)
where
    F: Fn(usize, Complex64) -> Complex64 + Sync + Send,
{
    #[cfg(feature = "parallel")]
    if data.len() > parallel_threshold() {
        data.par_iter_mut().enumerate().for_each(|(j, v)| *v = f(j, *v));
        return;
    }

    data.iter_mut().enumerate().for_each(|(j, v)| *v = f(j, *v));
}

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use driver::{Callback, Solver};
pub use methods::{nonlinear_integral, Euler, ImplicitEuler, NonlinearSolveReport, Rk4};
pub use monitor::{Monitor, PointMonitor};
pub use newton_krylov::{NewtonKrylovOutcome, NewtonKrylovSettings};
pub use traits::{NonConvergencePolicy, SolverConfiguration, StepperKind, TimeStepper};

// =================================================================================================
// Helper Functions
// =================================================================================================

/// Validate every field for numerical issues
///
/// Checks that no field holds NaN or infinite values, which would indicate
/// numerical instability. `epoch` is only used in the message.
///
/// ```rust
/// use spectral_pf::physics::{Field, Model};
/// use spectral_pf::solver::validate_fields;
///
/// let mut model = Model::new();
/// model.add_field(Field::from_real("conc", &[1.0, f64::NAN])).unwrap();
/// assert!(validate_fields(&model, 3).unwrap_err().contains("epoch 3"));
/// ```
pub fn validate_fields(model: &Model, epoch: usize) -> Result<(), String> {
    for field in model.fields() {
        if field.data().iter().any(|v| v.re.is_nan() || v.im.is_nan()) {
            return Err(format!(
                "NaN detected in field '{}' at epoch {}. This indicates numerical instability. \
                 Try reducing the time step or switching to an implicit scheme.",
                field.name(),
                epoch
            ));
        }

        if field.data().iter().any(|v| v.re.is_infinite() || v.im.is_infinite()) {
            return Err(format!(
                "Infinity detected in field '{}' at epoch {}. This indicates numerical overflow. \
                 Try reducing the time step or check the equation for unbounded growth.",
                field.name(),
                epoch
            ));
        }
    }

    Ok(())
}

// =================================================================================================
// Tests
// =================================================================================================

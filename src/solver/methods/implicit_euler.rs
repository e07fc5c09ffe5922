//! Fully implicit Euler with an integrating factor
//!
//! # Mathematical Background
//!
//! Each mode of a field obeys `dy/dt = L y + N(y)`. The linear part is
//! integrated exactly and `N` is interpolated linearly between the start and
//! the end of the step:
//!
//! ```text
//! y_{n+1} = y_n e^{L dt} + ∫₀^dt e^{L (dt - s)} [N_n + s (N_{n+1} - N_n) / dt] ds
//! ```
//!
//! `N_{n+1}` depends on `y_{n+1}`, so the update is a nonlinear system. Its
//! unknowns are the real-space nodal values of every field and its residual
//! is
//!
//! ```text
//! F(x) = x - Re(IFFT(y_{n+1}(x))) / N
//! ```
//!
//! which is solved by [`newton_krylov::solve`](crate::solver::newton_krylov::solve)
//! starting from an exponential Euler guess.
//!
//! # Characteristics
//!
//! - **Order**: second order in `N` (trapezoidal), exact in `L`
//! - **Stability**: A-stable, suited to stiff explicit terms
//! - **Complexity**: one right-hand side evaluation and one transform pair per
//!   residual, several residuals per Krylov vector
//!
//! The modal filter is stored but not applied: filtering the iterate would
//! change the root of the residual.

use nalgebra::DVector;
use num_complex::Complex64;

use super::{evaluate_all, field_buffer, snapshot, Spectra};
use crate::physics::Model;
use crate::solver::newton_krylov::{self, NewtonKrylovSettings};
use crate::solver::{update_nodes, NonConvergencePolicy, TimeStepper};
use crate::spectral::{ModalFilter, SpectralTransform};

/// Below this magnitude of `L` the closed form cancels badly
const SMALL_DENUM: f64 = 1e-5;

/// Integral of the linearly interpolated explicit part over one step
///
/// Closed form of `∫₀^dt e^{λ (dt - s)} (a + b s) ds` with `a = rhs_prev` and
/// `b = (rhs - rhs_prev) / dt`. Falls back to the trapezoidal rule when `λ`
/// is close to zero.
///
/// ```rust
/// use num_complex::Complex64;
/// use spectral_pf::solver::nonlinear_integral;
///
/// let zero = Complex64::new(0.0, 0.0);
/// let one = Complex64::new(1.0, 0.0);
/// // Constant integrand without linear part: dt * rhs
/// let value = nonlinear_integral(zero, one, one, 0.5);
/// assert!((value.re - 0.5).abs() < 1e-12);
/// ```
pub fn nonlinear_integral(denum: Complex64, rhs: Complex64, rhs_prev: Complex64, dt: f64) -> Complex64 {
    let f = (denum * dt).exp();
    if denum.norm() < SMALL_DENUM {
        return (rhs + rhs_prev * f) * (0.5 * dt);
    }
    let a = rhs_prev;
    let b = (rhs - rhs_prev) / dt;
    a * (f - 1.0) / denum + b * (f - denum * dt - 1.0) / (denum * denum)
}

/// Convergence summary of the last nonlinear solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonlinearSolveReport {
    pub converged: bool,
    pub iterations: usize,
    /// Max-norm of the final residual
    pub residual_norm: f64,
}

// =================================================================================================
// Implicit Euler
// =================================================================================================

/// Implicit Euler time stepper solved by Newton-Krylov
pub struct ImplicitEuler {
    dt: f64,
    transform: Box<dyn SpectralTransform>,
    filter: Option<Box<dyn ModalFilter>>,
    steps: usize,
    settings: NewtonKrylovSettings,
    policy: NonConvergencePolicy,
    last_outcome: Option<NonlinearSolveReport>,
}

impl ImplicitEuler {
    /// Create a stepper with default Newton-Krylov settings
    pub fn new(dt: f64, transform: Box<dyn SpectralTransform>) -> Self {
        Self {
            dt,
            transform,
            filter: None,
            steps: 0,
            settings: NewtonKrylovSettings::default(),
            policy: NonConvergencePolicy::default(),
            last_outcome: None,
        }
    }

    pub fn with_settings(mut self, settings: NewtonKrylovSettings, policy: NonConvergencePolicy) -> Self {
        self.settings = settings;
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &NewtonKrylovSettings {
        &self.settings
    }

    /// Outcome of the most recent step, `None` before the first one
    pub fn last_outcome(&self) -> Option<&NonlinearSolveReport> {
        self.last_outcome.as_ref()
    }

    /// Whether a modal filter has been installed
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }
}

/// Write `y e^{L dt} + ∫N` into every field buffer
///
/// Fields must be in frequency space.
fn write_prediction(
    model: &mut Model,
    initial: &Spectra,
    rhs: &Spectra,
    rhs_prev: &Spectra,
    denum: &Spectra,
    dt: f64,
) -> Result<(), String> {
    for (index, start) in initial.iter().enumerate() {
        let (rhs, rhs_prev, denum) = (&rhs[index], &rhs_prev[index], &denum[index]);
        let data = field_buffer(model, index)?;
        update_nodes(data, |j, _| {
            start[j] * (denum[j] * dt).exp() + nonlinear_integral(denum[j], rhs[j], rhs_prev[j], dt)
        });
    }
    Ok(())
}

impl TimeStepper for ImplicitEuler {
    fn step(&mut self, model: &mut Model) -> Result<(), String> {
        let dt = self.dt;
        let time = self.time();
        let start_state = model.real_state()?;

        // ====== Step 1: Explicit parts at the start of the step ======

        model.to_frequency_space(self.transform.as_mut())?;
        let initial = snapshot(model);
        let (rhs_prev, denum_prev) = evaluate_all(model, self.transform.frequencies(), time)?;

        // ====== Step 2: Exponential Euler initial guess ======

        write_prediction(model, &initial, &rhs_prev, &rhs_prev, &denum_prev, dt)?;
        model.to_real_space(self.transform.as_mut())?;
        let guess = DVector::from_vec(model.real_state()?);

        // ====== Step 3: Newton-Krylov solve ======

        let transform = &mut self.transform;
        let residual = |x: &DVector<f64>| -> Result<DVector<f64>, String> {
            model.load_real_state(x.as_slice())?;
            model.to_frequency_space(transform.as_mut())?;
            let (rhs, denum) = evaluate_all(model, transform.frequencies(), time + dt)?;
            write_prediction(model, &initial, &rhs, &rhs_prev, &denum, dt)?;
            model.to_real_space(transform.as_mut())?;
            let predicted = model.real_state()?;
            Ok(x - DVector::from_vec(predicted))
        };
        let outcome = match newton_krylov::solve(&self.settings, residual, guess) {
            Ok(outcome) => outcome,
            Err(err) => {
                model.load_real_state(&start_state)?;
                model.sync_derived_fields()?;
                return Err(format!("Implicit Euler: {}", err));
            }
        };

        let report = NonlinearSolveReport {
            converged: outcome.converged,
            iterations: outcome.iterations,
            residual_norm: outcome.residual_norm,
        };
        self.last_outcome = Some(report);

        // ====== Step 4: Accept or reject the iterate ======

        if !report.converged {
            match self.policy {
                NonConvergencePolicy::Warn => log::warn!(
                    "Implicit Euler: Newton-Krylov did not converge at t = {} after {} iterations (residual {:.3e}), keeping last iterate",
                    time + dt,
                    report.iterations,
                    report.residual_norm
                ),
                NonConvergencePolicy::Fail => {
                    model.load_real_state(&start_state)?;
                    model.sync_derived_fields()?;
                    return Err(format!(
                        "Implicit Euler: Newton-Krylov did not converge at t = {} after {} iterations (residual {:.3e})",
                        time + dt,
                        report.iterations,
                        report.residual_norm
                    ));
                }
            }
        }

        model.load_real_state(outcome.x.as_slice())?;
        model.sync_derived_fields()?;
        self.steps += 1;
        Ok(())
    }

    fn set_filter(&mut self, filter: Box<dyn ModalFilter>) {
        log::warn!("Implicit Euler ignores modal filters");
        self.filter = Some(filter);
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn steps_taken(&self) -> usize {
        self.steps
    }

    fn name(&self) -> &str {
        "Implicit Euler"
    }
}

// =================================================================================================
// Tests
// =================================================================================================

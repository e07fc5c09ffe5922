//! Runge-Kutta 4 with a backward linear part
//!
//! # Mathematical Background
//!
//! The explicit part `N` is integrated with the classical four-stage scheme
//! while the linear coefficient `L` is treated backward at every stage:
//!
//! ```text
//! k₁ = N(y_n, t_n)
//! y⁽ˢ⁾ = (y_n + c_s dt k_{s-1}) / (1 - c_s dt L)      c = (½, ½, 1)
//! k_s = N(y⁽ˢ⁾, t_n + c_s dt)
//!
//! y_{n+1} = (y_n + dt (k₁/6 + k₂/3 + k₃/3 + k₄/6)) / (1 - dt L)
//! ```
//!
//! Each stage state is transformed back to real space so the derived fields
//! (nonlinear products) are recomputed before `k_s` is evaluated.
//!
//! # Characteristics
//!
//! - **Order**: fourth-order in `N` when `L = 0`
//! - **Complexity**: 4 right-hand side evaluations and 4 transform pairs per
//!   step
//!
//! # Example
//!
//! ```rust
//! use spectral_pf::physics::{Field, Model, Scalar};
//! use spectral_pf::solver::{Rk4, TimeStepper};
//! use spectral_pf::spectral::FourierTransform;
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 4, 1.0))?;
//! model.add_scalar(Scalar::new("rate", -1.0))?;
//! model.add_equation("dconc/dt = rate*conc^2")?;
//! model.init()?;
//!
//! let mut rk4 = Rk4::new(0.1, Box::new(FourierTransform::new(&[4])?));
//! rk4.propagate(10, &mut model)?;
//!
//! let value = model.field("conc").unwrap().get(0).re;
//! assert!((value - 0.5).abs() < 1e-5);
//! # Ok(())
//! # }
//! ```

use super::{evaluate_all, field_buffer, filter_fields, snapshot, Spectra};
use crate::physics::Model;
use crate::solver::{update_nodes, TimeStepper};
use crate::spectral::{ModalFilter, SpectralTransform};

/// Stage offsets and weights after the first stage
const STAGES: [(f64, f64); 3] = [(0.5, 1.0 / 3.0), (0.5, 1.0 / 3.0), (1.0, 1.0 / 6.0)];

/// Weight of the first stage
const FIRST_WEIGHT: f64 = 1.0 / 6.0;

// =================================================================================================
// Runge-Kutta 4
// =================================================================================================

/// Four-stage Runge-Kutta time stepper
pub struct Rk4 {
    dt: f64,
    transform: Box<dyn SpectralTransform>,
    filter: Option<Box<dyn ModalFilter>>,
    steps: usize,
}

impl Rk4 {
    /// Create a stepper with time step `dt` over the grid of `transform`
    pub fn new(dt: f64, transform: Box<dyn SpectralTransform>) -> Self {
        Self {
            dt,
            transform,
            filter: None,
            steps: 0,
        }
    }

    /// Set every field to a stage state and return the stage slope
    ///
    /// Fields are in frequency space on entry and on exit.
    fn stage(
        &mut self,
        model: &mut Model,
        initial: &Spectra,
        previous: &Spectra,
        offset: f64,
        time: f64,
    ) -> Result<Spectra, String> {
        let factor = offset * self.dt;
        let (_, denum) = evaluate_all(model, self.transform.frequencies(), time)?;

        for (index, start) in initial.iter().enumerate() {
            let slope = &previous[index];
            let linear = &denum[index];
            let data = field_buffer(model, index)?;
            update_nodes(data, |j, _| (start[j] + slope[j] * factor) / (1.0 - linear[j] * factor));
        }

        // Refresh the derived fields at the stage state
        model.to_real_space(self.transform.as_mut())?;
        model.to_frequency_space(self.transform.as_mut())?;

        let (slopes, _) = evaluate_all(model, self.transform.frequencies(), time + factor)?;
        Ok(slopes)
    }
}

impl TimeStepper for Rk4 {
    fn step(&mut self, model: &mut Model) -> Result<(), String> {
        let dt = self.dt;
        let time = self.time();

        // ====== Step 1: First stage ======

        model.to_frequency_space(self.transform.as_mut())?;
        let initial = snapshot(model);
        let (mut slope, denum) = evaluate_all(model, self.transform.frequencies(), time)?;

        let mut accumulated: Spectra = initial
            .iter()
            .zip(slope.iter())
            .map(|(y, k)| y.iter().zip(k.iter()).map(|(y, k)| y + k * (dt * FIRST_WEIGHT)).collect())
            .collect();

        // ====== Step 2: Remaining stages ======

        for (offset, weight) in STAGES {
            slope = self.stage(model, &initial, &slope, offset, time)?;
            for (sum, k) in accumulated.iter_mut().zip(slope.iter()) {
                for (s, k) in sum.iter_mut().zip(k.iter()) {
                    *s += k * (dt * weight);
                }
            }
        }

        // ====== Step 3: Combine with the backward linear part ======

        for (index, sum) in accumulated.iter().enumerate() {
            let linear = &denum[index];
            let data = field_buffer(model, index)?;
            update_nodes(data, |j, _| sum[j] / (1.0 - linear[j] * dt));
        }

        if let Some(filter) = &self.filter {
            filter_fields(model, filter.as_ref(), self.transform.frequencies());
        }

        // ====== Step 4: Back to real space ======

        model.to_real_space(self.transform.as_mut())?;
        self.steps += 1;
        Ok(())
    }

    fn set_filter(&mut self, filter: Box<dyn ModalFilter>) {
        self.filter = Some(filter);
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn steps_taken(&self) -> usize {
        self.steps
    }

    fn name(&self) -> &str {
        "Runge-Kutta 4"
    }
}

// =================================================================================================
// Tests
// =================================================================================================

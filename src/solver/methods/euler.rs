//! Semi-implicit Euler scheme
//!
//! # Mathematical Background
//!
//! In frequency space every mode of a field obeys
//!
//! ```text
//! dy/dt = N(y) + L y
//! ```
//!
//! Treating the linear part backward and the explicit part forward gives
//!
//! ```text
//! y_{n+1} = (y_n + dt N(y_n)) / (1 - dt L)
//! ```
//!
//! # Characteristics
//!
//! - **Order**: first-order accurate
//! - **Stability**: unconditional for the linear part (`Re L ≤ 0`),
//!   conditional for `N`
//! - **Complexity**: 1 right-hand side evaluation per step
//!
//! Diffusion (`LAP conc`) is therefore stable for any time step, while a
//! stiff reaction written as an explicit term is not.
//!
//! # Example
//!
//! ```rust
//! use spectral_pf::physics::{Field, Model, Scalar};
//! use spectral_pf::solver::{Euler, TimeStepper};
//! use spectral_pf::spectral::FourierTransform;
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 4, 1.0))?;
//! model.add_scalar(Scalar::new("rate", -1.0))?;
//! model.add_equation("dconc/dt = rate*conc")?;
//! model.init()?;
//!
//! let mut euler = Euler::new(0.01, Box::new(FourierTransform::new(&[4])?));
//! euler.propagate(100, &mut model)?;
//!
//! let value = model.field("conc").unwrap().get(0).re;
//! assert!((value - (-1.0_f64).exp()).abs() < 1e-2);
//! # Ok(())
//! # }
//! ```

use super::{evaluate_all, field_buffer, filter_fields};
use crate::physics::Model;
use crate::solver::{update_nodes, TimeStepper};
use crate::spectral::{ModalFilter, SpectralTransform};

// =================================================================================================
// Semi-implicit Euler
// =================================================================================================

/// Semi-implicit Euler time stepper
pub struct Euler {
    dt: f64,
    transform: Box<dyn SpectralTransform>,
    filter: Option<Box<dyn ModalFilter>>,
    steps: usize,
}

impl Euler {
    /// Create a stepper with time step `dt` over the grid of `transform`
    pub fn new(dt: f64, transform: Box<dyn SpectralTransform>) -> Self {
        Self {
            dt,
            transform,
            filter: None,
            steps: 0,
        }
    }
}

impl TimeStepper for Euler {
    fn step(&mut self, model: &mut Model) -> Result<(), String> {
        let dt = self.dt;
        let time = self.time();

        // ====== Step 1: Move to frequency space ======

        model.to_frequency_space(self.transform.as_mut())?;

        // ====== Step 2: Evaluate every right-hand side ======

        // All fields are evaluated at the same state before any is updated
        let (rhs, denum) = evaluate_all(model, self.transform.frequencies(), time)?;

        // ====== Step 3: Update ======

        for (index, (rhs, denum)) in rhs.iter().zip(denum.iter()).enumerate() {
            let data = field_buffer(model, index)?;
            update_nodes(data, |j, y| (y + rhs[j] * dt) / (1.0 - denum[j] * dt));
        }

        if let Some(filter) = &self.filter {
            filter_fields(model, filter.as_ref(), self.transform.frequencies());
        }

        // ====== Step 4: Back to real space ======

        model.to_real_space(self.transform.as_mut())?;

        // Time is derived from the step count, so it does not drift
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
        "Semi-implicit Euler"
    }
}

// =================================================================================================
// Tests
// =================================================================================================

//! Time integration schemes
//!
//! This module contains the concrete implementations of the
//! [`TimeStepper`](crate::solver::TimeStepper) trait.
//!
//! # Available Methods
//!
//! Every scheme splits the right-hand side of a field `y` in frequency space
//! into an explicit part `N(y)` and a linear coefficient `L` (the `denum`):
//!
//! ```text
//! dy/dt = N(y) + L y
//! ```
//!
//! - **[`Euler`]**: semi-implicit Euler, `L` backward and `N` forward
//!   - Order: first
//!   - Cost: 1 right-hand side evaluation per step
//!
//! - **[`Rk4`]**: classical Runge-Kutta on `N` with a backward `L` at every
//!   stage
//!   - Order: fourth in `N`, first in `L`
//!   - Cost: 4 evaluations per step
//!
//! - **[`ImplicitEuler`]**: integrating factor on `L`, trapezoidal quadrature
//!   of `N`, nonlinear system solved by Newton-Krylov
//!   - Cost: one evaluation per residual, several residuals per step
//!   - Use: stiff explicit terms
//!
//! # Representation
//!
//! Every scheme expects the fields in real space when `step` is called and
//! leaves them in real space when it returns.

mod euler;
mod implicit_euler;
mod rk4;

pub use euler::Euler;
pub use implicit_euler::{nonlinear_integral, ImplicitEuler, NonlinearSolveReport};
pub use rk4::Rk4;

use num_complex::Complex64;

use crate::physics::Model;
use crate::spectral::{apply_modal_filter, FrequencyLookup, ModalFilter};

/// One buffer per field, in field order
pub(crate) type Spectra = Vec<Vec<Complex64>>;

/// Explicit parts and linear coefficients of every field
pub(crate) fn evaluate_all(
    model: &Model,
    freq: &dyn FrequencyLookup,
    time: f64,
) -> Result<(Spectra, Spectra), String> {
    let mut rhs = Vec::with_capacity(model.num_fields());
    let mut denum = Vec::with_capacity(model.num_fields());
    for index in 0..model.num_fields() {
        rhs.push(model.get_rhs(index, freq, time)?);
        denum.push(model.get_denum(index, freq, time)?);
    }
    Ok((rhs, denum))
}

/// Copy of every field buffer
pub(crate) fn snapshot(model: &Model) -> Spectra {
    model.fields().map(|field| field.data().to_vec()).collect()
}

/// Mutable buffer of field `index`
pub(crate) fn field_buffer(model: &mut Model, index: usize) -> Result<&mut [Complex64], String> {
    model
        .field_at_mut(index)
        .map(|field| field.data_mut())
        .ok_or_else(|| format!("No field with index {}", index))
}

/// Damp every field with the modal filter
pub(crate) fn filter_fields(model: &mut Model, filter: &dyn ModalFilter, freq: &dyn FrequencyLookup) {
    for index in 0..model.num_fields() {
        if let Some(field) = model.field_at_mut(index) {
            apply_modal_filter(filter, freq, field.data_mut());
        }
    }
}

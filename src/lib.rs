//! spectral-pf: Pseudo-spectral Phase-Field Engine
//!
//! A framework for evolving coupled reaction-diffusion and phase-field
//! equations on periodic grids. Equations are written as text, compiled into
//! per-node closures in Fourier space and advanced by interchangeable time
//! steppers.
//!
//! # Architecture
//!
//! spectral-pf is built on two core principles:
//!
//! 1. **Separation of Physics and Numerics**
//!    - Models define fields, constants and equations (what to solve)
//!    - Time steppers provide methods (how to solve)
//!
//! 2. **Implicit/Explicit Split at Compile Time**
//!    - Terms linear in the evolved field are divided out in frequency space
//!    - Every other term is evaluated explicitly, products in real space
//!
//! # Quick Start
//!
//! ```rust
//! use spectral_pf::prelude::*;
//!
//! # fn main() -> Result<(), String> {
//! // 1. Describe the model
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 64, 0.5))?;
//! model.add_scalar(Scalar::new("m1", -1.0))?;
//! model.add_equation("dconc/dt = LAP conc + conc + m1*conc^2")?;
//!
//! // 2. Configure the solver
//! let config = SolverConfiguration::new(0.01).with_stepper(StepperKind::Rk4);
//! let mut solver = Solver::with_configuration(model, &[64], config)?;
//!
//! // 3. Run 10 epochs of 10 steps
//! solver.solve(10, 10)?;
//!
//! // Logistic growth toward 1
//! let value = solver.model().field("conc").unwrap().get(0).re;
//! assert!(value > 0.7 && value < 0.75);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`spectral`]: Fourier transforms and modal filters
//! - [`physics`]: Bricks, compiled terms and the model
//! - [`equation`]: Equation language and term compiler
//! - [`solver`]: Time steppers, Newton-Krylov and the epoch driver

// Core modules
pub mod equation;
pub mod physics;
pub mod solver;
pub mod spectral;

pub mod prelude {
    //! Convenient imports for common usage
    //!
    //! ```rust
    //! use spectral_pf::prelude::*;
    //! ```
    pub use crate::physics::{DerivedField, Field, Model, MixedTerm, PureTerm, Representation, Scalar};
    pub use crate::solver::{
        Euler, ImplicitEuler, Monitor, NonConvergencePolicy, PointMonitor, Rk4, Solver, SolverConfiguration,
        StepperKind, TimeStepper,
    };
    pub use crate::spectral::{FourierTransform, ModalFilter, SpectralTransform, Vandeven};
}

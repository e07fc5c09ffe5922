//! Physical models
//!
//! This module holds everything that describes *what* is simulated: the
//! named bricks, the compiled right-hand sides and the model tying them
//! together. Time integration lives in [`crate::solver`].
//!
//! # Core Concepts
//!
//! - **Brick** (`Brick`): a named symbol usable in equations. Either a
//!   `Field` (evolved), a `Scalar` (constant) or a `DerivedField`
//!   (recomputed from other bricks)
//! - **Term** (`Term`): compiled closure writing one contribution per
//!   frequency node
//! - **Rhs** (`Rhs`): explicit terms plus implicit linear coefficients of
//!   one equation
//! - **Model** (`Model`): registry of bricks, equations and user terms
//! - **Reusable terms**: `VolumeConservingLp`, `Source`, `SpectralViscosity`
//!
//! # Architecture
//!
//! Models are **separate from time steppers**:
//! - The model provides the **right-hand sides** in frequency space
//! - The stepper provides the **method** advancing the fields
//!
//! Equations only ever see bricks through a [`BrickId`] resolved when the
//! model is initialised.
//!
//! # Example
//!
//! ```rust
//! use spectral_pf::physics::{Field, Model, Scalar};
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 8, 1.0))?;
//! model.add_scalar(Scalar::new("rate", -1.0))?;
//! model.add_equation("dconc/dt = rate*conc + LAP conc")?;
//! model.init()?;
//!
//! // Both terms are linear in conc and go to the implicit part
//! assert_eq!(model.term_counts(0), Some((0, 2)));
//! # Ok(())
//! # }
//! ```
//!
//! # Implementing a Custom Term
//!
//! Terms the equation language cannot express are registered by name and
//! referenced from equation text:
//!
//! ```rust
//! use std::sync::Arc;
//! use num_complex::Complex64;
//! use spectral_pf::physics::{Bricks, EvalContext, Field, Model, PureTerm, Term};
//!
//! struct Damping {
//!     rate: f64,
//! }
//!
//! impl PureTerm for Damping {
//!     fn construct(&mut self, bricks: &Bricks) -> Result<Term, String> {
//!         let id = bricks.id("conc").ok_or("conc is not registered")?;
//!         let rate = self.rate;
//!         Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
//!             for (i, value) in out.iter_mut().enumerate() {
//!                 *value = ctx.bricks.by_id(id).get(i) * rate;
//!             }
//!         }))
//!     }
//! }
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 8, 1.0))?;
//! model.register_explicit_term("DAMPING", Box::new(Damping { rate: -2.0 }), Vec::new())?;
//! model.add_equation("dconc/dt = DAMPING")?;
//! model.init()?;
//! assert_eq!(model.term_counts(0), Some((1, 0)));
//! # Ok(())
//! # }
//! ```

mod brick;
mod model;
mod term;
mod terms;

pub use brick::{Brick, BrickId, Bricks, DerivedField, DerivedFieldCalc, Field, Representation, Scalar};
pub use model::Model;
pub use term::{sum_terms, EvalContext, GenericFunction, MixedTerm, PureTerm, Rhs, RhsModifier, Term};
pub use terms::{Source, Sources, SpectralViscosity, TimeDepSource, VolumeConservingLp};

pub(crate) use term::{UserTerm, UserTerms};

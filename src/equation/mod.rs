//! Equation language
//!
//! Equations are written in a small text language:
//!
//! ```text
//! dconcA/dt = LAP concA - kf*concA^2*concB^3 + kr*concC
//! ```
//!
//! - `d<field>/dt` on the left names the evolved field
//! - Terms are separated by `+` or `-`; a leading sign is allowed
//! - Factors multiply with `*` or by juxtaposition and may carry a power
//!   (`conc^2`, `x^-1.5`)
//! - `LAP`, `LAP^2`, ... prefix a term with a power of the Laplacian
//! - Numeric literals scale a term
//!
//! Each term is classified as implicit (linear in the evolved field with
//! scalar coefficients) or explicit, and compiled into a [`Term`] closure.
//! Nonlinear monomials such as `concA^2*concB^3` are materialised as derived
//! fields named by [`canonical_name`].
//!
//! [`Term`]: crate::physics::Term

pub(crate) mod compiler;
mod operators;
mod parser;

pub use compiler::{classify, TermClass};
pub use operators::{apply_laplacian, complex_pow, laplacian_symbol};
pub use parser::{
    canonical_name, field_name_from_leibniz, merge_factors, parse_equation, parse_rhs, Equation, Factor, TermExpr,
};

use crate::physics::{Model, Rhs};

/// Compile one equation against a model
///
/// The equation is parsed, its monomials are registered on `model` as
/// derived fields, and its terms are compiled. The returned right-hand side
/// is independent of the equations already stored in the model.
///
/// # Errors
///
/// Returns an error for malformed text or undefined symbols.
pub fn build(text: &str, model: &mut Model) -> Result<Rhs, String> {
    let equation = parse_equation(text)?;
    model.compile_standalone(&equation)
}

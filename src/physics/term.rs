//! Compiled terms and user-supplied term providers
//!
//! A [`Term`] is a closure writing one contribution per frequency node. The
//! right-hand side of an equation is a sum of terms (`Rhs::terms`) plus a
//! sum of linear coefficients treated implicitly (`Rhs::denum`).

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use super::brick::Bricks;
use crate::spectral::FrequencyLookup;

// =================================================================================================
// Evaluation Context
// =================================================================================================

/// Everything a term may read while it is evaluated
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Every brick of the model, in the representation the caller set up
    pub bricks: &'a Bricks,
    /// Frequency vector of every node
    pub freq: &'a dyn FrequencyLookup,
    /// Simulation time
    pub time: f64,
}

/// Compiled contribution to a right-hand side
///
/// The output slice has one slot per node and may hold stale values on
/// entry; a term overwrites every slot.
pub type Term = Arc<dyn Fn(&EvalContext<'_>, &mut [Complex64]) + Send + Sync>;

/// Per-node function of the bricks, used to inject raw nodal sources
pub type GenericFunction = Arc<dyn Fn(usize, &Bricks) -> Complex64 + Send + Sync>;

/// Post-processing hook applied to an assembled right-hand side
pub type RhsModifier = Box<dyn Fn(&mut [Complex64]) + Send + Sync>;

// =================================================================================================
// Right-Hand Side
// =================================================================================================

/// Compiled right-hand side of one equation
#[derive(Clone, Default)]
pub struct Rhs {
    /// Terms summed into the explicit part
    pub terms: Vec<Term>,
    /// Linear coefficients summed into the implicit part
    pub denum: Vec<Term>,
}

impl Rhs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.denum.is_empty()
    }
}

impl fmt::Debug for Rhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rhs")
            .field("terms", &self.terms.len())
            .field("denum", &self.denum.len())
            .finish()
    }
}

/// Evaluate a list of terms and sum them node-wise
pub fn sum_terms(terms: &[Term], ctx: &EvalContext<'_>, nodes: usize) -> Vec<Complex64> {
    let mut total = vec![Complex64::new(0.0, 0.0); nodes];
    if terms.is_empty() {
        return total;
    }
    let mut buffer = vec![Complex64::new(0.0, 0.0); nodes];
    for term in terms {
        term(ctx, &mut buffer);
        for (sum, value) in total.iter_mut().zip(buffer.iter()) {
            *sum += *value;
        }
    }
    total
}

// =================================================================================================
// User Terms
// =================================================================================================

/// User-supplied term contributing to exactly one side of an equation
///
/// The model calls `construct` once during initialisation, after every
/// brick the term refers to has been registered. Ids should be resolved
/// there, so the returned closure stays lookup-free.
pub trait PureTerm: Send + Sync {
    /// Build the closure that evaluates this term
    ///
    /// # Errors
    ///
    /// Returns an error if a brick the term needs is missing.
    fn construct(&mut self, bricks: &Bricks) -> Result<Term, String>;

    /// Hook called after every completed time step
    fn on_step_finished(&mut self, _time: f64, _bricks: &Bricks) {}
}

/// User-supplied term with both an explicit and an implicit part
pub trait MixedTerm: Send + Sync {
    fn construct_linear(&mut self, bricks: &Bricks) -> Result<Term, String>;

    fn construct_nonlinear(&mut self, bricks: &Bricks) -> Result<Term, String>;

    fn on_step_finished(&mut self, _time: f64, _bricks: &Bricks) {}
}

/// Registered user term and the side it contributes to
pub(crate) enum UserTerm {
    Explicit(Box<dyn PureTerm>),
    Implicit(Box<dyn PureTerm>),
    Mixed(Box<dyn MixedTerm>),
}

impl UserTerm {
    fn on_step_finished(&mut self, time: f64, bricks: &Bricks) {
        match self {
            UserTerm::Explicit(term) | UserTerm::Implicit(term) => term.on_step_finished(time, bricks),
            UserTerm::Mixed(term) => term.on_step_finished(time, bricks),
        }
    }
}

/// User terms addressable by name from equation text
#[derive(Default)]
pub(crate) struct UserTerms {
    entries: Vec<(String, UserTerm)>,
}

impl UserTerms {
    pub(crate) fn insert(&mut self, name: &str, term: UserTerm) -> Result<(), String> {
        if self.contains(name) {
            return Err(format!("A term named '{}' is already registered", name));
        }
        self.entries.push((name.to_string(), term));
        Ok(())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut UserTerm> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, term)| term)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn on_step_finished(&mut self, time: f64, bricks: &Bricks) {
        for (_, term) in self.entries.iter_mut() {
            term.on_step_finished(time, bricks);
        }
    }
}

//! User terms for testing the term registration paths
//!
//! These terms have known closed-form effects so the integration tests can
//! check that user terms reach the right side of the equation.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use num_complex::Complex64;
use spectral_pf::physics::{Bricks, EvalContext, MixedTerm, PureTerm, Term};

// =================================================================================================
// Damping
// =================================================================================================

/// Explicit term `rate * field`
///
/// Registered as an explicit term it is evaluated forward, so a large
/// negative rate is stiff for the semi-implicit schemes.
pub struct Damping {
    field: String,
    rate: f64,
}

impl Damping {
    pub fn new(field: &str, rate: f64) -> Self {
        Self {
            field: field.to_string(),
            rate,
        }
    }
}

impl PureTerm for Damping {
    fn construct(&mut self, bricks: &Bricks) -> Result<Term, String> {
        let id = bricks
            .id(&self.field)
            .ok_or_else(|| format!("Damping: unknown field '{}'", self.field))?;
        let rate = self.rate;
        Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            let field = ctx.bricks.by_id(id);
            for (i, value) in out.iter_mut().enumerate() {
                *value = field.get(i) * rate;
            }
        }))
    }
}

// =================================================================================================
// Constant Rate
// =================================================================================================

/// Linear coefficient `rate` at every node
///
/// Registered as an implicit term it behaves like `rate*field`.
pub struct ConstantRate {
    rate: f64,
}

impl ConstantRate {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl PureTerm for ConstantRate {
    fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        let rate = Complex64::new(self.rate, 0.0);
        Ok(Arc::new(move |_ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            out.iter_mut().for_each(|v| *v = rate);
        }))
    }
}

// =================================================================================================
// Split Decay
// =================================================================================================

/// `rate * field` split evenly between the implicit and explicit parts
pub struct SplitDecay {
    field: String,
    rate: f64,
}

impl SplitDecay {
    pub fn new(field: &str, rate: f64) -> Self {
        Self {
            field: field.to_string(),
            rate,
        }
    }
}

impl MixedTerm for SplitDecay {
    fn construct_linear(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        let half = Complex64::new(0.5 * self.rate, 0.0);
        Ok(Arc::new(move |_ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            out.iter_mut().for_each(|v| *v = half);
        }))
    }

    fn construct_nonlinear(&mut self, bricks: &Bricks) -> Result<Term, String> {
        Damping::new(&self.field, 0.5 * self.rate).construct(bricks)
    }
}

// =================================================================================================
// Step Counter
// =================================================================================================

/// Contributes nothing, records every `on_step_finished` call
#[derive(Default)]
pub struct StepCounter {
    pub calls: Arc<AtomicUsize>,
    pub last_time: Arc<Mutex<f64>>,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn last_time(&self) -> Arc<Mutex<f64>> {
        Arc::clone(&self.last_time)
    }
}

impl PureTerm for StepCounter {
    fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        Ok(Arc::new(|_ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            out.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
        }))
    }

    fn on_step_finished(&mut self, time: f64, _bricks: &Bricks) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_time.lock() {
            *last = time;
        }
    }
}

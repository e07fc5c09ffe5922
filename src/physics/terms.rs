//! Reusable terms
//!
//! Ready-made [`PureTerm`] implementations for effects the equation
//! language cannot express on its own:
//!
//! - [`VolumeConservingLp`]: Lagrange multiplier keeping the integral of a
//!   field constant
//! - [`Source`] / [`Sources`]: point sources with a time-dependent strength
//! - [`SpectralViscosity`]: mode-selective damping of high frequencies
//!
//! Every term is registered by name and referenced from equation text:
//!
//! ```rust
//! use std::sync::Arc;
//! use spectral_pf::physics::{Field, Model, Source};
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::zeros("conc", 8))?;
//! let source = Source::new(vec![2.0], Arc::new(|t: f64| 1.0 + t));
//! model.register_explicit_term("INJECT", Box::new(source), Vec::new())?;
//! model.add_equation("dconc/dt = LAP conc + INJECT")?;
//! model.init()?;
//! assert_eq!(model.term_counts(0), Some((1, 1)));
//! # Ok(())
//! # }
//! ```

use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num_complex::Complex64;

use super::brick::{Brick, BrickId, Bricks, Representation};
use super::term::{EvalContext, PureTerm, Term};

fn resolve(bricks: &Bricks, name: &str, owner: &str) -> Result<BrickId, String> {
    match bricks.id(name) {
        Some(id) if bricks.by_id(id).is_field_like() => Ok(id),
        Some(_) => Err(format!("{}: '{}' is a scalar, expected a field", owner, name)),
        None => Err(format!("{}: unknown field '{}'", owner, name)),
    }
}

/// Integral of a field-like brick over the grid
///
/// In frequency space the integral is the zero mode.
fn integral(brick: &Brick) -> f64 {
    match (brick.representation(), brick.data()) {
        (Some(Representation::Frequency), Some(data)) => data.first().map_or(0.0, |v| v.re),
        (_, Some(data)) => data.iter().map(|v| v.re).sum(),
        _ => 0.0,
    }
}

// =================================================================================================
// Volume Conserving Lagrange Multiplier
// =================================================================================================

/// Explicit term `multiplier * indicator` keeping `∫field` constant
///
/// The multiplier is updated after every step from the observed change of
/// the integral:
///
/// ```text
/// multiplier -= ΔI / (dt ∫indicator)
/// ```
///
/// The first completed step only records the integral, and every correction
/// lags one step behind, so conservation is approximate while the field
/// changes quickly.
pub struct VolumeConservingLp {
    field: String,
    indicator: String,
    dt: f64,
    multiplier: Arc<AtomicU64>,
    current_integral: f64,
    is_first_update: bool,
}

impl VolumeConservingLp {
    /// Conserve `field`, distributing the correction like `indicator`
    pub fn new(field: &str, indicator: &str, dt: f64) -> Self {
        Self {
            field: field.to_string(),
            indicator: indicator.to_string(),
            dt,
            multiplier: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
            current_integral: 0.0,
            is_first_update: true,
        }
    }

    /// Current value of the Lagrange multiplier
    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier.load(Ordering::Relaxed))
    }

    fn set_multiplier(&self, value: f64) {
        self.multiplier.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl PureTerm for VolumeConservingLp {
    fn construct(&mut self, bricks: &Bricks) -> Result<Term, String> {
        resolve(bricks, &self.field, "VolumeConservingLp")?;
        let indicator = resolve(bricks, &self.indicator, "VolumeConservingLp")?;
        let multiplier = Arc::clone(&self.multiplier);

        Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            let value = f64::from_bits(multiplier.load(Ordering::Relaxed));
            let indicator = ctx.bricks.by_id(indicator);
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = indicator.get(i) * value;
            }
        }))
    }

    fn on_step_finished(&mut self, _time: f64, bricks: &Bricks) {
        let (Some(field), Some(indicator)) = (bricks.get(&self.field), bricks.get(&self.indicator)) else {
            log::warn!(
                "VolumeConservingLp: '{}' or '{}' is missing, multiplier not updated",
                self.field,
                self.indicator
            );
            return;
        };

        let field_integral = integral(field);
        if self.is_first_update {
            self.current_integral = field_integral;
            self.is_first_update = false;
            return;
        }

        let indicator_integral = integral(indicator);
        if indicator_integral == 0.0 {
            log::warn!("VolumeConservingLp: indicator '{}' integrates to zero", self.indicator);
            return;
        }

        let delta = field_integral - self.current_integral;
        self.current_integral = field_integral;
        self.set_multiplier(self.multiplier() - delta / (self.dt * indicator_integral));
    }
}

// =================================================================================================
// Sources
// =================================================================================================

/// Strength of a source as a function of time
pub type TimeDepSource = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Point source of strength `f(t)` at a grid position
///
/// `position` is given in node units, one component per axis. In frequency
/// space the term is `f(t) e^{-2πi k·x}`, so after the inverse transform the
/// whole strength lands on the node at `position`.
#[derive(Clone)]
pub struct Source {
    position: Vec<f64>,
    strength: TimeDepSource,
}

impl Source {
    pub fn new(position: Vec<f64>, strength: TimeDepSource) -> Self {
        Self { position, strength }
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    /// Write the frequency-space source into `out`
    fn eval(&self, ctx: &EvalContext<'_>, out: &mut [Complex64]) {
        let amplitude = (self.strength)(ctx.time);
        for (i, value) in out.iter_mut().enumerate() {
            let phase: f64 = ctx
                .freq
                .freq(i)
                .iter()
                .zip(self.position.iter())
                .map(|(k, x)| k * x)
                .sum();
            *value = Complex64::from_polar(amplitude, -2.0 * PI * phase);
        }
    }
}

impl PureTerm for Source {
    fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        let source = self.clone();
        Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| source.eval(ctx, out)))
    }
}

/// Several point sources summed into one term
#[derive(Clone, Default)]
pub struct Sources(pub Vec<Source>);

impl PureTerm for Sources {
    fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        let sources = self.0.clone();
        Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            out.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
            let mut buffer = vec![Complex64::new(0.0, 0.0); out.len()];
            for source in &sources {
                source.eval(ctx, &mut buffer);
                for (total, value) in out.iter_mut().zip(buffer.iter()) {
                    *total += *value;
                }
            }
        }))
    }
}

// =================================================================================================
// Spectral Viscosity
// =================================================================================================

/// Linear coefficient `-eps Q(|k|) |k|^power`, registered as an implicit term
///
/// `Q` is zero below a third of `threshold`, one above it and a smooth
/// polynomial in between, so only modes near the grid cut-off are damped.
/// `eps * threshold ≈ 0.25` works well in practice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralViscosity {
    pub eps: f64,
    /// Frequency magnitude from which the full damping applies
    pub threshold: f64,
    pub power: i32,
}

impl SpectralViscosity {
    pub fn new(eps: f64, threshold: f64, power: i32) -> Self {
        Self { eps, threshold, power }
    }

    /// Blend from 0 at `threshold / 3` to 1 at `threshold`
    pub fn interpolant(&self, freq: f64) -> f64 {
        let start = self.threshold / 3.0;
        if freq < start {
            return 0.0;
        }
        if freq > self.threshold {
            return 1.0;
        }
        let x = (freq - start) / (self.threshold - start);
        x * x * (3.0 - 2.0 * x)
    }
}

impl PureTerm for SpectralViscosity {
    fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
        if self.threshold <= 0.0 {
            return Err("SpectralViscosity: threshold must be positive".to_string());
        }
        let viscosity = *self;
        Ok(Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
            for (i, value) in out.iter_mut().enumerate() {
                let radius = ctx.freq.freq_norm_sq(i).sqrt();
                let damping = viscosity.eps * viscosity.interpolant(radius) * radius.powi(viscosity.power);
                *value = Complex64::new(-damping, 0.0);
            }
        }))
    }
}

//! Time stepper trait and solver configuration
//!
//! # Design Philosophy
//!
//! - `TimeStepper`: one trait for every integration scheme, so the driver
//!   never needs to know which one it runs
//! - `StepperKind`: the closed set of built-in schemes, parseable from the
//!   names used in configuration files
//! - `SolverConfiguration`: serialisable run parameters, validated once

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::newton_krylov::NewtonKrylovSettings;
use crate::physics::Model;
use crate::spectral::ModalFilter;

// =================================================================================================
// Time Stepper
// =================================================================================================

/// Advances every field of a model by one time step
///
/// A stepper owns its spectral transform, time step and step counter. It
/// expects the fields in real space on entry and leaves them in real space
/// on exit.
pub trait TimeStepper {
    /// Advance the model by one step
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be evaluated or, for implicit
    /// schemes, if the nonlinear solve fails under a strict policy.
    fn step(&mut self, model: &mut Model) -> Result<(), String>;

    /// Install a modal filter applied after each update
    fn set_filter(&mut self, filter: Box<dyn ModalFilter>);

    /// Simulation time reached so far
    fn time(&self) -> f64 {
        self.steps_taken() as f64 * self.dt()
    }

    fn dt(&self) -> f64;

    fn steps_taken(&self) -> usize;

    /// Scheme name for logs
    fn name(&self) -> &str;

    /// Take `nsteps` steps
    fn propagate(&mut self, nsteps: usize, model: &mut Model) -> Result<(), String> {
        for _ in 0..nsteps {
            self.step(model)?;
        }
        Ok(())
    }
}

// =================================================================================================
// Stepper Kind
// =================================================================================================

/// Built-in integration schemes
///
/// ```rust
/// use spectral_pf::solver::StepperKind;
///
/// assert_eq!("rk4".parse::<StepperKind>().unwrap(), StepperKind::Rk4);
/// assert!("leapfrog".parse::<StepperKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepperKind {
    /// Semi-implicit Euler
    #[default]
    Euler,
    /// Runge-Kutta 4 with an implicit linear part
    Rk4,
    /// Implicit Euler with an integrating factor, solved by Newton-Krylov
    ImplicitEuler,
}

impl StepperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepperKind::Euler => "euler",
            StepperKind::Rk4 => "rk4",
            StepperKind::ImplicitEuler => "implicit_euler",
        }
    }
}

impl FromStr for StepperKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(StepperKind::Euler),
            "rk4" => Ok(StepperKind::Rk4),
            "implicit_euler" | "implicit-euler" | "implicit euler" => Ok(StepperKind::ImplicitEuler),
            other => Err(format!(
                "Unknown stepper scheme '{}'; expected one of euler, rk4, implicit_euler",
                other
            )),
        }
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =================================================================================================
// Non-convergence Policy
// =================================================================================================

/// What an implicit step does when the nonlinear solve does not converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonConvergencePolicy {
    /// Log a warning and keep the last iterate
    #[default]
    Warn,
    /// Abort the step with an error
    Fail,
}

// =================================================================================================
// Solver Configuration
// =================================================================================================

/// Run parameters of a [`Solver`](super::Solver)
///
/// # Examples
///
/// ```rust
/// use spectral_pf::solver::{SolverConfiguration, StepperKind};
///
/// let config = SolverConfiguration::new(0.01).with_stepper(StepperKind::Rk4);
/// assert!(config.validate().is_ok());
///
/// let config = SolverConfiguration::from_json(r#"{ "dt": 0.1, "stepper": "implicit_euler" }"#).unwrap();
/// assert_eq!(config.stepper, StepperKind::ImplicitEuler);
/// assert_eq!(config.newton.max_iterations, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfiguration {
    /// Time step
    pub dt: f64,

    /// Integration scheme
    #[serde(default)]
    pub stepper: StepperKind,

    /// Offset added to epoch numbers in logs and callbacks
    #[serde(default)]
    pub start_epoch: usize,

    /// Check fields for NaN and infinity after every epoch
    #[serde(default)]
    pub check_finite: bool,

    /// Newton-Krylov parameters of the implicit scheme
    #[serde(default)]
    pub newton: NewtonKrylovSettings,

    /// Reaction of the implicit scheme to a failed nonlinear solve
    #[serde(default)]
    pub on_non_convergence: NonConvergencePolicy,
}

impl SolverConfiguration {
    /// Semi-implicit Euler with time step `dt`
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            stepper: StepperKind::default(),
            start_epoch: 0,
            check_finite: false,
            newton: NewtonKrylovSettings::default(),
            on_non_convergence: NonConvergencePolicy::default(),
        }
    }

    pub fn with_stepper(mut self, stepper: StepperKind) -> Self {
        self.stepper = stepper;
        self
    }

    pub fn with_start_epoch(mut self, start_epoch: usize) -> Self {
        self.start_epoch = start_epoch;
        self
    }

    pub fn with_finite_check(mut self, check_finite: bool) -> Self {
        self.check_finite = check_finite;
        self
    }

    pub fn with_newton(mut self, newton: NewtonKrylovSettings) -> Self {
        self.newton = newton;
        self
    }

    pub fn with_non_convergence_policy(mut self, policy: NonConvergencePolicy) -> Self {
        self.on_non_convergence = policy;
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(text).map_err(|e| format!("Invalid solver configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("Cannot serialise solver configuration: {}", e))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(format!("Time step must be positive and finite, got {}", self.dt));
        }
        if self.stepper == StepperKind::ImplicitEuler {
            self.newton.validate()?;
        }
        Ok(())
    }
}

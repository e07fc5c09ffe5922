//! Epoch loop driving a time stepper over a model
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use spectral_pf::physics::{Field, Model, Scalar};
//! use spectral_pf::solver::{PointMonitor, Solver};
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("conc", 8, 1.0))?;
//! model.add_scalar(Scalar::new("rate", -1.0))?;
//! model.add_equation("dconc/dt = rate*conc")?;
//!
//! let mut solver = Solver::new(model, &[8], 0.01)?;
//! solver.add_monitor(Box::new(PointMonitor::new("conc", 0)));
//!
//! let epochs = Rc::new(RefCell::new(Vec::new()));
//! let seen = Rc::clone(&epochs);
//! solver.add_callback(move |_solver, epoch| seen.borrow_mut().push(epoch));
//!
//! solver.solve(3, 10)?;
//! assert_eq!(*epochs.borrow(), vec![0, 1, 2]);
//! assert_eq!(solver.monitors_json()[0]["data"].as_array().unwrap().len(), 3);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::mem;
use std::time::Instant;

use super::methods::{Euler, ImplicitEuler, Rk4};
use super::monitor::Monitor;
use super::traits::{SolverConfiguration, StepperKind, TimeStepper};
use super::validate_fields;
use crate::physics::Model;
use crate::spectral::FourierTransform;

/// Called after every epoch with the solver and the epoch number
pub type Callback = Box<dyn FnMut(&Solver, usize)>;

// =================================================================================================
// Solver
// =================================================================================================

/// Owns a model and advances it epoch by epoch
pub struct Solver {
    model: Model,
    domain: Vec<usize>,
    config: SolverConfiguration,
    stepper: Box<dyn TimeStepper>,
    callbacks: Vec<Callback>,
    monitors: Vec<Box<dyn Monitor>>,
}

impl Solver {
    /// Solver with the semi-implicit Euler scheme and time step `dt`
    ///
    /// # Errors
    ///
    /// See [`Solver::with_configuration`].
    pub fn new(model: Model, domain: &[usize], dt: f64) -> Result<Self, String> {
        Self::with_configuration(model, domain, SolverConfiguration::new(dt))
    }

    /// Solver for `model` on a grid of shape `domain`
    ///
    /// The model is initialised if it is not already.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the domain has an
    /// unsupported dimensionality, the model has no field, a field length
    /// differs from the number of grid points, or `init` fails.
    pub fn with_configuration(mut model: Model, domain: &[usize], config: SolverConfiguration) -> Result<Self, String> {
        config.validate()?;
        let stepper = build_stepper(&config, domain)?;

        let nodes: usize = domain.iter().product();
        if model.num_fields() == 0 {
            return Err("Model has no fields to evolve".to_string());
        }
        for field in model.fields() {
            if field.len() != nodes {
                return Err(format!(
                    "Inconsistent domain size: field '{}' has {} nodes, domain {:?} has {}",
                    field.name(),
                    field.len(),
                    domain,
                    nodes
                ));
            }
        }

        if !model.is_initialized() {
            model.init()?;
        }

        Ok(Self {
            model,
            domain: domain.to_vec(),
            config,
            stepper,
            callbacks: Vec::new(),
            monitors: Vec::new(),
        })
    }

    /// Select a built-in scheme by name (`euler`, `rk4`, `implicit_euler`)
    ///
    /// Replacing the stepper restarts the clock at zero.
    pub fn set_stepper(&mut self, name: &str) -> Result<(), String> {
        let kind: StepperKind = name.parse()?;
        let config = self.config.clone().with_stepper(kind);
        config.validate()?;
        self.stepper = build_stepper(&config, &self.domain)?;
        self.config = config;
        Ok(())
    }

    /// Install any stepper, built-in or external
    pub fn set_time_stepper(&mut self, stepper: Box<dyn TimeStepper>) {
        self.stepper = stepper;
    }

    pub fn add_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Solver, usize) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn add_monitor(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    /// Take `nsteps` steps, notifying user terms after each one
    pub fn propagate(&mut self, nsteps: usize) -> Result<(), String> {
        for _ in 0..nsteps {
            self.stepper.step(&mut self.model)?;
            self.model.on_step_finished(self.stepper.time());
        }
        Ok(())
    }

    /// Run `nepochs` epochs of `nsteps` steps
    ///
    /// After every epoch the fields are checked for NaN/Inf (if enabled),
    /// then callbacks run, then monitors sample the model.
    pub fn solve(&mut self, nepochs: usize, nsteps: usize) -> Result<(), String> {
        let start_epoch = self.config.start_epoch;

        for i in 0..nepochs {
            let epoch = start_epoch + i;
            log::info!(
                "Epoch {:5} of {:5} ({}, t = {:.4})",
                epoch,
                nepochs + start_epoch,
                self.stepper.name(),
                self.stepper.time()
            );
            let started = Instant::now();

            self.propagate(nsteps)?;

            if self.config.check_finite {
                validate_fields(&self.model, epoch)?;
            }

            let mut callbacks = mem::take(&mut self.callbacks);
            for callback in callbacks.iter_mut() {
                callback(self, epoch);
            }
            self.callbacks = callbacks;

            for monitor in self.monitors.iter_mut() {
                monitor.add(self.model.bricks());
            }

            log::debug!("Epoch {} took {:?}", epoch, started.elapsed());
        }
        Ok(())
    }

    /// Recorded data of every monitor as a JSON array
    pub fn monitors_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.monitors.iter().map(|m| m.to_json()).collect())
    }

    /// Simulation time of the current stepper
    pub fn time(&self) -> f64 {
        self.stepper.time()
    }

    pub fn stepper(&self) -> &dyn TimeStepper {
        self.stepper.as_ref()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// Consume the solver and return the model
    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn configuration(&self) -> &SolverConfiguration {
        &self.config
    }

    pub fn domain_size(&self) -> &[usize] {
        &self.domain
    }
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("domain", &self.domain)
            .field("stepper", &self.stepper.name())
            .field("time", &self.stepper.time())
            .field("callbacks", &self.callbacks.len())
            .field("monitors", &self.monitors.len())
            .finish()
    }
}

fn build_stepper(config: &SolverConfiguration, domain: &[usize]) -> Result<Box<dyn TimeStepper>, String> {
    let transform = Box::new(FourierTransform::new(domain)?);
    Ok(match config.stepper {
        StepperKind::Euler => Box::new(Euler::new(config.dt, transform)),
        StepperKind::Rk4 => Box::new(Rk4::new(config.dt, transform)),
        StepperKind::ImplicitEuler => Box::new(
            ImplicitEuler::new(config.dt, transform).with_settings(config.newton, config.on_non_convergence),
        ),
    })
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Field, Scalar};
    use crate::solver::PointMonitor;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::f64::consts::PI;
    use std::rc::Rc;

    fn decay_model(nodes: usize) -> Model {
        let mut model = Model::new();
        model.add_field(Field::uniform("conc", nodes, 1.0)).unwrap();
        model.add_scalar(Scalar::new("rate", -1.0)).unwrap();
        model.add_equation("dconc/dt = rate*conc").unwrap();
        model
    }

    /// Cosine bump on a square grid of side `n`
    fn diffusion_model(n: usize) -> Model {
        let values: Vec<f64> = (0..n * n)
            .map(|node| {
                let (i, j) = (node / n, node % n);
                1.0 + 0.5 * (2.0 * PI * i as f64 / n as f64).cos() * (2.0 * PI * j as f64 / n as f64).cos()
            })
            .collect();
        let mut model = Model::new();
        model.add_field(Field::from_real("conc", &values)).unwrap();
        model.add_equation("dconc/dt = LAP conc").unwrap();
        model
    }

    #[test]
    fn test_new_initialises_model() {
        let solver = Solver::new(decay_model(8), &[8], 0.1).unwrap();
        assert!(solver.model().is_initialized());
        assert_eq!(solver.stepper().name(), "Semi-implicit Euler");
        assert_eq!(solver.domain_size(), &[8]);
        assert_eq!(solver.configuration().dt, 0.1);
    }

    #[test]
    fn test_domain_mismatch() {
        let err = Solver::new(decay_model(8), &[4, 4], 0.1).unwrap_err();
        assert!(err.contains("Inconsistent domain size"));

        assert!(Solver::new(decay_model(8), &[2, 2, 2], 0.1).is_ok());
        assert!(Solver::new(decay_model(16), &[2, 2, 2, 2], 0.1).is_err());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(Solver::new(decay_model(8), &[8], 0.0).is_err());
        assert!(Solver::new(Model::new(), &[8], 0.1).is_err());
    }

    #[test]
    fn test_set_stepper() {
        let mut solver = Solver::new(decay_model(8), &[8], 0.1).unwrap();

        solver.set_stepper("rk4").unwrap();
        assert_eq!(solver.stepper().name(), "Runge-Kutta 4");
        assert_eq!(solver.configuration().stepper, StepperKind::Rk4);

        solver.set_stepper("implicit_euler").unwrap();
        assert_eq!(solver.stepper().name(), "Implicit Euler");

        let err = solver.set_stepper("leapfrog").unwrap_err();
        assert!(err.contains("Unknown stepper scheme"));
        assert_eq!(solver.stepper().name(), "Implicit Euler");
    }

    #[test]
    fn test_solve_advances_time() {
        let mut solver = Solver::new(decay_model(8), &[8], 0.01).unwrap();
        solver.solve(4, 25).unwrap();

        assert_relative_eq!(solver.time(), 1.0, epsilon = 1e-12);
        assert_eq!(solver.stepper().steps_taken(), 100);
    }

    #[test]
    fn test_callbacks_see_epochs_and_state() {
        let config = SolverConfiguration::new(0.1).with_start_epoch(5);
        let mut solver = Solver::with_configuration(decay_model(8), &[8], config).unwrap();

        let record = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&record);
        solver.add_callback(move |solver, epoch| {
            let value = solver.model().field("conc").unwrap().get(0).re;
            sink.borrow_mut().push((epoch, value));
        });

        solver.solve(2, 1).unwrap();

        let record = record.borrow();
        assert_eq!(record.len(), 2);
        assert_eq!(record[0].0, 5);
        assert_eq!(record[1].0, 6);
        assert!(record[1].1 < record[0].1);
    }

    #[test]
    fn test_monitors_sample_every_epoch() {
        let mut solver = Solver::new(decay_model(8), &[8], 0.1).unwrap();
        solver.add_monitor(Box::new(PointMonitor::new("conc", 3)));

        solver.solve(3, 2).unwrap();

        let json = solver.monitors_json();
        let data = json[0]["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(json[0]["site"], 3);
    }

    #[test]
    fn test_diffusion_conserves_mass() {
        let n = 16;
        let mut solver = Solver::new(diffusion_model(n), &[n, n], 0.1).unwrap();
        let before = solver.model().field("conc").unwrap().total();

        solver.solve(2, 10).unwrap();

        let field = solver.model().field("conc").unwrap();
        assert_relative_eq!(field.total(), before, epsilon = 1e-9);
        // The bump is damped toward the mean
        let peak = field.real_values().iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak < 1.5);
        assert!(peak > 1.0);
    }

    #[test]
    fn test_external_stepper_on_wrong_grid() {
        let mut solver = Solver::new(decay_model(8), &[8], 0.1).unwrap();
        let transform = crate::spectral::FourierTransform::new(&[4]).unwrap();
        solver.set_time_stepper(Box::new(Euler::new(0.1, Box::new(transform))));

        let err = solver.solve(1, 1).unwrap_err();
        assert!(err.contains("Transform covers 4 nodes"));
    }

    #[test]
    fn test_finite_check_stops_run() {
        // Explicit growth with a huge step overflows
        let mut model = Model::new();
        model.add_field(Field::uniform("conc", 4, 1.0)).unwrap();
        model.add_scalar(Scalar::new("rate", 1.0)).unwrap();
        model.add_equation("dconc/dt = rate*conc^2").unwrap();

        let config = SolverConfiguration::new(10.0).with_finite_check(true);
        let mut solver = Solver::with_configuration(model, &[4], config).unwrap();

        let err = solver.solve(20, 5).unwrap_err();
        assert!(err.contains("'conc'"));
    }
}

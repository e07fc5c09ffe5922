//! Model: bricks, equations and user terms of one simulation
//!
//! A model is assembled in two phases:
//!
//! 1. **Registration**: fields, scalars, equations, derived fields and user
//!    terms are added in any order. Equations are parsed immediately and
//!    their nonlinear monomials are registered as derived fields as soon as
//!    the bricks they reference are known.
//! 2. **Initialisation** (`init`): every equation is compiled into closures
//!    over brick ids. Registering anything after `init` marks the model as
//!    stale until `init` runs again.
//!
//! # Example
//!
//! ```rust
//! use spectral_pf::physics::{Field, Model, Scalar};
//!
//! # fn main() -> Result<(), String> {
//! let mut model = Model::new();
//! model.add_field(Field::uniform("concA", 16, 0.5))?;
//! model.add_field(Field::uniform("concB", 16, 0.5))?;
//! model.add_scalar(Scalar::new("kf", 1.0))?;
//! model.add_equation("dconcA/dt = LAP concA - kf*concA^2*concB")?;
//! model.add_equation("dconcB/dt = LAP concB - kf*concA^2*concB")?;
//! model.init()?;
//!
//! assert_eq!(model.all_field_names(), vec!["concA", "concB", "concA^2*concB"]);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use num_complex::Complex64;

use super::brick::{Brick, BrickId, Bricks, DerivedField, Field, Representation, Scalar};
use super::term::{
    sum_terms, EvalContext, GenericFunction, MixedTerm, PureTerm, Rhs, RhsModifier, UserTerm, UserTerms,
};
use crate::equation::compiler::{compile_equation, missing_monomials, monomial_calc};
use crate::equation::{parse_equation, Equation};
use crate::spectral::{FrequencyLookup, SpectralTransform};

/// Collection of bricks and the equations evolving them
#[derive(Default)]
pub struct Model {
    bricks: Bricks,
    field_ids: Vec<BrickId>,
    derived_ids: Vec<BrickId>,
    equations: Vec<Equation>,
    rhs: Vec<Rhs>,
    user_terms: UserTerms,
    modifiers: Vec<(usize, RhsModifier)>,
    nodes: Option<usize>,
    initialized: bool,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    // =============================================================================================
    // Registration
    // =============================================================================================

    /// Add an evolved field
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, the field is empty, or its
    /// length differs from the fields already registered.
    pub fn add_field(&mut self, field: Field) -> Result<(), String> {
        if field.is_empty() {
            return Err(format!("Field '{}' has no nodes", field.name()));
        }
        self.check_nodes(field.name(), field.len())?;

        let nodes = field.len();
        let id = self.bricks.insert(Brick::Field(field))?;
        self.field_ids.push(id);
        self.nodes = Some(nodes);
        self.initialized = false;
        Ok(())
    }

    /// Add a named constant
    pub fn add_scalar(&mut self, scalar: Scalar) -> Result<(), String> {
        self.bricks.insert(Brick::Scalar(scalar))?;
        self.initialized = false;
        Ok(())
    }

    /// Parse and register `d<field>/dt = ...`
    ///
    /// Monomials over already registered fields become derived fields
    /// right away; the rest are picked up by `init`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed text or a second equation for the same
    /// field.
    pub fn add_equation(&mut self, text: &str) -> Result<(), String> {
        let equation = parse_equation(text)?;
        if self.equations.iter().any(|eq| eq.field == equation.field) {
            return Err(format!("Field '{}' already has an equation", equation.field));
        }
        self.register_monomials(&equation)?;
        self.equations.push(equation);
        self.initialized = false;
        Ok(())
    }

    /// Register a derived field maintained by its own calculation
    ///
    /// A derived field registered before any field fixes the node count.
    pub fn register_derived_field(&mut self, derived: DerivedField) -> Result<(), String> {
        if derived.is_empty() {
            return Err(format!("Derived field '{}' has no nodes", derived.name()));
        }
        self.check_nodes(derived.name(), derived.len())?;
        if self.user_terms.contains(derived.name()) {
            return Err(format!("'{}' is already registered as a term", derived.name()));
        }
        let nodes = derived.len();
        let id = self.bricks.insert(Brick::Derived(derived))?;
        self.derived_ids.push(id);
        self.nodes.get_or_insert(nodes);
        self.initialized = false;
        Ok(())
    }

    /// Register a derived field whose value at node `i` is `function(i, bricks)`
    ///
    /// # Errors
    ///
    /// Returns an error while the node count is still unknown.
    pub fn register_function<F>(&mut self, name: &str, function: F) -> Result<(), String>
    where
        F: Fn(usize, &Bricks) -> Complex64 + Send + Sync + 'static,
    {
        let nodes = self
            .nodes
            .ok_or_else(|| format!("Cannot register function '{}' before any field", name))?;

        let function: GenericFunction = std::sync::Arc::new(function);
        let calc = Box::new(move |bricks: &Bricks, out: &mut [Complex64]| {
            for (i, value) in out.iter_mut().enumerate() {
                *value = function(i, bricks);
            }
        });
        self.register_derived_field(DerivedField::new(name, nodes, calc))
    }

    /// Register a term contributing to the explicit part, referenced by `name`
    ///
    /// `derived` holds derived fields the term reads; they are registered
    /// before the term.
    pub fn register_explicit_term(
        &mut self,
        name: &str,
        term: Box<dyn PureTerm>,
        derived: Vec<DerivedField>,
    ) -> Result<(), String> {
        self.register_user_term(name, UserTerm::Explicit(term), derived)
    }

    /// Register a term contributing to the implicit part, referenced by `name`
    pub fn register_implicit_term(
        &mut self,
        name: &str,
        term: Box<dyn PureTerm>,
        derived: Vec<DerivedField>,
    ) -> Result<(), String> {
        self.register_user_term(name, UserTerm::Implicit(term), derived)
    }

    /// Register a term contributing to both parts, referenced by `name`
    pub fn register_mixed_term(
        &mut self,
        name: &str,
        term: Box<dyn MixedTerm>,
        derived: Vec<DerivedField>,
    ) -> Result<(), String> {
        self.register_user_term(name, UserTerm::Mixed(term), derived)
    }

    /// Attach a hook applied to the assembled explicit part of `field`
    pub fn register_rhs_modifier<F>(&mut self, field: &str, modifier: F) -> Result<(), String>
    where
        F: Fn(&mut [Complex64]) + Send + Sync + 'static,
    {
        let index = self
            .eq_number(field)
            .ok_or_else(|| format!("Cannot attach a modifier to unknown field '{}'", field))?;
        self.modifiers.push((index, Box::new(modifier)));
        Ok(())
    }

    fn register_user_term(&mut self, name: &str, term: UserTerm, derived: Vec<DerivedField>) -> Result<(), String> {
        if self.bricks.contains(name) {
            return Err(format!("'{}' is already registered as a brick", name));
        }
        if self.user_terms.contains(name) {
            return Err(format!("A term named '{}' is already registered", name));
        }
        for field in derived {
            self.register_derived_field(field)?;
        }
        self.user_terms.insert(name, term)?;
        self.initialized = false;
        Ok(())
    }

    fn register_monomials(&mut self, equation: &Equation) -> Result<(), String> {
        let missing = missing_monomials(equation, &self.bricks, &self.user_terms);

        for (name, factors) in missing {
            let nodes = self
                .nodes
                .ok_or_else(|| format!("Cannot register derived field '{}' before any field", name))?;
            let resolved = factors
                .iter()
                .map(|f| {
                    self.bricks
                        .id(&f.symbol)
                        .map(|id| (id, f.power))
                        .ok_or_else(|| format!("symbol '{}' is not defined", f.symbol))
                })
                .collect::<Result<Vec<_>, String>>()?;

            let id = self
                .bricks
                .insert(Brick::Derived(DerivedField::new(&name, nodes, monomial_calc(resolved))))?;
            self.derived_ids.push(id);
            log::debug!("Registered derived field '{}'", name);
        }
        Ok(())
    }

    fn check_nodes(&self, name: &str, len: usize) -> Result<(), String> {
        match self.nodes {
            Some(nodes) if nodes != len => Err(format!(
                "'{}' has {} nodes but the model uses {}",
                name, len, nodes
            )),
            _ => Ok(()),
        }
    }

    // =============================================================================================
    // Initialisation
    // =============================================================================================

    /// Compile every equation
    ///
    /// Fields without an equation get an empty right-hand side and stay
    /// constant. Derived fields are refreshed if the fields are in real
    /// space.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation evolves something that is not a field
    /// or references an undefined symbol.
    pub fn init(&mut self) -> Result<(), String> {
        for equation in &self.equations {
            match self.bricks.get(&equation.field) {
                Some(Brick::Field(_)) => {}
                Some(_) => {
                    return Err(format!(
                        "Equation '{}' evolves '{}', which is not a field",
                        equation.text, equation.field
                    ));
                }
                None => {
                    return Err(format!(
                        "Equation '{}' evolves unknown field '{}'",
                        equation.text, equation.field
                    ));
                }
            }
        }

        for index in 0..self.equations.len() {
            let equation = self.equations[index].clone();
            self.register_monomials(&equation)?;
        }

        let mut rhs = vec![Rhs::new(); self.field_ids.len()];
        for equation in &self.equations {
            let slot = self
                .field_ids
                .iter()
                .position(|&id| self.bricks.by_id(id).name() == equation.field)
                .ok_or_else(|| format!("Unknown field '{}'", equation.field))?;
            rhs[slot] = compile_equation(equation, &self.bricks, &mut self.user_terms)?;
        }
        self.rhs = rhs;
        self.initialized = true;

        if self.fields_in(Representation::Real) {
            self.sync_derived_fields()?;
        }
        Ok(())
    }

    /// Compile an equation that is not stored in the model
    pub(crate) fn compile_standalone(&mut self, equation: &Equation) -> Result<Rhs, String> {
        self.register_monomials(equation)?;
        let rhs = compile_equation(equation, &self.bricks, &mut self.user_terms)?;
        if self.fields_in(Representation::Real) {
            self.sync_derived_fields()?;
        }
        Ok(rhs)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // =============================================================================================
    // Evaluation
    // =============================================================================================

    /// Recompute every derived field from the current real-space fields
    ///
    /// # Errors
    ///
    /// Returns an error if a field is in frequency space.
    pub fn sync_derived_fields(&mut self) -> Result<(), String> {
        self.require_fields_in(Representation::Real, "update derived fields")?;
        for index in 0..self.derived_ids.len() {
            self.bricks.refresh_derived(self.derived_ids[index]);
        }
        Ok(())
    }

    /// Explicit part of the right-hand side of field `index`
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not initialised, `index` is out of
    /// range, or a field-like brick is not in frequency space.
    pub fn get_rhs(&self, index: usize, freq: &dyn FrequencyLookup, time: f64) -> Result<Vec<Complex64>, String> {
        let rhs = self.compiled(index)?;
        let ctx = EvalContext {
            bricks: &self.bricks,
            freq,
            time,
        };

        let mut total = sum_terms(&rhs.terms, &ctx, self.num_nodes());
        for (_, modifier) in self.modifiers.iter().filter(|(slot, _)| *slot == index) {
            modifier(&mut total);
        }
        Ok(total)
    }

    /// Implicit linear coefficient of field `index`
    pub fn get_denum(&self, index: usize, freq: &dyn FrequencyLookup, time: f64) -> Result<Vec<Complex64>, String> {
        let rhs = self.compiled(index)?;
        let ctx = EvalContext {
            bricks: &self.bricks,
            freq,
            time,
        };
        Ok(sum_terms(&rhs.denum, &ctx, self.num_nodes()))
    }

    fn compiled(&self, index: usize) -> Result<&Rhs, String> {
        if !self.initialized {
            return Err("Model must be initialised before evaluating right-hand sides".to_string());
        }
        let rhs = self
            .rhs
            .get(index)
            .ok_or_else(|| format!("No field with index {} (model has {})", index, self.rhs.len()))?;

        self.require_fields_in(Representation::Frequency, "evaluate right-hand sides")?;
        for &id in &self.derived_ids {
            let brick = self.bricks.by_id(id);
            if brick.representation() != Some(Representation::Frequency) {
                return Err(format!(
                    "Derived field '{}' must be in frequency space to evaluate right-hand sides",
                    brick.name()
                ));
            }
        }
        Ok(rhs)
    }

    /// Notify user terms that a step has completed
    pub fn on_step_finished(&mut self, time: f64) {
        self.user_terms.on_step_finished(time, &self.bricks);
    }

    // =============================================================================================
    // Transforms
    // =============================================================================================

    /// Refresh derived fields, then move every field-like brick to frequency space
    pub fn to_frequency_space(&mut self, transform: &mut dyn SpectralTransform) -> Result<(), String> {
        self.check_transform(transform)?;
        self.sync_derived_fields()?;
        for &id in self.field_ids.iter().chain(self.derived_ids.iter()) {
            if let Some((data, representation)) = self.bricks.buffer_mut(id) {
                transform.fft(data);
                *representation = Representation::Frequency;
            }
        }
        Ok(())
    }

    /// Move every field back to real space, normalised by the node count
    ///
    /// Derived fields keep their frequency-space values until the next
    /// refresh.
    pub fn to_real_space(&mut self, transform: &mut dyn SpectralTransform) -> Result<(), String> {
        self.check_transform(transform)?;
        self.require_fields_in(Representation::Frequency, "transform back to real space")?;
        let scale = 1.0 / self.num_nodes() as f64;
        for &id in &self.field_ids {
            if let Some((data, representation)) = self.bricks.buffer_mut(id) {
                transform.ifft(data);
                data.iter_mut().for_each(|v| *v *= scale);
                *representation = Representation::Real;
            }
        }
        Ok(())
    }

    /// Real parts of every field, concatenated in registration order
    pub fn real_state(&self) -> Result<Vec<f64>, String> {
        self.require_fields_in(Representation::Real, "read the real-space state")?;
        Ok(self
            .field_ids
            .iter()
            .flat_map(|&id| self.bricks.by_id(id).data().unwrap_or(&[]).iter().map(|v| v.re))
            .collect())
    }

    /// Overwrite every field with real nodal values, concatenated in registration order
    pub fn load_real_state(&mut self, values: &[f64]) -> Result<(), String> {
        let nodes = self.num_nodes();
        if values.len() != nodes * self.field_ids.len() {
            return Err(format!(
                "State has {} values, expected {}",
                values.len(),
                nodes * self.field_ids.len()
            ));
        }
        for (k, &id) in self.field_ids.iter().enumerate() {
            if let Some((data, representation)) = self.bricks.buffer_mut(id) {
                for (dst, &src) in data.iter_mut().zip(&values[k * nodes..(k + 1) * nodes]) {
                    *dst = Complex64::new(src, 0.0);
                }
                *representation = Representation::Real;
            }
        }
        Ok(())
    }

    /// Overwrite a representation tag without transforming the data
    ///
    /// For external steppers and tests that prepare buffers by hand.
    pub fn set_representation_unchecked(&mut self, name: &str, representation: Representation) -> Result<(), String> {
        let id = self.bricks.id(name).ok_or_else(|| format!("Unknown brick '{}'", name))?;
        match self.bricks.buffer_mut(id) {
            Some((_, tag)) => {
                *tag = representation;
                Ok(())
            }
            None => Err(format!("'{}' is a scalar and has no representation", name)),
        }
    }

    fn check_transform(&self, transform: &dyn SpectralTransform) -> Result<(), String> {
        if transform.num_nodes() != self.num_nodes() {
            return Err(format!(
                "Transform covers {} nodes but the model uses {}",
                transform.num_nodes(),
                self.num_nodes()
            ));
        }
        Ok(())
    }

    fn fields_in(&self, representation: Representation) -> bool {
        self.field_ids
            .iter()
            .all(|&id| self.bricks.by_id(id).representation() == Some(representation))
    }

    fn require_fields_in(&self, representation: Representation, action: &str) -> Result<(), String> {
        for &id in &self.field_ids {
            let brick = self.bricks.by_id(id);
            if brick.representation() != Some(representation) {
                return Err(format!(
                    "Field '{}' must be in {} to {}",
                    brick.name(),
                    representation,
                    action
                ));
            }
        }
        Ok(())
    }

    // =============================================================================================
    // Accessors
    // =============================================================================================

    pub fn bricks(&self) -> &Bricks {
        &self.bricks
    }

    pub fn num_fields(&self) -> usize {
        self.field_ids.len()
    }

    /// Nodes per field, zero before the first field is added
    pub fn num_nodes(&self) -> usize {
        self.nodes.unwrap_or(0)
    }

    /// Index of the equation (and right-hand side) of `field`
    pub fn eq_number(&self, field: &str) -> Option<usize> {
        self.field_ids
            .iter()
            .position(|&id| self.bricks.by_id(id).name() == field)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        match self.bricks.get(name) {
            Some(Brick::Field(field)) => Some(field),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let id = self.bricks.id(name)?;
        match self.bricks.by_id_mut(id) {
            Brick::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn field_at(&self, index: usize) -> Option<&Field> {
        match self.bricks.by_id(*self.field_ids.get(index)?) {
            Brick::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn field_at_mut(&mut self, index: usize) -> Option<&mut Field> {
        let id = *self.field_ids.get(index)?;
        match self.bricks.by_id_mut(id) {
            Brick::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.field_ids.iter().filter_map(|&id| match self.bricks.by_id(id) {
            Brick::Field(field) => Some(field),
            _ => None,
        })
    }

    pub fn derived_field(&self, name: &str) -> Option<&DerivedField> {
        match self.bricks.get(name) {
            Some(Brick::Derived(derived)) => Some(derived),
            _ => None,
        }
    }

    /// Names of the evolved fields in registration order
    pub fn field_names(&self) -> Vec<String> {
        self.fields().map(|f| f.name().to_string()).collect()
    }

    /// Names of the evolved fields followed by the derived fields
    pub fn all_field_names(&self) -> Vec<String> {
        self.field_ids
            .iter()
            .chain(self.derived_ids.iter())
            .map(|&id| self.bricks.by_id(id).name().to_string())
            .collect()
    }

    /// Number of terms and implicit coefficients compiled for field `index`
    pub fn term_counts(&self, index: usize) -> Option<(usize, usize)> {
        self.rhs.get(index).map(|rhs| (rhs.terms.len(), rhs.denum.len()))
    }

    /// Human-readable overview of the model
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Model with {} field(s), {} derived field(s), {} user term(s) on {} node(s)",
            self.field_ids.len(),
            self.derived_ids.len(),
            self.user_terms.len(),
            self.num_nodes()
        )];
        for (index, name) in self.field_names().iter().enumerate() {
            let equation = self
                .equations
                .iter()
                .find(|eq| eq.field == *name)
                .map_or("(no equation)", |eq| eq.text.as_str());
            let counts = self
                .term_counts(index)
                .map_or(String::from("not compiled"), |(t, d)| format!("{} explicit, {} implicit", t, d));
            lines.push(format!("  [{}] {}: {} ({})", index, name, equation, counts));
        }
        for &id in &self.derived_ids {
            lines.push(format!("  derived: {}", self.bricks.by_id(id).name()));
        }
        lines.join("\n")
    }

    /// Log the summary at info level
    pub fn summarize(&self) {
        for line in self.summary().lines() {
            log::info!("{}", line);
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("fields", &self.field_names())
            .field("derived", &self.derived_ids.len())
            .field("equations", &self.equations.len())
            .field("nodes", &self.nodes)
            .field("initialized", &self.initialized)
            .finish()
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{EvalContext, Term};
    use crate::spectral::FourierTransform;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reaction_diffusion() -> Model {
        let mut model = Model::new();
        for name in ["concA", "concB", "concC"] {
            model.add_field(Field::uniform(name, 8, 0.5)).unwrap();
        }
        model.add_scalar(Scalar::new("kf", 1.0)).unwrap();
        model.add_scalar(Scalar::new("kr", 0.5)).unwrap();
        model
            .add_equation("dconcA/dt = LAP concA - kf*concA^2*concB^3 + kr*concC")
            .unwrap();
        model
            .add_equation("dconcB/dt = LAP concB - kf*concA^2*concB^3 + kr*concC")
            .unwrap();
        model
            .add_equation("dconcC/dt = LAP concC - kr*concC + kf*concA^2*concB^3")
            .unwrap();
        model
    }

    #[test]
    fn test_reaction_diffusion_structure() {
        let mut model = reaction_diffusion();
        model.init().unwrap();

        assert_eq!(
            model.all_field_names(),
            vec!["concA", "concB", "concC", "concA^2*concB^3"]
        );
        assert_eq!(model.term_counts(0), Some((2, 1)));
        assert_eq!(model.term_counts(1), Some((2, 1)));
        assert_eq!(model.term_counts(2), Some((1, 2)));
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut model = reaction_diffusion();
        model.init().unwrap();
        model.init().unwrap();
        assert_eq!(model.all_field_names().len(), 4);
    }

    #[test]
    fn test_derived_field_refreshed_by_init() {
        let mut model = reaction_diffusion();
        model.init().unwrap();
        let derived = model.derived_field("concA^2*concB^3").unwrap();
        assert_relative_eq!(derived.get(3).re, 0.25 * 0.125);
    }

    #[test]
    fn test_monomial_registered_once_fields_exist() {
        let mut model = Model::new();
        model.add_equation("dphi/dt = phi^3").unwrap();
        assert!(model.derived_field("phi^3").is_none());

        model.add_field(Field::uniform("phi", 4, 2.0)).unwrap();
        model.init().unwrap();
        assert_relative_eq!(model.derived_field("phi^3").unwrap().get(0).re, 8.0);
    }

    #[test]
    fn test_registration_errors() {
        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();

        assert!(model.add_field(Field::zeros("conc", 4)).is_err());
        assert!(model.add_field(Field::zeros("other", 5)).is_err());
        assert!(model.add_field(Field::zeros("empty", 0)).is_err());
        assert!(model.add_scalar(Scalar::new("conc", 1.0)).is_err());

        assert!(model.add_equation("conc = 1").is_err());
        model.add_equation("dconc/dt = LAP conc").unwrap();
        assert!(model.add_equation("dconc/dt = conc").is_err());
    }

    #[test]
    fn test_equation_for_scalar_or_unknown_fails_at_init() {
        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        model.add_scalar(Scalar::new("rate", 1.0)).unwrap();
        model.add_equation("drate/dt = conc").unwrap();
        assert!(model.init().is_err());

        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        model.add_equation("dmissing/dt = conc").unwrap();
        assert!(model.init().is_err());
    }

    #[test]
    fn test_undefined_symbol_fails_at_init() {
        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        model.add_equation("dconc/dt = m1*conc").unwrap();
        let err = model.init().unwrap_err();
        assert!(err.contains("m1"));
    }

    #[test]
    fn test_rhs_requires_frequency_space() {
        let mut model = reaction_diffusion();
        model.init().unwrap();
        let freq = |_i: usize| vec![0.0];

        let err = model.get_rhs(0, &freq, 0.0).unwrap_err();
        assert!(err.contains("frequency space"));
        assert!(model.get_denum(0, &freq, 0.0).is_err());
    }

    #[test]
    fn test_rhs_requires_init() {
        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        model.add_equation("dconc/dt = LAP conc").unwrap();
        let freq = |_i: usize| vec![0.0];
        assert!(model.get_rhs(0, &freq, 0.0).is_err());
    }

    #[test]
    fn test_sync_requires_real_space() {
        let mut model = reaction_diffusion();
        model.init().unwrap();
        model.set_representation_unchecked("concB", Representation::Frequency).unwrap();
        assert!(model.sync_derived_fields().is_err());
        assert!(model.set_representation_unchecked("kf", Representation::Real).is_err());
    }

    #[test]
    fn test_transform_round_trip_keeps_values() {
        let mut model = Model::new();
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        model.add_field(Field::from_real("conc", &values)).unwrap();
        model.add_equation("dconc/dt = conc^2").unwrap();
        model.init().unwrap();

        let mut ft = FourierTransform::new(&[8]).unwrap();
        model.to_frequency_space(&mut ft).unwrap();
        assert_eq!(model.field("conc").unwrap().representation(), Representation::Frequency);
        assert_eq!(
            model.derived_field("conc^2").unwrap().representation(),
            Representation::Frequency
        );

        model.to_real_space(&mut ft).unwrap();
        let state = model.real_state().unwrap();
        for (got, expected) in state.iter().zip(values.iter()) {
            assert_relative_eq!(*got, *expected, epsilon = 1e-12);
        }
        assert!(model.to_real_space(&mut ft).is_err());
    }

    #[test]
    fn test_transform_size_mismatch() {
        let mut model = Model::new();
        model.add_field(Field::uniform("conc", 8, 1.0)).unwrap();
        model.init().unwrap();

        let mut small = FourierTransform::new(&[4]).unwrap();
        let err = model.to_frequency_space(&mut small).unwrap_err();
        assert!(err.contains("4 nodes"));
        assert_eq!(model.field("conc").unwrap().representation(), Representation::Real);

        model.set_representation_unchecked("conc", Representation::Frequency).unwrap();
        assert!(model.to_real_space(&mut small).is_err());
        assert_eq!(model.field("conc").unwrap().representation(), Representation::Frequency);
    }

    #[test]
    fn test_derived_field_before_any_field() {
        let calc = || Box::new(|_bricks: &Bricks, out: &mut [Complex64]| out.fill(Complex64::new(1.0, 0.0)));

        let mut model = Model::new();
        model.register_derived_field(DerivedField::new("ones", 4, calc())).unwrap();
        assert_eq!(model.num_nodes(), 4);

        assert!(model.register_derived_field(DerivedField::new("twos", 6, calc())).is_err());
        assert!(model.register_derived_field(DerivedField::new("empty", 0, calc())).is_err());
        assert!(model.add_field(Field::zeros("conc", 5)).is_err());
        model.add_field(Field::zeros("conc", 4)).unwrap();
    }

    #[test]
    fn test_rhs_of_uniform_field() {
        // conc = 2 everywhere, dconc/dt = rate*conc^2 evaluates to rate*4*N at k = 0
        let mut model = Model::new();
        model.add_field(Field::uniform("conc", 4, 2.0)).unwrap();
        model.add_scalar(Scalar::new("rate", -1.0)).unwrap();
        model.add_equation("dconc/dt = rate*conc^2 + LAP conc").unwrap();
        model.init().unwrap();

        let mut ft = FourierTransform::new(&[4]).unwrap();
        model.to_frequency_space(&mut ft).unwrap();

        let rhs = model.get_rhs(0, &ft, 0.0).unwrap();
        assert_relative_eq!(rhs[0].re, -16.0, epsilon = 1e-12);
        assert_relative_eq!(rhs[1].norm(), 0.0, epsilon = 1e-12);

        let denum = model.get_denum(0, &ft, 0.0).unwrap();
        assert_eq!(denum[0].re, 0.0);
        assert!(denum[1].re < 0.0);
    }

    #[test]
    fn test_rhs_modifier_is_applied() {
        let mut model = Model::new();
        model.add_field(Field::uniform("conc", 4, 1.0)).unwrap();
        model.add_scalar(Scalar::new("rate", 3.0)).unwrap();
        model.add_equation("dconc/dt = rate*conc^2").unwrap();
        model
            .register_rhs_modifier("conc", |rhs: &mut [Complex64]| {
                rhs.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
            })
            .unwrap();
        assert!(model.register_rhs_modifier("missing", |_rhs: &mut [Complex64]| {}).is_err());
        model.init().unwrap();

        let mut ft = FourierTransform::new(&[4]).unwrap();
        model.to_frequency_space(&mut ft).unwrap();
        let rhs = model.get_rhs(0, &ft, 0.0).unwrap();
        assert!(rhs.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_register_function() {
        let mut model = Model::new();
        assert!(model
            .register_function("early", |_i: usize, _b: &Bricks| Complex64::new(0.0, 0.0))
            .is_err());

        model.add_field(Field::from_real("conc", &[1.0, 2.0, 3.0, 4.0])).unwrap();
        model
            .register_function("twice", |i: usize, bricks: &Bricks| {
                bricks.get("conc").map_or(Complex64::new(0.0, 0.0), |b| b.get(i) * 2.0)
            })
            .unwrap();
        model.add_equation("dconc/dt = twice").unwrap();
        model.init().unwrap();

        assert_eq!(model.term_counts(0), Some((1, 0)));
        assert_relative_eq!(model.derived_field("twice").unwrap().get(2).re, 6.0);
    }

    struct CountingTerm {
        constructed: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    impl PureTerm for CountingTerm {
        fn construct(&mut self, _bricks: &Bricks) -> Result<Term, String> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(|_ctx: &EvalContext<'_>, out: &mut [Complex64]| {
                out.iter_mut().for_each(|v| *v = Complex64::new(1.0, 0.0));
            }))
        }

        fn on_step_finished(&mut self, _time: f64, _bricks: &Bricks) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_user_term_lifecycle() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        model
            .register_explicit_term(
                "SOURCE",
                Box::new(CountingTerm {
                    constructed: Arc::clone(&constructed),
                    finished: Arc::clone(&finished),
                }),
                Vec::new(),
            )
            .unwrap();
        model.add_equation("dconc/dt = LAP conc + 2*SOURCE").unwrap();
        model.init().unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(model.term_counts(0), Some((1, 1)));

        model.on_step_finished(0.1);
        model.on_step_finished(0.2);
        assert_eq!(finished.load(Ordering::SeqCst), 2);

        let mut ft = FourierTransform::new(&[4]).unwrap();
        model.to_frequency_space(&mut ft).unwrap();
        let rhs = model.get_rhs(0, &ft, 0.0).unwrap();
        assert!(rhs.iter().all(|v| (v.re - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_user_term_name_conflicts() {
        let mut model = Model::new();
        model.add_field(Field::zeros("conc", 4)).unwrap();
        let term = || {
            Box::new(CountingTerm {
                constructed: Arc::new(AtomicUsize::new(0)),
                finished: Arc::new(AtomicUsize::new(0)),
            })
        };
        assert!(model.register_implicit_term("conc", term(), Vec::new()).is_err());
        model.register_implicit_term("T", term(), Vec::new()).unwrap();
        assert!(model.register_explicit_term("T", term(), Vec::new()).is_err());
    }

    #[test]
    fn test_eq_number_and_summary() {
        let mut model = reaction_diffusion();
        model.init().unwrap();
        assert_eq!(model.eq_number("concA"), Some(0));
        assert_eq!(model.eq_number("concC"), Some(2));
        assert_eq!(model.eq_number("kf"), None);

        let summary = model.summary();
        assert!(summary.contains("3 field(s)"));
        assert!(summary.contains("concA^2*concB^3"));
    }

    #[test]
    fn test_load_real_state_checks_length() {
        let mut model = reaction_diffusion();
        assert!(model.load_real_state(&[0.0; 3]).is_err());
        model.load_real_state(&vec![1.0; 24]).unwrap();
        assert_eq!(model.field("concB").unwrap().total(), 8.0);
    }
}

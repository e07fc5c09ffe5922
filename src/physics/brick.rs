//! Bricks: the named building blocks of a model
//!
//! Every symbol an equation can reference resolves to a brick:
//!
//! - [`Field`]: an evolved quantity, one complex value per grid node
//! - [`Scalar`]: a named constant, the same value at every node
//! - [`DerivedField`]: a nodal buffer recomputed from other bricks
//!
//! Field-like bricks (fields and derived fields) carry a [`Representation`]
//! tag telling whether their buffer holds nodal values or Fourier
//! amplitudes.

use std::collections::HashMap;
use std::fmt;

use num_complex::Complex64;

// =================================================================================================
// Representation
// =================================================================================================

/// Which space a field-like buffer currently lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Nodal values on the grid
    Real,
    /// Fourier amplitudes (unnormalised forward transform)
    Frequency,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Real => write!(f, "real space"),
            Representation::Frequency => write!(f, "frequency space"),
        }
    }
}

// =================================================================================================
// Field
// =================================================================================================

/// Named evolved quantity
///
/// # Example
///
/// ```rust
/// use spectral_pf::physics::{Field, Representation};
///
/// let field = Field::from_real("conc", &[0.1, 0.2, 0.3]);
/// assert_eq!(field.name(), "conc");
/// assert_eq!(field.len(), 3);
/// assert_eq!(field.representation(), Representation::Real);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    data: Vec<Complex64>,
    representation: Representation,
}

impl Field {
    /// Field of `nodes` zeros in real space
    pub fn zeros(name: &str, nodes: usize) -> Self {
        Self::uniform(name, nodes, 0.0)
    }

    /// Field holding the same real value at every node
    pub fn uniform(name: &str, nodes: usize, value: f64) -> Self {
        Self::new(name, vec![Complex64::new(value, 0.0); nodes])
    }

    /// Field from real nodal values
    pub fn from_real(name: &str, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|&v| Complex64::new(v, 0.0)).collect())
    }

    /// Field from complex nodal values
    pub fn new(name: &str, data: Vec<Complex64>) -> Self {
        Self {
            name: name.to_string(),
            data,
            representation: Representation::Real,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Value at node `i`
    pub fn get(&self, i: usize) -> Complex64 {
        self.data[i]
    }

    /// Real parts of all nodes
    pub fn real_values(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.re).collect()
    }

    /// Sum of the real parts (total mass for a concentration)
    pub fn total(&self) -> f64 {
        self.data.iter().map(|v| v.re).sum()
    }

    pub(crate) fn set_representation(&mut self, representation: Representation) {
        self.representation = representation;
    }
}

// =================================================================================================
// Scalar
// =================================================================================================

/// Named constant
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    name: String,
    value: Complex64,
}

impl Scalar {
    pub fn new(name: &str, value: f64) -> Self {
        Self::complex(name, Complex64::new(value, 0.0))
    }

    pub fn complex(name: &str, value: Complex64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Complex64 {
        self.value
    }

    /// Value at any node
    pub fn get(&self, _i: usize) -> Complex64 {
        self.value
    }
}

// =================================================================================================
// Derived Field
// =================================================================================================

/// Recomputation rule of a derived field
///
/// The closure reads any other brick and writes one value per node into the
/// output buffer. It must not read the derived field it belongs to.
pub type DerivedFieldCalc = Box<dyn Fn(&Bricks, &mut [Complex64]) + Send + Sync>;

/// Nodal buffer computed from other bricks
///
/// Derived fields hold the nonlinear products appearing in equations, for
/// example `concA^2*concB^3`. They are recomputed in real space before every
/// forward transform and are then transformed alongside the fields.
pub struct DerivedField {
    name: String,
    data: Vec<Complex64>,
    calc: DerivedFieldCalc,
    representation: Representation,
}

impl DerivedField {
    pub fn new(name: &str, nodes: usize, calc: DerivedFieldCalc) -> Self {
        Self {
            name: name.to_string(),
            data: vec![Complex64::new(0.0, 0.0); nodes],
            calc,
            representation: Representation::Real,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn get(&self, i: usize) -> Complex64 {
        self.data[i]
    }
}

impl fmt::Debug for DerivedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedField")
            .field("name", &self.name)
            .field("nodes", &self.data.len())
            .field("representation", &self.representation)
            .finish()
    }
}

// =================================================================================================
// Brick
// =================================================================================================

/// Any named symbol of a model
#[derive(Debug)]
pub enum Brick {
    Field(Field),
    Scalar(Scalar),
    Derived(DerivedField),
}

impl Brick {
    pub fn name(&self) -> &str {
        match self {
            Brick::Field(field) => field.name(),
            Brick::Scalar(scalar) => scalar.name(),
            Brick::Derived(derived) => derived.name(),
        }
    }

    /// Value at node `i`
    pub fn get(&self, i: usize) -> Complex64 {
        match self {
            Brick::Field(field) => field.get(i),
            Brick::Scalar(scalar) => scalar.get(i),
            Brick::Derived(derived) => derived.get(i),
        }
    }

    /// True for fields and derived fields
    pub fn is_field_like(&self) -> bool {
        !matches!(self, Brick::Scalar(_))
    }

    /// Representation tag of field-like bricks
    pub fn representation(&self) -> Option<Representation> {
        match self {
            Brick::Field(field) => Some(field.representation()),
            Brick::Scalar(_) => None,
            Brick::Derived(derived) => Some(derived.representation()),
        }
    }

    /// Nodal buffer of field-like bricks
    pub fn data(&self) -> Option<&[Complex64]> {
        match self {
            Brick::Field(field) => Some(field.data()),
            Brick::Scalar(_) => None,
            Brick::Derived(derived) => Some(derived.data()),
        }
    }
}

// =================================================================================================
// Brick Registry
// =================================================================================================

/// Stable handle of a registered brick
pub type BrickId = usize;

/// Name-indexed collection of bricks
///
/// Bricks are never removed, so a [`BrickId`] stays valid for the lifetime
/// of the registry. Compiled terms capture ids instead of names.
#[derive(Debug, Default)]
pub struct Bricks {
    entries: Vec<Brick>,
    index: HashMap<String, BrickId>,
}

impl Bricks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brick under its own name
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken.
    pub fn insert(&mut self, brick: Brick) -> Result<BrickId, String> {
        let name = brick.name().to_string();
        if name.is_empty() {
            return Err("Brick names must not be empty".to_string());
        }
        if self.index.contains_key(&name) {
            return Err(format!("A brick named '{}' is already registered", name));
        }
        let id = self.entries.len();
        self.entries.push(brick);
        self.index.insert(name, id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<BrickId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Brick> {
        self.id(name).map(|id| &self.entries[id])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Brick behind a handle
    ///
    /// # Panics
    ///
    /// Panics if `id` was not returned by this registry.
    pub fn by_id(&self, id: BrickId) -> &Brick {
        &self.entries[id]
    }

    pub(crate) fn by_id_mut(&mut self, id: BrickId) -> &mut Brick {
        &mut self.entries[id]
    }

    /// True if `name` refers to a field or derived field
    pub fn is_field_like(&self, name: &str) -> bool {
        self.get(name).is_some_and(Brick::is_field_like)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Brick> {
        self.entries.iter()
    }

    /// Buffer and tag of a field-like brick, for in-place transforms
    pub(crate) fn buffer_mut(&mut self, id: BrickId) -> Option<(&mut Vec<Complex64>, &mut Representation)> {
        match &mut self.entries[id] {
            Brick::Field(field) => Some((&mut field.data, &mut field.representation)),
            Brick::Derived(derived) => Some((&mut derived.data, &mut derived.representation)),
            Brick::Scalar(_) => None,
        }
    }

    /// Re-run the calculation of a derived field
    ///
    /// The output buffer is detached while the calculation runs, so the
    /// closure sees every other brick through a shared borrow.
    pub(crate) fn refresh_derived(&mut self, id: BrickId) {
        let mut data = match &mut self.entries[id] {
            Brick::Derived(derived) => std::mem::take(&mut derived.data),
            _ => return,
        };

        if let Brick::Derived(derived) = &self.entries[id] {
            (derived.calc)(self, &mut data);
        }

        if let Brick::Derived(derived) = &mut self.entries[id] {
            derived.data = data;
            derived.representation = Representation::Real;
        }
    }
}

//! Observers sampled once per epoch
//!
//! A [`Monitor`] reads the bricks of the model after every epoch of
//! [`Solver::solve`](super::Solver::solve) and keeps whatever it needs.
//! Recorded data is exported as JSON.

use serde::{Deserialize, Serialize};

use crate::physics::{Brick, Bricks};

/// Records data from the model between epochs
pub trait Monitor {
    /// Sample the current state
    fn add(&mut self, bricks: &Bricks);

    /// Everything recorded so far
    fn to_json(&self) -> serde_json::Value;

    /// Monitor kind, written into the JSON export
    fn name(&self) -> &str;
}

/// Real part of one field at one node, sampled every epoch
///
/// ```rust
/// use spectral_pf::physics::{Field, Model};
/// use spectral_pf::solver::{Monitor, PointMonitor};
///
/// let mut model = Model::new();
/// model.add_field(Field::from_real("conc", &[0.5, 2.0])).unwrap();
///
/// let mut monitor = PointMonitor::new("conc", 1);
/// monitor.add(model.bricks());
/// assert_eq!(monitor.data(), &[2.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMonitor {
    field: String,
    site: usize,
    data: Vec<f64>,
}

impl PointMonitor {
    pub fn new(field: &str, site: usize) -> Self {
        Self {
            field: field.to_string(),
            site,
            data: Vec::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn site(&self) -> usize {
        self.site
    }

    /// Samples in epoch order
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl Monitor for PointMonitor {
    fn add(&mut self, bricks: &Bricks) {
        let value = match bricks.get(&self.field) {
            Some(Brick::Field(field)) if self.site < field.len() => field.get(self.site).re,
            Some(Brick::Field(field)) => {
                log::warn!(
                    "PointMonitor: site {} out of range for field '{}' ({} nodes)",
                    self.site,
                    self.field,
                    field.len()
                );
                return;
            }
            _ => {
                log::warn!("PointMonitor: no field named '{}'", self.field);
                return;
            }
        };
        self.data.push(value);
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "field": self.field,
            "site": self.site,
            "data": self.data,
        })
    }

    fn name(&self) -> &str {
        "PointMonitor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Model, Scalar};
    use crate::physics::Field;

    fn model() -> Model {
        let mut model = Model::new();
        model.add_field(Field::from_real("conc", &[1.0, 2.0, 3.0])).unwrap();
        model.add_scalar(Scalar::new("rate", 4.0)).unwrap();
        model
    }

    #[test]
    fn test_records_each_sample() {
        let mut model = model();
        let mut monitor = PointMonitor::new("conc", 2);

        monitor.add(model.bricks());
        model.field_mut("conc").unwrap().data_mut()[2].re = 5.0;
        monitor.add(model.bricks());

        assert_eq!(monitor.data(), &[3.0, 5.0]);
        assert_eq!(monitor.site(), 2);
        assert_eq!(monitor.field(), "conc");
    }

    #[test]
    fn test_missing_field_is_skipped() {
        let model = model();

        let mut missing = PointMonitor::new("phase", 0);
        missing.add(model.bricks());
        assert!(missing.data().is_empty());

        // Scalars are not sampled
        let mut scalar = PointMonitor::new("rate", 0);
        scalar.add(model.bricks());
        assert!(scalar.data().is_empty());

        let mut out_of_range = PointMonitor::new("conc", 3);
        out_of_range.add(model.bricks());
        assert!(out_of_range.data().is_empty());
    }

    #[test]
    fn test_json_export() {
        let model = model();
        let mut monitor = PointMonitor::new("conc", 0);
        monitor.add(model.bricks());

        let json = monitor.to_json();
        assert_eq!(json["name"], "PointMonitor");
        assert_eq!(json["field"], "conc");
        assert_eq!(json["site"], 0);
        assert_eq!(json["data"][0], 1.0);
    }
}

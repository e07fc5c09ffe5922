//! Helper functions for integration tests

#![allow(dead_code)]

use std::f64::consts::PI;

use spectral_pf::physics::{Field, Model, Scalar};

/// Assert that two real-valued fields are close node by node
pub fn assert_fields_close(actual: &[f64], expected: &[f64], tolerance: f64, message: &str) {
    assert_eq!(actual.len(), expected.len(), "{}: Dimension mismatch", message);

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff < tolerance,
            "{}: Node {} differs by {} (tolerance {})",
            message, i, diff, tolerance
        );
    }
}

/// Compute relative error: |actual - expected| / |expected|
pub fn relative_error(actual: f64, expected: f64) -> f64 {
    if expected.abs() < 1e-10 {
        (actual - expected).abs()
    } else {
        (actual - expected).abs() / expected.abs()
    }
}

/// Mean real value of a field
pub fn mean(model: &Model, name: &str) -> f64 {
    let field = model.field(name).unwrap();
    field.total() / field.len() as f64
}

/// `dconc/dt = rate*conc` on a uniform 1D grid, not yet initialised
pub fn decay_model(nodes: usize, rate: f64) -> Model {
    let mut model = Model::new();
    model.add_field(Field::uniform("conc", nodes, 1.0)).unwrap();
    model.add_scalar(Scalar::new("rate", rate)).unwrap();
    model.add_equation("dconc/dt = rate*conc").unwrap();
    model
}

/// `offset + amplitude cos(2π mode x / n)` along the first axis of an `n × rows` grid
pub fn cosine_field(name: &str, n: usize, rows: usize, offset: f64, amplitude: f64, mode: usize) -> Field {
    let values: Vec<f64> = (0..n * rows)
        .map(|node| {
            let x = (node / rows) as f64;
            offset + amplitude * (2.0 * PI * mode as f64 * x / n as f64).cos()
        })
        .collect();
    Field::from_real(name, &values)
}

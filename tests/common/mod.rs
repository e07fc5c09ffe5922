//! Common utilities for integration tests

pub mod mock_terms;
pub mod test_helpers;

// Re-export commonly used items
pub use mock_terms::{ConstantRate, Damping, SplitDecay, StepCounter};
pub use test_helpers::{assert_fields_close, cosine_field, decay_model, mean, relative_error};

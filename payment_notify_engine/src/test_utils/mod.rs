//! Helpers shared by the engine's own tests and by downstream crates (enable the `test_utils` feature).
pub mod fixtures;
pub mod prepare_env;

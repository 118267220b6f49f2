//! Synthetic data generation.
//!
//! - `simulate`: hierarchical (multi-school) test-score samples with known truth

pub mod simulate;

pub use simulate::*;

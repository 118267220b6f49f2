//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter value objects (`Parameters`, `Noise`, `ModelResults`)
//! - the simulated dataset (`Dataset`, `Observation`, `Column`)
//! - model selection enums (`ModelKind`, `ModelSpec`) and `RunConfig`

pub mod types;

pub use types::*;

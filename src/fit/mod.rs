//! Model fitting.
//!
//! Responsibilities:
//!
//! - estimate OLS and REML mixed models from formulas (`ols`, `mixed`)
//! - map named coefficient tables back into `Parameters` (`results`)
//! - run the five model variants end to end (`models`)

pub mod mixed;
pub mod models;
pub mod ols;
pub mod results;

pub use mixed::*;
pub use models::*;
pub use ols::*;
pub use results::*;

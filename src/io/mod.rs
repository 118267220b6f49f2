//! Input/output helpers.
//!
//! - dataset CSV export (`export`)
//! - results JSON read/write (`results`)

pub mod export;
pub mod results;

pub use export::*;
pub use results::*;

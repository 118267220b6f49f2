//! Symbolic model formulas.
//!
//! - `parse`: formula text -> terms (`y ~ x + C(g) * z`)
//! - `design`: terms bound to a dataset -> named design rows

pub mod design;
pub mod parse;

pub use design::*;
pub use parse::*;

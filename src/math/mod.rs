//! Numerical building blocks: streaming cross products and symmetric
//! positive-definite solves.

pub mod cross;

pub use cross::*;

//! `school-effects` library crate.
//!
//! Simulates test scores for students nested in schools, then fits pooled,
//! fixed-effects and random-effects regressions to see which of them recover
//! the parameters the data was drawn from.
//!
//! The binary (`schoolfx`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the estimators are reusable outside the CLI

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod formula;
pub mod io;
pub mod math;
pub mod report;

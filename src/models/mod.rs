//! Core data models for codegenie.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants with fallback strategies

mod config;
mod error;
mod goal;
mod research;

pub use config::*;
pub use error::*;
pub use goal::*;
pub use research::*;

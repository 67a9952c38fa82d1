//! Store module for users, sessions, cache and analytics.
//!
//! Provides:
//! - `Tables`: In-memory table state with pure operations
//! - `Database`: Locking and atomic snapshot persistence around `Tables`

mod database;
mod tables;

pub use database::*;
pub use tables::*;

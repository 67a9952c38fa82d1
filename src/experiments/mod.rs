//! Experiments module - random 3-SAT benchmarks.
//!
//! Provides:
//! - `Cnf` and `random_3sat`: Formula type and generator
//! - `DpllSolver`: Unit propagation plus branching
//! - `ExperimentRunner`: Approval, solve, JSONL log

mod cnf;
mod runner;
mod solver;

pub use cnf::*;
pub use runner::*;
pub use solver::*;

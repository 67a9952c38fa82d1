//! Agent module - goal classification and response assembly.
//!
//! Provides:
//! - `analyze_goal`: Keyword classification of a free-text goal
//! - `templates`: Code templates and canned markdown sections
//! - `Assistant`: Sessions, history and goal execution

mod analysis;
mod assistant;
pub mod templates;

pub use analysis::analyze_goal;
pub use assistant::*;

//! codegenie - CodeGenie Pro, an assistant service behind a JSON HTTP API.
//!
//! ## Architecture
//!
//! One process hosts five capabilities sharing a store and a rate limiter:
//! - **Assistant**: Classifies a goal and assembles a markdown response
//! - **Research Engine**: Concurrent multi-source search with a TTL cache
//! - **Code Playground**: Screened, rate-limited subprocess execution
//! - **Data Analytics**: Markdown analysis and insights for a table
//! - **SAT Experiments**: Random 3-SAT runs logged with an approval stamp
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Network/upstream uncertainties (timeouts, fallbacks)

pub mod agent;
pub mod analytics;
pub mod experiments;
pub mod models;
pub mod research;
pub mod security;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use agent::{Assistant, analyze_goal};
pub use analytics::{Dataset, comprehensive_analysis, insights};
pub use experiments::{ExperimentRecord, ExperimentRunner};
pub use models::{CodegenieError, Config, GoalResponse, ResearchResults, Result};
pub use research::ResearchEngine;
pub use security::{CodeSandbox, ExecutionOutcome, RateLimiter};
pub use server::AppState;
pub use store::Database;

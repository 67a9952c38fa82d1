//! Security module - rate limiting, input sanitizing and the code sandbox.

mod rate_limiter;
mod sandbox;
mod sanitizer;

pub use rate_limiter::*;
pub use sandbox::*;
pub use sanitizer::*;

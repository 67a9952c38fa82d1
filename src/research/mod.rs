//! Research module - multi-source search with a TTL cache.
//!
//! Epistemic foundation:
//! - K_i: Every source returns the same `SearchResult` shape
//! - B_i: Any upstream may be down, slow or rate limiting → empty results, logged
//! - I^B: Response latency is unknowable → per-source timeout
//!
//! Provides:
//! - `SearchSource`: One searchable upstream
//! - `DuckDuckGoSource`, `WikipediaSource`, `ArxivSource`, `SemanticScholarSource`
//! - `ResearchEngine`: Concurrent fan-out plus caching through the store

mod arxiv;
mod duckduckgo;
mod engine;
mod http;
mod semantic_scholar;
mod wikipedia;

pub use arxiv::*;
pub use duckduckgo::*;
pub use engine::*;
pub use http::HttpClient;
pub use semantic_scholar::*;
pub use wikipedia::*;

use crate::models::{Result, SearchResult, Source};
use async_trait::async_trait;

/// One searchable upstream.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Which source this is.
    fn source(&self) -> Source;

    /// Search for `query`, returning at most `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

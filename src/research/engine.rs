//! Concurrent multi-source search with caching.
//!
//! Epistemic foundation:
//! - K_i: Cache key is `search_{sha256(query)}_{max}`
//! - K_i: Only results with at least one non-empty source are cached
//! - B_i: A source may fail or hang → `[]` for that source, never an error
//! - I^B: Source latency unknowable → bounded by `source_timeout`
//! - K_i: Cache writes run on the blocking pool

use super::{
    ArxivSource, DuckDuckGoSource, HttpClient, SearchSource, SemanticScholarSource,
    WikipediaSource,
};
use crate::models::{ResearchConfig, ResearchResults, Result, Source};
use crate::store::Database;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cache key for a query and result limit.
pub fn cache_key(query: &str, max_results: usize) -> String {
    let digest = Sha256::digest(query.as_bytes());
    format!("search_{digest:x}_{max_results}")
}

/// Fans a query out to every configured source.
pub struct ResearchEngine {
    sources: Vec<Arc<dyn SearchSource>>,
    db: Arc<Database>,
    source_timeout: Duration,
    cache_ttl_minutes: i64,
}

impl ResearchEngine {
    /// Build the HTTP-backed sources named in config.
    pub fn from_config(config: &ResearchConfig, db: Arc<Database>) -> Result<Self> {
        let http = HttpClient::new(config)?;
        let sources = config
            .sources
            .iter()
            .map(|source| -> Arc<dyn SearchSource> {
                match source {
                    Source::Web => Arc::new(DuckDuckGoSource::new(http.clone(), config)),
                    Source::Wikipedia => Arc::new(WikipediaSource::new(http.clone(), config)),
                    Source::Arxiv => Arc::new(ArxivSource::new(http.clone(), config)),
                    Source::SemanticScholar => {
                        Arc::new(SemanticScholarSource::new(http.clone(), config))
                    }
                }
            })
            .collect();

        Ok(Self::with_sources(sources, db, config))
    }

    pub fn with_sources(
        sources: Vec<Arc<dyn SearchSource>>,
        db: Arc<Database>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            sources,
            db,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            cache_ttl_minutes: config.cache_ttl_minutes,
        }
    }

    /// Override the per-source timeout.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn sources(&self) -> Vec<Source> {
        self.sources.iter().map(|s| s.source()).collect()
    }

    /// Search every source, serving from cache when possible.
    pub async fn search(&self, query: &str, max_results: usize) -> ResearchResults {
        let key = cache_key(query, max_results);

        match self.db.get_cached(&key) {
            Ok(Some(cached)) => match serde_json::from_str::<ResearchResults>(&cached) {
                Ok(results) => {
                    debug!(key = %key, "Research cache hit");
                    return results;
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Research cache read failed"),
        }

        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = Arc::clone(source);
            let query = query.to_string();
            let timeout = self.source_timeout;
            let kind = source.source();
            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, source.search(&query, max_results)).await
            });
            handles.push((kind, handle));
        }

        let mut results = ResearchResults::default();
        for (kind, handle) in handles {
            let hits = match handle.await {
                Ok(Ok(Ok(hits))) => hits,
                Ok(Ok(Err(e))) => {
                    error!(source = %kind, error = %e, "Search source failed");
                    Vec::new()
                }
                Ok(Err(_)) => {
                    error!(
                        source = %kind,
                        timeout_secs = self.source_timeout.as_secs_f64(),
                        "Search source timed out"
                    );
                    Vec::new()
                }
                Err(e) => {
                    error!(source = %kind, error = %e, "Search task panicked");
                    Vec::new()
                }
            };
            results.push(kind, hits);
        }

        info!(
            sources = results.non_empty_sources(),
            total = results.total_results(),
            "Research complete"
        );

        if results.has_any() {
            match serde_json::to_string(&results) {
                Ok(json) => {
                    let db = Arc::clone(&self.db);
                    let ttl = self.cache_ttl_minutes;
                    let write =
                        tokio::task::spawn_blocking(move || db.set_cached(&key, &json, ttl));
                    match write.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(error = %e, "Research cache write failed"),
                        Err(e) => warn!(error = %e, "Research cache write task failed"),
                    }
                }
                Err(e) => warn!(error = %e, "Could not encode research results"),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodegenieError, SearchResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        kind: Source,
        hits: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SearchSource for FakeSource {
        fn source(&self) -> Source {
            self.kind
        }

        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.hits.min(max_results))
                .map(|i| {
                    SearchResult::new(
                        format!("{query} #{i}"),
                        format!("https://example.org/{i}"),
                        "snippet",
                        300,
                        self.kind.title(),
                    )
                })
                .collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SearchSource for FailingSource {
        fn source(&self) -> Source {
            Source::Wikipedia
        }

        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>> {
            Err(CodegenieError::UpstreamStatus {
                source_name: "Wikipedia".to_string(),
                status: 503,
            })
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SearchSource for SlowSource {
        fn source(&self) -> Source {
            Source::Arxiv
        }

        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn fake(kind: Source, hits: usize) -> (Arc<dyn SearchSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(FakeSource {
            kind,
            hits,
            calls: Arc::clone(&calls),
        });
        (source, calls)
    }

    fn engine(sources: Vec<Arc<dyn SearchSource>>, db: Arc<Database>) -> ResearchEngine {
        ResearchEngine::with_sources(sources, db, &ResearchConfig::default())
            .with_source_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key("rust", 5);
        assert!(key.starts_with("search_"));
        assert!(key.ends_with("_5"));
        // "search_" + 64 hex chars + "_5"
        assert_eq!(key.len(), 7 + 64 + 2);
        assert_ne!(cache_key("rust", 5), cache_key("rust", 8));
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_yield_empty_lists() {
        let db = Arc::new(Database::in_memory());
        let (web, _) = fake(Source::Web, 2);
        let engine = engine(vec![Arc::new(SlowSource), web, Arc::new(FailingSource)], db);

        let results = engine.search("rust", 5).await;
        // sorted into source order regardless of registration order
        let order: Vec<Source> = results.sources.iter().map(|s| s.source).collect();
        assert_eq!(order, vec![Source::Web, Source::Wikipedia, Source::Arxiv]);
        assert_eq!(results.get(Source::Web).unwrap().len(), 2);
        assert!(results.get(Source::Wikipedia).unwrap().is_empty());
        assert!(results.get(Source::Arxiv).unwrap().is_empty());
        assert_eq!(results.non_empty_sources(), 1);
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let db = Arc::new(Database::in_memory());
        let (web, calls) = fake(Source::Web, 3);
        let engine = engine(vec![web], Arc::clone(&db));

        let first = engine.search("rust", 5).await;
        let second = engine.search("rust", 5).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(db.get_cached(&cache_key("rust", 5)).unwrap().is_some());

        // different limit, different key
        engine.search("rust", 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let db = Arc::new(Database::in_memory());
        let (web, calls) = fake(Source::Web, 0);
        let engine = engine(vec![web], Arc::clone(&db));

        let results = engine.search("nothing", 5).await;
        assert!(!results.has_any());
        engine.search("nothing", 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(db.cache_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_is_ignored() {
        let db = Arc::new(Database::in_memory());
        db.set_cached(&cache_key("rust", 5), "not json", 60).unwrap();
        let (web, calls) = fake(Source::Web, 1);
        let engine = engine(vec![web], db);

        let results = engine.search("rust", 5).await;
        assert_eq!(results.total_results(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_builds_configured_sources() {
        let config = ResearchConfig {
            sources: vec![Source::Arxiv, Source::SemanticScholar],
            ..Default::default()
        };
        let engine = ResearchEngine::from_config(&config, Arc::new(Database::in_memory())).unwrap();
        assert_eq!(engine.sources(), vec![Source::Arxiv, Source::SemanticScholar]);
    }
}

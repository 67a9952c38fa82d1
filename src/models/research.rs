//! Research result types.
//!
//! K_i: Every source produces the same result shape; only the label differs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A research source.
///
/// Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// DuckDuckGo instant answers
    Web,
    /// Wikipedia page summaries
    Wikipedia,
    /// arXiv Atom feed
    Arxiv,
    /// Semantic Scholar paper search
    SemanticScholar,
}

impl Source {
    /// Machine name, as used in config and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Wikipedia => "wikipedia",
            Self::Arxiv => "arxiv",
            Self::SemanticScholar => "semantic_scholar",
        }
    }

    /// Heading used in rendered markdown.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Web => "Web",
            Self::Wikipedia => "Wikipedia",
            Self::Arxiv => "Arxiv",
            Self::SemanticScholar => "Semantic Scholar",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" | "duckduckgo" => Ok(Self::Web),
            "wikipedia" => Ok(Self::Wikipedia),
            "arxiv" => Ok(Self::Arxiv),
            "semantic_scholar" | "semanticscholar" => Ok(Self::SemanticScholar),
            other => Err(format!("unknown research source: {other}")),
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Human-readable provider label ("DuckDuckGo", "Wikipedia", ...)
    pub source: String,
}

impl SearchResult {
    pub fn new(
        title: impl AsRef<str>,
        url: impl Into<String>,
        snippet: impl AsRef<str>,
        snippet_limit: usize,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: truncate_chars(title.as_ref(), 150),
            url: url.into(),
            snippet: truncate_chars(snippet.as_ref(), snippet_limit),
            source: source.into(),
        }
    }
}

/// Results of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResults {
    pub source: Source,
    pub results: Vec<SearchResult>,
}

/// Results of a multi-source search, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchResults {
    pub sources: Vec<SourceResults>,
}

impl ResearchResults {
    pub fn push(&mut self, source: Source, results: Vec<SearchResult>) {
        self.sources.push(SourceResults { source, results });
        self.sources.sort_by_key(|s| s.source);
    }

    /// True when at least one source returned something.
    pub fn has_any(&self) -> bool {
        self.sources.iter().any(|s| !s.results.is_empty())
    }

    /// Number of sources that returned at least one result.
    pub fn non_empty_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.results.is_empty()).count()
    }

    pub fn get(&self, source: Source) -> Option<&[SearchResult]> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.results.as_slice())
    }

    pub fn total_results(&self) -> usize {
        self.sources.iter().map(|s| s.results.len()).sum()
    }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

//! DuckDuckGo instant answer source.
//!
//! Epistemic foundation:
//! - K_i: The instant answer API returns an abstract plus nested related topics
//! - B_i: The API is frequently empty or throttled → retry, then fall back
//! - I^B: Throttling windows are unknowable → randomized backoff

use super::SearchSource;
use super::http::{HttpClient, check_status};
use crate::models::{CodegenieError, ResearchConfig, Result, SearchResult, Source};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const LABEL: &str = "DuckDuckGo";
const SNIPPET_LIMIT: usize = 300;

/// Words that make a query worth an educational fallback entry.
const FALLBACK_TRIGGERS: &[&str] = &["learn", "how", "what", "explain"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// A related topic is either a link or a named group of links.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
    Link {
        #[serde(rename = "Text", default)]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
}

fn flatten_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        match topic {
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
            RelatedTopic::Link { text, first_url } if !text.is_empty() => {
                out.push((text.as_str(), first_url.as_str()));
            }
            RelatedTopic::Link { .. } => {}
        }
    }
}

/// Parse an instant answer body into results, abstract first.
pub fn parse_instant_answer(body: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let answer: InstantAnswer = serde_json::from_str(body)
        .map_err(|e| CodegenieError::ParseError(format!("DuckDuckGo response: {e}")))?;
    let mut results = Vec::new();

    if !answer.abstract_text.is_empty() {
        results.push(SearchResult::new(
            &answer.heading,
            answer.abstract_url.clone(),
            &answer.abstract_text,
            SNIPPET_LIMIT,
            LABEL,
        ));
    }

    let mut links = Vec::new();
    flatten_topics(&answer.related_topics, &mut links);
    for (text, url) in links {
        // Topic text reads "Title - description"
        let title = text.split(" - ").next().unwrap_or(text);
        results.push(SearchResult::new(title, url, text, SNIPPET_LIMIT, LABEL));
    }

    results.truncate(max_results);
    Ok(results)
}

/// Educational placeholder used when the web search comes back empty.
pub fn fallback_results(query: &str, max_results: usize) -> Vec<SearchResult> {
    let lowered = query.to_lowercase();
    let triggered = lowered
        .split_whitespace()
        .any(|word| FALLBACK_TRIGGERS.contains(&word));

    let mut results = Vec::new();
    if triggered {
        results.push(SearchResult {
            title: format!("Understanding {query}"),
            url: "https://example.com/educational".to_string(),
            snippet: format!("Comprehensive guide to {query}"),
            source: "Educational".to_string(),
        });
    }
    results.truncate(max_results);
    results
}

/// DuckDuckGo instant answer search.
pub struct DuckDuckGoSource {
    http: HttpClient,
    url: String,
    attempts: u32,
}

impl DuckDuckGoSource {
    pub fn new(http: HttpClient, config: &ResearchConfig) -> Self {
        Self {
            http,
            url: config.duckduckgo_url.clone(),
            attempts: config.web_attempts.max(1),
        }
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let request = self.http.get(&self.url).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let response = self.http.send(request).await?;
        check_status(LABEL, &response)?;
        let body = response.text().await?;
        parse_instant_answer(&body, max_results)
    }
}

#[async_trait]
impl SearchSource for DuckDuckGoSource {
    fn source(&self) -> Source {
        Source::Web
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        for attempt in 0..self.attempts {
            match self.fetch(query, max_results).await {
                Ok(results) if !results.is_empty() => return Ok(results),
                Ok(_) => debug!(attempt = attempt + 1, "DuckDuckGo returned no results"),
                Err(e) => warn!(attempt = attempt + 1, error = %e, "DuckDuckGo attempt failed"),
            }

            if attempt + 1 < self.attempts {
                let backoff = Duration::from_millis(rand::thread_rng().gen_range(1000..3000));
                tokio::time::sleep(backoff).await;
            }
        }

        Ok(fallback_results(query, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_abstract_then_flattened_topics() {
        let body = r#"{
            "Heading": "Rust (programming language)",
            "AbstractText": "Rust is a general-purpose programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "RelatedTopics": [
                {"Text": "Cargo - The Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "See also", "Topics": [
                    {"Text": "Ferris - Unofficial mascot", "FirstURL": "https://duckduckgo.com/Ferris"}
                ]}
            ]
        }"#;

        let results = parse_instant_answer(body, 5).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[0].source, "DuckDuckGo");
        assert_eq!(results[1].title, "Cargo");
        assert_eq!(results[1].snippet, "Cargo - The Rust package manager");
        assert_eq!(results[2].title, "Ferris");
        assert_eq!(results[2].url, "https://duckduckgo.com/Ferris");
    }

    #[test]
    fn test_parse_respects_max_and_empty_body() {
        let body = r#"{"RelatedTopics": [
            {"Text": "a", "FirstURL": "u1"},
            {"Text": "b", "FirstURL": "u2"},
            {"Text": "", "FirstURL": "u3"}
        ]}"#;
        let results = parse_instant_answer(body, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(parse_instant_answer("{}", 5).unwrap().is_empty());
        assert!(parse_instant_answer("not json", 5).is_err());
    }

    #[test]
    fn test_fallback_only_for_learning_queries() {
        let results = fallback_results("how do magnets work", 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Understanding how do magnets work");
        assert_eq!(results[0].source, "Educational");

        assert!(fallback_results("magnet prices", 5).is_empty());
        // word match, not substring
        assert!(fallback_results("somehow", 5).is_empty());
        assert!(fallback_results("explain magnets", 0).is_empty());
    }

    fn unreachable_source() -> DuckDuckGoSource {
        let config = ResearchConfig {
            duckduckgo_url: "http://127.0.0.1:1/".to_string(),
            web_attempts: 1,
            request_timeout_secs: 2,
            ..Default::default()
        };
        let http = HttpClient::new(&config).unwrap();
        DuckDuckGoSource::new(http, &config)
    }

    #[tokio::test]
    async fn test_search_falls_back_when_unreachable() {
        let source = unreachable_source();

        let results = source.search("how does tcp work", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "Educational");
        assert_eq!(results[0].title, "Understanding how does tcp work");
        assert_eq!(results[0].url, "https://example.com/educational");
    }

    #[tokio::test]
    async fn test_search_without_fallback_is_empty() {
        let source = unreachable_source();
        // network failures are absorbed, never surfaced as an error
        let results = source.search("tcp window scaling", 5).await.unwrap();
        assert!(results.is_empty());
    }
}

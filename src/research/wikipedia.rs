//! Wikipedia page summary source.

use super::SearchSource;
use super::http::{HttpClient, check_status};
use crate::models::{CodegenieError, ResearchConfig, Result, SearchResult, Source};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

const LABEL: &str = "Wikipedia";
const SNIPPET_LIMIT: usize = 400;

#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentUrls {
    #[serde(default)]
    desktop: Option<PageUrl>,
}

#[derive(Debug, Default, Deserialize)]
struct PageUrl {
    #[serde(default)]
    page: String,
}

/// Parse a REST summary body into a single result.
pub fn parse_summary(body: &str) -> Result<SearchResult> {
    let summary: Summary = serde_json::from_str(body)
        .map_err(|e| CodegenieError::ParseError(format!("Wikipedia summary: {e}")))?;
    let url = summary
        .content_urls
        .and_then(|u| u.desktop)
        .map(|d| d.page)
        .unwrap_or_default();
    Ok(SearchResult::new(
        &summary.title,
        url,
        &summary.extract,
        SNIPPET_LIMIT,
        LABEL,
    ))
}

/// Build the summary URL for a query; the title is percent-encoded.
pub fn summary_url(base: &str, query: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| CodegenieError::InvalidInput(format!("wikipedia url '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| {
            CodegenieError::InvalidInput(format!("wikipedia url '{base}' cannot be a base"))
        })?
        .pop_if_empty()
        .push(&query.trim().replace(' ', "_"));
    Ok(url)
}

/// Wikipedia REST summary lookup; yields zero or one result.
pub struct WikipediaSource {
    http: HttpClient,
    base_url: String,
}

impl WikipediaSource {
    pub fn new(http: HttpClient, config: &ResearchConfig) -> Self {
        Self {
            http,
            base_url: config.wikipedia_url.clone(),
        }
    }
}

#[async_trait]
impl SearchSource for WikipediaSource {
    fn source(&self) -> Source {
        Source::Wikipedia
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let url = summary_url(&self.base_url, query)?;
        let response = self.http.send(self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        check_status(LABEL, &response)?;

        let body = response.text().await?;
        Ok(vec![parse_summary(&body)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary() {
        let body = r#"{
            "title": "Alan Turing",
            "extract": "Alan Mathison Turing was an English mathematician.",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Alan_Turing"}}
        }"#;
        let result = parse_summary(body).unwrap();
        assert_eq!(result.title, "Alan Turing");
        assert_eq!(result.url, "https://en.wikipedia.org/wiki/Alan_Turing");
        assert_eq!(result.source, "Wikipedia");
    }

    #[test]
    fn test_parse_summary_truncates_extract_and_tolerates_missing_urls() {
        let body = format!(r#"{{"title": "Long", "extract": "{}"}}"#, "x".repeat(500));
        let result = parse_summary(&body).unwrap();
        assert_eq!(result.snippet.len(), 400);
        assert_eq!(result.url, "");
    }

    #[test]
    fn test_summary_url_replaces_spaces() {
        let url = summary_url(
            "https://en.wikipedia.org/api/rest_v1/page/summary",
            "alan turing",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/alan_turing"
        );

        let url = summary_url("https://en.wikipedia.org/api/rest_v1/page/summary/", "a?b").unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/a%3Fb"
        );
    }
}

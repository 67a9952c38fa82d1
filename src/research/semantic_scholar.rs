//! Semantic Scholar paper search source.

use super::SearchSource;
use super::http::{HttpClient, check_status};
use crate::models::{CodegenieError, ResearchConfig, Result, SearchResult, Source};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

const LABEL: &str = "Semantic Scholar";
const SNIPPET_LIMIT: usize = 300;
const PAPER_URL: &str = "https://www.semanticscholar.org/paper";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
}

/// Parse a graph API search body; papers without a title are skipped.
pub fn parse_papers(body: &str) -> Result<Vec<SearchResult>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| CodegenieError::ParseError(format!("Semantic Scholar response: {e}")))?;
    // serde reads a bare array as the struct's fields in order
    if !value.is_object() {
        return Err(CodegenieError::ParseError(
            "Semantic Scholar response: expected a JSON object".to_string(),
        ));
    }
    let response: SearchResponse = serde_json::from_value(value)
        .map_err(|e| CodegenieError::ParseError(format!("Semantic Scholar response: {e}")))?;

    Ok(response
        .data
        .into_iter()
        .filter_map(|paper| {
            let title = paper.title.filter(|t| !t.is_empty())?;
            Some(SearchResult::new(
                title,
                format!("{PAPER_URL}/{}", paper.paper_id),
                paper.abstract_text.unwrap_or_default(),
                SNIPPET_LIMIT,
                LABEL,
            ))
        })
        .collect())
}

/// Semantic Scholar graph API search; the API key is optional.
pub struct SemanticScholarSource {
    http: HttpClient,
    url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(http: HttpClient, config: &ResearchConfig) -> Self {
        Self {
            http,
            url: config.semantic_scholar_url.clone(),
            api_key: config.resolve_semantic_scholar_key(),
        }
    }
}

#[async_trait]
impl SearchSource for SemanticScholarSource {
    fn source(&self) -> Source {
        Source::SemanticScholar
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let mut request = self.http.get(&self.url).query(&[
            ("query", query.to_string()),
            ("limit", max_results.to_string()),
            ("fields", "title,abstract,url".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = self.http.send(request).await?;
        check_status(LABEL, &response)?;

        let body = response.text().await?;
        let mut results = parse_papers(&body)?;
        results.truncate(max_results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_papers() {
        let body = r#"{
            "total": 3,
            "data": [
                {"paperId": "abc123", "title": "Survey Propagation", "abstract": "A message passing algorithm."},
                {"paperId": "def456", "title": "No Abstract", "abstract": null},
                {"paperId": "ghi789", "title": null}
            ]
        }"#;
        let results = parse_papers(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.semanticscholar.org/paper/abc123");
        assert_eq!(results[0].snippet, "A message passing algorithm.");
        assert_eq!(results[0].source, "Semantic Scholar");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_papers_missing_data() {
        assert!(parse_papers(r#"{"total": 0}"#).unwrap().is_empty());
        assert!(parse_papers("[]").is_err());
        assert!(parse_papers(r#"[[{"paperId": "x", "title": "t"}]]"#).is_err());
        assert!(parse_papers("not json").is_err());
    }
}

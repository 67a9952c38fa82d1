//! arXiv Atom feed source.
//!
//! Epistemic foundation:
//! - K_i: Results arrive as Atom `<entry>` elements with `<title>`, `<summary>`, `<id>`
//! - K_i: An entry without both a title and a summary is skipped
//! - B_i: The feed may be malformed → ParseError

use super::SearchSource;
use super::http::{HttpClient, check_status};
use crate::models::{CodegenieError, ResearchConfig, Result, SearchResult, Source};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;

const LABEL: &str = "arXiv";
const SNIPPET_LIMIT: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
    Id,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"summary" => Some(Self::Summary),
            b"id" => Some(Self::Id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    title: Option<String>,
    summary: Option<String>,
    id: Option<String>,
}

impl Entry {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Title => self.title = Some(value),
            Field::Summary => self.summary = Some(value),
            Field::Id => self.id = Some(value),
        }
    }

    fn into_result(self) -> Option<SearchResult> {
        let (title, summary) = (self.title?, self.summary?);
        Some(SearchResult::new(
            title,
            self.id.unwrap_or_default(),
            summary,
            SNIPPET_LIMIT,
            LABEL,
        ))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn xml_error(e: impl std::fmt::Display) -> CodegenieError {
    CodegenieError::ParseError(format!("arXiv feed: {e}"))
}

/// Parse an Atom feed into results, in feed order.
pub fn parse_atom(xml: &str) -> Result<Vec<SearchResult>> {
    let mut reader = Reader::from_str(xml);

    let mut results = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => entry = Some(Entry::default()),
                name if entry.is_some() => {
                    field = Field::from_tag(name);
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => {
                if let (Some(current), Some(f)) =
                    (entry.as_mut(), Field::from_tag(e.local_name().as_ref()))
                {
                    current.set(f, String::new());
                }
            }
            Event::Text(t) if field.is_some() => {
                text.push_str(&t.decode().map_err(xml_error)?);
            }
            Event::CData(c) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::GeneralRef(r) if field.is_some() => {
                if let Some(ch) = r.resolve_char_ref().map_err(xml_error)? {
                    text.push(ch);
                } else {
                    let name = r.decode().map_err(xml_error)?;
                    match resolve_predefined_entity(&name) {
                        Some(value) => text.push_str(value),
                        None => return Err(xml_error(format!("unknown entity &{name};"))),
                    }
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    if let Some(result) = entry.take().and_then(Entry::into_result) {
                        results.push(result);
                    }
                    field = None;
                } else if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    if Field::from_tag(name.as_ref()) == Some(f) {
                        current.set(f, collapse_whitespace(&text));
                        field = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

/// arXiv API query.
pub struct ArxivSource {
    http: HttpClient,
    url: String,
}

impl ArxivSource {
    pub fn new(http: HttpClient, config: &ResearchConfig) -> Self {
        Self {
            http,
            url: config.arxiv_url.clone(),
        }
    }
}

#[async_trait]
impl SearchSource for ArxivSource {
    fn source(&self) -> Source {
        Source::Arxiv
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let request = self.http.get(&self.url).query(&[
            ("search_query", format!("all:{query}")),
            ("start", "0".to_string()),
            ("max_results", max_results.to_string()),
        ]);
        let response = self.http.send(request).await?;
        check_status(LABEL, &response)?;

        let body = response.text().await?;
        let mut results = parse_atom(&body)?;
        results.truncate(max_results);
        Ok(results)
    }
}

//! Shared HTTP client for research sources.

use crate::models::{CodegenieError, ResearchConfig, Result};
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// reqwest client plus the user agents rotated across requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CodegenieError::Network)?;

        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
            timeout,
        })
    }

    /// GET request with a randomly chosen user agent.
    pub fn get(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        let request = self.client.get(url);
        match self.user_agents.choose(&mut rand::thread_rng()) {
            Some(agent) => request.header(USER_AGENT, agent.as_str()),
            None => request,
        }
    }

    /// Send a request, mapping transport failures to codegenie errors.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                CodegenieError::Timeout(self.timeout)
            } else {
                CodegenieError::Network(e)
            }
        })
    }
}

/// Reject non-success statuses.
pub(crate) fn check_status(source: &str, response: &Response) -> Result<()> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(());
    }
    Err(CodegenieError::UpstreamStatus {
        source_name: source.to_string(),
        status: status.as_u16(),
    })
}

//! Shared application state.
//!
//! Epistemic foundation:
//! - K_i: tide handlers run on async-std; reqwest, process and timers need tokio
//! - K_i: Everything shared between handlers is behind `Arc`
//! - B_i: Storage may fail to open → startup error, not a handler error

use crate::agent::Assistant;
use crate::experiments::ExperimentRunner;
use crate::models::{CodegenieError, Config, Result};
use crate::research::ResearchEngine;
use crate::security::{CodeSandbox, RateLimiter};
use crate::store::Database;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// State handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub research: Arc<ResearchEngine>,
    pub sandbox: Arc<CodeSandbox>,
    pub experiments: Arc<ExperimentRunner>,
    runtime: Handle,
}

impl AppState {
    pub fn new(
        assistant: Arc<Assistant>,
        research: Arc<ResearchEngine>,
        sandbox: Arc<CodeSandbox>,
        experiments: Arc<ExperimentRunner>,
        runtime: Handle,
    ) -> Self {
        Self {
            assistant,
            research,
            sandbox,
            experiments,
            runtime,
        }
    }

    /// Wire every service from config.
    pub fn from_config(config: &Config, runtime: Handle) -> Result<Self> {
        let db = if config.storage.persist {
            Database::open(&config.storage.path)?
        } else {
            Database::in_memory()
        };
        let db = Arc::new(db);
        match db.purge_expired() {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Dropped expired cache entries"),
            Err(e) => warn!(error = %e, "Cache purge failed"),
        }

        let rate_limiter = Arc::new(RateLimiter::new());
        let sandbox = Arc::new(CodeSandbox::new(&config.security, Arc::clone(&rate_limiter))?);
        let research = Arc::new(ResearchEngine::from_config(&config.research, Arc::clone(&db))?);
        let assistant = Arc::new(Assistant::new(
            &config.security,
            db,
            rate_limiter,
            Arc::clone(&sandbox),
            Arc::clone(&research),
        )?
        .with_idle_timeout(config.server.session_idle_minutes));
        let experiments = Arc::new(ExperimentRunner::new(config.experiments.clone()));

        Ok(Self::new(assistant, research, sandbox, experiments, runtime))
    }

    /// Run a future on the tokio runtime and wait for it.
    pub async fn on_runtime<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn(future)
            .await
            .map_err(|e| CodegenieError::Internal(format!("runtime task failed: {e}")))
    }

    /// Run CPU-bound work on the blocking pool and wait for it.
    pub async fn on_blocking<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn_blocking(work)
            .await
            .map_err(|e| CodegenieError::Internal(format!("blocking task failed: {e}")))
    }
}

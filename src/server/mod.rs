//! Server module - JSON HTTP API over tide.
//!
//! Provides:
//! - `AppState`: Services shared by every route, plus the tokio handle
//! - `app`: The tide server with all routes mounted
//! - `serve`: Bind and listen

mod routes;
mod state;

pub use routes::app;
pub use state::AppState;

use crate::models::{CodegenieError, Result};
use tracing::info;

/// Listen on `addr` until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = app(state);
    info!(addr, "CodeGenie Pro listening");
    app.listen(addr.to_string())
        .await
        .map_err(|e| CodegenieError::io(format!("serving on {addr}"), e))
}

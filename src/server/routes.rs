//! HTTP routes.
//!
//! Epistemic foundation:
//! - K_i: Every body in and out is JSON
//! - K_i: Errors map to a status by cause and carry `{"error": ...}`
//! - B_i: Bodies may be missing or malformed → 400 before any service runs

use super::AppState;
use crate::analytics::{Dataset, comprehensive_analysis, insights};
use crate::models::{CodegenieError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tide::{Body, Request, Response, StatusCode};
use tracing::{debug, error};

/// Default and bounds for `/api/research` `max_results`.
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_LIMIT: usize = 10;

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
struct CreateSession {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoalRequest {
    goal: String,
    #[serde(default)]
    research_mode: bool,
}

#[derive(Debug, Deserialize)]
struct ResearchRequest {
    query: String,
    max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    code: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsRequest {
    csv: Option<String>,
    records: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SatRequest {
    n_vars: usize,
    clause_count: usize,
    #[serde(default = "default_solver")]
    solver: String,
}

fn default_solver() -> String {
    "dpll".to_string()
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    status: &'static str,
    message: String,
    output: Option<String>,
}

/// Build the tide app with every route mounted.
pub fn app(state: AppState) -> tide::Server<AppState> {
    let mut app = tide::with_state(state);

    app.at("/health").get(|_req: Request<AppState>| async move {
        json_response(
            StatusCode::Ok,
            &json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
        )
    });

    app.at("/api/sessions")
        .post(|req: Request<AppState>| async move { reply(create_session(req).await) });
    app.at("/api/sessions/:id")
        .get(|req: Request<AppState>| async move { reply(get_session(req)) })
        .delete(|req: Request<AppState>| async move { reply(end_session(req).await) });
    app.at("/api/sessions/:id/goals")
        .post(|req: Request<AppState>| async move { reply(execute_goal(req).await) });
    app.at("/api/research")
        .post(|req: Request<AppState>| async move { reply(research(req).await) });
    app.at("/api/execute")
        .post(|req: Request<AppState>| async move { reply(execute_code(req).await) });
    app.at("/api/analytics")
        .post(|req: Request<AppState>| async move { reply(analyze(req).await) });
    app.at("/api/experiments")
        .get(|req: Request<AppState>| async move { reply(list_experiments(req).await) });
    app.at("/api/experiments/sat")
        .post(|req: Request<AppState>| async move { reply(run_sat(req).await) });

    app
}

// ═══════════════════════════════════════════════════════════════════════════
// Plumbing
// ═══════════════════════════════════════════════════════════════════════════

/// Parse the body as JSON. An empty body reads as `{}`.
async fn read_json<T: DeserializeOwned>(req: &mut Request<AppState>) -> Result<T> {
    let body = req
        .body_string()
        .await
        .map_err(|e| CodegenieError::InvalidInput(format!("unreadable body: {e}")))?;
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body)
        .map_err(|e| CodegenieError::InvalidInput(format!("invalid JSON body: {e}")))
}

fn param(req: &Request<AppState>, name: &str) -> Result<String> {
    req.param(name)
        .map(str::to_string)
        .map_err(|_| CodegenieError::InvalidInput(format!("missing path parameter '{name}'")))
}

fn status_for(err: &CodegenieError) -> StatusCode {
    match err {
        CodegenieError::InvalidInput(_) | CodegenieError::ParseError(_) => StatusCode::BadRequest,
        CodegenieError::NotFound(_) => StatusCode::NotFound,
        CodegenieError::RateLimited { .. } => StatusCode::TooManyRequests,
        CodegenieError::Security(_) => StatusCode::Forbidden,
        _ => StatusCode::InternalServerError,
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> tide::Result {
    Ok(Response::builder(status)
        .body(Body::from_json(value)?)
        .build())
}

fn reply<T: Serialize>(result: Result<T>) -> tide::Result {
    let err = match result {
        Ok(value) => return json_response(StatusCode::Ok, &value),
        Err(err) => err,
    };

    let status = status_for(&err);
    if status == StatusCode::InternalServerError {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, status = u16::from(status), "Request rejected");
    }

    let mut res = json_response(status, &json!({ "error": err.to_string() }))?;
    if let Some(secs) = err.retry_after() {
        res.insert_header("Retry-After", (secs.ceil() as u64).to_string());
    }
    Ok(res)
}

// ═══════════════════════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════════════════════

async fn create_session(mut req: Request<AppState>) -> Result<Value> {
    let body: CreateSession = read_json(&mut req).await?;
    let user_id = body.user_id.unwrap_or_default();
    let state = req.state();
    let assistant = state.assistant.clone();
    let info = state
        .on_blocking(move || assistant.start_session(&user_id))
        .await??;
    Ok(json!(info))
}

fn get_session(req: Request<AppState>) -> Result<Value> {
    let id = param(&req, "id")?;
    let assistant = &req.state().assistant;
    Ok(json!({
        "session": assistant.session_info(&id)?,
        "history": assistant.history(&id)?,
        "context": assistant.context(&id)?,
    }))
}

/// Clear a session's history and context, then forget the session.
async fn end_session(req: Request<AppState>) -> Result<Value> {
    let id = param(&req, "id")?;
    let state = req.state();
    let assistant = state.assistant.clone();
    let session_id = id.clone();
    state
        .on_blocking(move || {
            assistant.clear_session(&session_id)?;
            assistant.end_session(&session_id)
        })
        .await??;
    Ok(json!({ "session_id": id, "cleared": true }))
}

async fn execute_goal(mut req: Request<AppState>) -> Result<Value> {
    let id = param(&req, "id")?;
    let body: GoalRequest = read_json(&mut req).await?;
    let goal = if body.research_mode {
        format!("Research: {}", body.goal)
    } else {
        body.goal
    };

    let state = req.state().clone();
    let assistant = state.assistant.clone();
    let response = state
        .on_runtime(async move { assistant.execute_goal(&id, &goal).await })
        .await??;
    Ok(json!(response))
}

async fn research(mut req: Request<AppState>) -> Result<Value> {
    let body: ResearchRequest = read_json(&mut req).await?;
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err(CodegenieError::InvalidInput("query must not be empty".to_string()));
    }
    let max_results = body
        .max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_LIMIT);

    let state = req.state().clone();
    let engine = state.research.clone();
    let search_query = query.clone();
    let results = state
        .on_runtime(async move { engine.search(&search_query, max_results).await })
        .await?;
    Ok(json!({
        "query": query,
        "max_results": max_results,
        "results": results,
    }))
}

async fn execute_code(mut req: Request<AppState>) -> Result<ExecuteResponse> {
    let body: ExecuteRequest = read_json(&mut req).await?;
    let user_id = body
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    let state = req.state().clone();
    let sandbox = state.sandbox.clone();
    let outcome = state
        .on_runtime(async move { sandbox.execute(&body.code, &user_id).await })
        .await?;

    let output = match &outcome {
        crate::security::ExecutionOutcome::Completed { output, .. } => Some(output.clone()),
        _ => None,
    };
    Ok(ExecuteResponse {
        status: outcome.status(),
        message: outcome.to_string(),
        output,
    })
}

async fn analyze(mut req: Request<AppState>) -> Result<Value> {
    let body: AnalyticsRequest = read_json(&mut req).await?;
    let state = req.state().clone();

    state
        .on_blocking(move || {
            let data = match (body.csv, body.records) {
                (Some(csv), _) => Dataset::from_csv(csv.as_bytes())?,
                (None, Some(records)) => Dataset::from_json_records(&records)?,
                (None, None) => {
                    return Err(CodegenieError::InvalidInput(
                        "provide either 'csv' or 'records'".to_string(),
                    ));
                }
            };
            Ok(json!({
                "analysis": comprehensive_analysis(&data),
                "insights": insights(&data),
                "rows": data.n_rows(),
                "columns": data.n_columns(),
            }))
        })
        .await?
}

async fn run_sat(mut req: Request<AppState>) -> Result<Value> {
    let body: SatRequest = read_json(&mut req).await?;
    let state = req.state().clone();
    let runner = state.experiments.clone();

    let record = state
        .on_blocking(move || runner.run_random_3sat(body.n_vars, body.clause_count, &body.solver))
        .await??;
    Ok(json!(record))
}

async fn list_experiments(req: Request<AppState>) -> Result<Value> {
    let state = req.state().clone();
    let runner = state.experiments.clone();
    let records = state.on_blocking(move || runner.history()).await??;
    Ok(json!({ "count": records.len(), "experiments": records }))
}

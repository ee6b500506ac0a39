use crate::db;
use crate::errors::EngineError;
use crate::models::{BlackScholesCall, ContractParams};
use crate::runner::{self, CancelFlag, CancelOnDrop, RunOutcome, SimulationRequest};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

#[derive(serde::Deserialize)]
pub struct RunsQuery {
    pub limit: Option<usize>,
}

#[derive(serde::Deserialize)]
pub struct ReferenceRequest {
    pub s0: f64,
    pub k: f64,
    pub t: f64,
    pub r: f64,
    pub sigma: f64,
}

fn error_response(e: &EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = if e.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

/// POST /api/simulate -- run a full trajectory; stages stream over /ws.
/// Dropping the request (client disconnect) abandons the run.
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SimulationRequest>,
) -> ApiResult {
    let spec = req.resolve(&state.config).map_err(|e| error_response(&e))?;

    let cancel = CancelFlag::new();
    let _cancel_guard = CancelOnDrop::new(cancel.clone());
    let run_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || runner::execute_run(&run_state, &spec, &cancel))
        .await
        .map_err(|e| error_response(&EngineError::ChannelClosed(format!("run task: {e}"))))?
        .map_err(|e| error_response(&e))?;

    match outcome {
        RunOutcome::Completed(summary) => Ok(Json(serde_json::json!(summary))),
        RunOutcome::Abandoned { run_id, stages_completed } => Ok(Json(serde_json::json!({
            "run_id": run_id,
            "abandoned": true,
            "stages_completed": stages_completed,
        }))),
    }
}

/// POST /api/reference -- closed-form price only
pub async fn reference(Json(req): Json<ReferenceRequest>) -> ApiResult {
    let params = ContractParams {
        s0: req.s0,
        k: req.k,
        t: req.t,
        r: req.r,
        sigma: req.sigma,
        samples: 1,
    };
    let price = BlackScholesCall::new()
        .price(&params)
        .map_err(|e| error_response(&e))?;
    Ok(Json(serde_json::json!({ "reference_price": price })))
}

/// GET /api/runs -- recent persisted runs (cold path)
pub async fn get_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunsQuery>,
) -> ApiResult {
    let limit = params.limit.unwrap_or(5).min(200);
    let runs = db::recent_runs(&state.db, limit).map_err(|e| error_response(&e))?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

/// GET /api/state -- last completed run (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let last = state.last_run_rx.borrow().clone();
    Json(serde_json::json!({ "last_run": last }))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "runs_started": state.counters.runs_started.load(Relaxed),
        "runs_completed": state.counters.runs_completed.load(Relaxed),
        "runs_failed": state.counters.runs_failed.load(Relaxed),
        "runs_abandoned": state.counters.runs_abandoned.load(Relaxed),
        "stages_emitted": state.counters.stages_emitted.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}

//! HTTP route handlers for the verifier API.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use verifier::core::hardener::{HardenAction, HardenOptions};
use verifier::core::types::{Diagnostic, partition};
use verifier::core::validator::validate_with;
use verifier::io::agent::AgentCommandExecutor;
use verifier::io::command::ShellCommandExecutor;
use verifier::io::run_log::{RunSummary, list_runs, load_report, new_run_id, write_run};
use verifier::io::ui_bridge::HttpUiBridgeDriver;
use verifier::io::workflow_store::workflow_from_value;
use verifier::prepare::{StructuralError, harden_workflow, prepare};
use verifier::scheduler::{CancelFlag, Executors, RunOptions, RunReport, run_workflow};
use verifier::workflow::Workflow;

use crate::state::AppState;

/// JSON error body. `diagnostics` carries the fatal findings of an
/// unexecutable workflow.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            diagnostics: Vec::new(),
        }),
    )
}

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/workflows/validate", post(validate_workflow))
        .route("/workflows/harden", post(harden))
        .route("/workflows/run", post(run))
        .route("/workflows/start", post(start))
        .route("/runs", get(runs))
        .route("/runs/active", get(active_runs))
        .route("/runs/{run_id}", get(get_run))
        .route("/runs/{run_id}/stop", post(stop_run))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct DiagnosticsResponse {
    fatal: Vec<Diagnostic>,
    advisory: Vec<Diagnostic>,
}

fn parse(body: Value) -> Result<Workflow, ApiError> {
    workflow_from_value(body).map_err(|err| error(StatusCode::BAD_REQUEST, format!("{err:#}")))
}

/// POST /api/workflows/validate - diagnostics split by severity.
async fn validate_workflow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<DiagnosticsResponse>, ApiError> {
    let workflow = parse(body)?;
    let markers = &state.config.hardener.stateful_endpoint_markers;
    let (fatal, advisory) = partition(validate_with(&workflow, markers));
    Ok(Json(DiagnosticsResponse { fatal, advisory }))
}

#[derive(Debug, Serialize)]
struct HardenResponse {
    workflow: Workflow,
    actions: Vec<HardenAction>,
    /// Diagnostics of the hardened workflow.
    remaining: Vec<Diagnostic>,
}

/// POST /api/workflows/harden - hardened workflow plus what changed.
async fn harden(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<HardenResponse>, ApiError> {
    let workflow = parse(body)?;
    let options = HardenOptions::new(state.config.hardener.clone());
    let (workflow, report, remaining) = harden_workflow(&workflow, &options);
    Ok(Json(HardenResponse {
        workflow,
        actions: report.actions,
        remaining,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    /// Execute the workflow as submitted.
    #[serde(default)]
    no_harden: bool,
}

/// POST /api/workflows/run - prepare and execute on a blocking worker,
/// answering with the finished report.
///
/// Unexecutable workflows answer 422 with the fatal diagnostics.
async fn run(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
    Json(body): Json<Value>,
) -> Result<Json<RunReport>, ApiError> {
    let workflow = prepare_run(&state, parse(body)?, !params.no_harden)?;
    let run_id = new_run_id(&workflow);
    let cancel = state.active_runs.start(&run_id);
    tokio::task::spawn_blocking(move || execute(&state, &workflow, run_id, &cancel))
        .await
        .map(Json)
        .map_err(|err| error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

#[derive(Debug, Serialize)]
struct RunStarted {
    run_id: String,
}

/// POST /api/workflows/start - like `run`, but answers 202 with the run id
/// as soon as the run is registered. The report is served from the run
/// records once the run ends.
async fn start(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<RunStarted>), ApiError> {
    let workflow = prepare_run(&state, parse(body)?, !params.no_harden)?;
    let run_id = new_run_id(&workflow);
    let cancel = state.active_runs.start(&run_id);
    let id = run_id.clone();
    tokio::task::spawn_blocking(move || execute(&state, &workflow, id, &cancel));
    info!(run_id = %run_id, "run started");
    Ok((StatusCode::ACCEPTED, Json(RunStarted { run_id })))
}

/// Harden (optionally) and refuse unexecutable workflows.
fn prepare_run(state: &AppState, workflow: Workflow, harden: bool) -> Result<Workflow, ApiError> {
    let options = HardenOptions::new(state.config.hardener.clone());
    let prepared = prepare(&workflow, harden, &options).map_err(|err| {
        match err.downcast_ref::<StructuralError>() {
            Some(structural) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: structural.to_string(),
                    diagnostics: structural.diagnostics.clone(),
                }),
            ),
            None => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")),
        }
    })?;
    Ok(prepared.workflow)
}

/// Run a registered workflow, then unregister it and store the record.
fn execute(
    state: &AppState,
    workflow: &Workflow,
    run_id: String,
    cancel: &CancelFlag,
) -> RunReport {
    let config = &state.config;
    let executors = Executors {
        commands: ShellCommandExecutor::new(
            &state.project_dir,
            config.interpreters.clone(),
            config.output_limit_bytes,
        ),
        ui_bridge: HttpUiBridgeDriver::new(&config.ui_bridge.base_url, config.output_limit_bytes),
        agent: AgentCommandExecutor::new(
            config.agent.command.clone(),
            &state.project_dir,
            config.output_limit_bytes,
        ),
    };
    let options = RunOptions {
        run_id: Some(run_id),
        ..RunOptions::from_config(config, &state.session)
    };
    let report = run_workflow(workflow, &executors, &options, cancel);
    state.active_runs.finish(&report.run_id);

    if let Err(err) = write_run(&state.record_dir(), &report) {
        warn!(run_id = %report.run_id, err = %format!("{err:#}"), "failed to write run record");
    }
    report
}

#[derive(Debug, Serialize)]
struct RunsResponse {
    runs: Vec<RunSummary>,
}

/// GET /api/runs - stored runs, newest first.
async fn runs(State(state): State<AppState>) -> Result<Json<RunsResponse>, ApiError> {
    let runs = list_runs(&state.record_dir())
        .map_err(|err| error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;
    Ok(Json(RunsResponse { runs }))
}

#[derive(Debug, Serialize)]
struct ActiveRunsResponse {
    run_ids: Vec<String>,
}

/// GET /api/runs/active - ids of runs still executing.
async fn active_runs(State(state): State<AppState>) -> Json<ActiveRunsResponse> {
    Json(ActiveRunsResponse {
        run_ids: state.active_runs.ids(),
    })
}

/// GET /api/runs/:run_id - one stored report.
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunReport>, ApiError> {
    match load_report(&state.record_dir(), &run_id) {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(error(StatusCode::NOT_FOUND, format!("no run {run_id}"))),
        Err(err) => Err(error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))),
    }
}

/// POST /api/runs/:run_id/stop - cancel before the run's next step.
async fn stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.active_runs.stop(&run_id) {
        info!(run_id = %run_id, "stop requested");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(error(StatusCode::NOT_FOUND, format!("no active run {run_id}")))
    }
}

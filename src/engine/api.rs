use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};

use crate::{
    config::{EngineConfig, RequestLimits},
    engine::{
        metrics::MetricsRegistry,
        models::{
            ExecutionMode, ExecutionOutcome, ExecutionRequest, RunResponse, SubmitResponse,
            Submission,
        },
        queue::Scheduler,
    },
    error::EngineError,
};

#[derive(Clone)]
pub struct AppState {
    request_limits: RequestLimits,
    scheduler: Scheduler,
    metrics: Arc<MetricsRegistry>,
}

pub fn routes(
    config: &EngineConfig,
    scheduler: Scheduler,
    metrics_registry: Arc<MetricsRegistry>,
) -> Router {
    let state = AppState {
        request_limits: config.request_limits.clone(),
        scheduler,
        metrics: metrics_registry,
    };
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/run", post(run))
        .route("/submit", post(submit))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn run(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, EngineError> {
    let submission = decode(&state, payload, ExecutionMode::Run)?;
    match state.scheduler.submit(ExecutionMode::Run, submission).await? {
        ExecutionOutcome::Output(output) => Ok(Json(RunResponse {
            success: true,
            output,
        })),
        ExecutionOutcome::Graded(_) => Err(EngineError::Internal(
            "run produced a graded result".to_string(),
        )),
    }
}

async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, EngineError> {
    let submission = decode(&state, payload, ExecutionMode::Submit)?;
    match state.scheduler.submit(ExecutionMode::Submit, submission).await? {
        ExecutionOutcome::Graded(result) => Ok(Json(SubmitResponse::from(result))),
        ExecutionOutcome::Output(_) => Err(EngineError::Internal(
            "submission was not graded".to_string(),
        )),
    }
}

fn decode(
    state: &AppState,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
    mode: ExecutionMode,
) -> Result<Submission, EngineError> {
    let Json(request) =
        payload.map_err(|rejection| EngineError::InvalidRequest(rejection.body_text()))?;
    request.validate(mode, &state.request_limits)
}

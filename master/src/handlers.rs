use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use common::{
    CallbackForm, DynamicInfo, DynamicRequest, DynamicResult, PoolInfo, RunStatus, SweepInfo,
    SweepRequest, SweepResults, CALLBACK_PATH,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::error::DispatchError;
use crate::state::{lock, AppState};

pub fn build_router<C: WorkerClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/sweeps", post(create_sweep::<C>))
        .route("/api/v1/sweeps/:id", get(get_sweep::<C>))
        .route("/api/v1/sweeps/:id/results", get(get_sweep_results::<C>))
        .route("/api/v1/dynamic", post(create_dynamic::<C>))
        .route("/api/v1/dynamic/:id", get(get_dynamic::<C>))
        .route(CALLBACK_PATH, post(dynamic_finished::<C>))
        .route("/api/v1/workers", get(list_workers::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- errores HTTP ---------------- */

pub enum ApiError {
    Dispatch(DispatchError),
    NotFound,
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        ApiError::Dispatch(e)
    }
}

/// Código HTTP con el que el master informa cada error de despacho.
pub fn status_for(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::NothingToSubmit => StatusCode::BAD_REQUEST,
        DispatchError::SubmitExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::TransportTimeout { .. }
        | DispatchError::Transport { .. }
        | DispatchError::RemoteJobFailed { .. }
        | DispatchError::RegistrationFailedAfterSubmit { .. }
        | DispatchError::VersionMismatch { .. }
        | DispatchError::UnknownStatusResponse { .. }
        | DispatchError::ResultUnavailable { .. }
        | DispatchError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
        DispatchError::KeyCollision { .. }
        | DispatchError::UnknownTotalsRow { .. }
        | DispatchError::EmptyPool(_)
        | DispatchError::RotationStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dispatch(e) => {
                let status = status_for(&e);
                warn!("request falló con {}: {}", status, e);
                (status, Json(json!({ "error": e.to_string() }))).into_response()
            }
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Despacha un barrido: un job por año, repartido entre los workers estáticos
async fn create_sweep<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Json(req): Json<SweepRequest>,
) -> Result<Json<SweepInfo>, ApiError> {
    let submission = state
        .dispatcher
        .submit_sweep(req.kind, &req.user_mods, req.first_budget_year)
        .await?;

    let info = SweepInfo {
        id: uuid::Uuid::new_v4().to_string(),
        kind: req.kind,
        status: RunStatus::Running,
        first_budget_year: req.first_budget_year,
        jobs: submission.jobs,
        max_queue_length: submission.max_queue_length,
        completed_jobs: 0,
        submitted_at: Utc::now(),
        finished_at: None,
        error: None,
    };

    info!(
        "barrido {} ({:?}) despachado: {} jobs, cola máxima {}",
        info.id,
        info.kind,
        info.jobs.len(),
        info.max_queue_length
    );

    lock(&state.sweeps).insert(info.id.clone(), info.clone());
    Ok(Json(info))
}

async fn get_sweep<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<SweepInfo>, ApiError> {
    lock(&state.sweeps)
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// 200 con el resultado consolidado, 202 si sigue corriendo, 409 si falló
async fn get_sweep_results<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<SweepResults>, StatusCode> {
    if let Some(results) = lock(&state.sweep_results).get(&id) {
        return Ok(Json(results.clone()));
    }

    match lock(&state.sweeps).get(&id).map(|s| s.status) {
        Some(RunStatus::Failed) => Err(StatusCode::CONFLICT),
        Some(_) => Err(StatusCode::ACCEPTED),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// Submit + registro contra el pool dinámico
async fn create_dynamic<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Json(req): Json<DynamicRequest>,
) -> Result<Json<DynamicInfo>, ApiError> {
    let registered = state
        .dispatcher
        .submit_ogusa_calculation(&req.ogusa_params, &req.user_mods, req.first_budget_year)
        .await?;

    let info = DynamicInfo {
        id: uuid::Uuid::new_v4().to_string(),
        status: RunStatus::Running,
        job: registered.job,
        guid: registered.guid,
        submitted_at: Utc::now(),
        finished_at: None,
        error: None,
        result: None,
    };

    info!(
        "job dinámico {} despachado a {} (run {})",
        info.job.job_id, info.job.host, info.id
    );

    lock(&state.dynamic).insert(info.id.clone(), info.clone());
    Ok(Json(info))
}

async fn get_dynamic<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<DynamicInfo>, ApiError> {
    lock(&state.dynamic)
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// Aviso del worker dinámico: el job terminó, hay que ir a buscar el resultado
async fn dynamic_finished<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
    Form(form): Form<CallbackForm>,
) -> Result<&'static str, ApiError> {
    let found = lock(&state.dynamic)
        .values()
        .find(|d| d.job.job_id == form.job_id)
        .map(|d| (d.id.clone(), d.job.clone()));

    let Some((id, job)) = found else {
        warn!("callback de un job dinámico desconocido: {}", form.job_id);
        return Err(ApiError::NotFound);
    };

    info!("callback de {} ({:?})", job.job_id, form.status);
    let outcome = state.dispatcher.dynamic_get_results(&job, form.status).await;

    let mut runs = lock(&state.dynamic);
    let Some(run) = runs.get_mut(&id) else {
        return Err(ApiError::NotFound);
    };
    run.finished_at = Some(Utc::now());

    match outcome {
        Ok(DynamicResult::JobFail(msg)) => {
            run.status = RunStatus::Failed;
            run.error = Some(msg.clone());
            run.result = Some(DynamicResult::JobFail(msg));
            Ok("ok")
        }
        Ok(result) => {
            run.status = RunStatus::Succeeded;
            run.result = Some(result);
            Ok("ok")
        }
        Err(e) => {
            run.status = RunStatus::Failed;
            run.error = Some(e.to_string());
            Err(e.into())
        }
    }
}

async fn list_workers<C: WorkerClient + 'static>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<PoolInfo>>, ApiError> {
    let d = &state.dispatcher;

    let static_pool = PoolInfo {
        name: d.static_pool().name().to_string(),
        hosts: d.static_pool().hosts().to_vec(),
        position: d.rotation().current_offset().await?,
    };
    let dynamic_pool = PoolInfo {
        name: d.dynamic_pool().name().to_string(),
        hosts: d.dynamic_pool().hosts().to_vec(),
        position: d.cursor().position().await,
    };

    Ok(Json(vec![static_pool, dynamic_pool]))
}

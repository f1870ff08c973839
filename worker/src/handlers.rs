use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use common::{
    CallbackForm, CallbackStatus, JobQuery, RegisterRequest, SubmitResponse, DISPATCH_VERSION_FIELD,
    DROPQ_START_PATH, DROPQ_TABLES, DYNAMIC_TABLE, ELASTICITY_ROW, ELASTICITY_TABLE,
    ELASTIC_START_PATH, ENGINE_VERSION_FIELD, FISCAL_TOTALS_TABLE, OGUSA_START_PATH,
    OGUSA_VERSION_FIELD, REGISTER_PATH, RESULT_PATH, STATUS_DONE, STATUS_NOT_DONE, STATUS_PATH,
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::state::{StubJob, StubKind, StubState};

/// Filas de totales fiscales que reporta cada job.
const TOTAL_ROWS: [&str; 3] = ["ind_tax", "payroll_tax", "combined_tax"];

pub fn build_router(state: StubState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(DROPQ_START_PATH, post(start_dropq))
        .route(ELASTIC_START_PATH, post(start_elastic))
        .route(OGUSA_START_PATH, post(start_ogusa))
        .route(REGISTER_PATH, post(register_job))
        .route(STATUS_PATH, get(query_result))
        .route(RESULT_PATH, get(get_result))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn start_dropq(
    State(state): State<StubState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    start_job(&state, StubKind::Dropq, &form)
}

async fn start_elastic(
    State(state): State<StubState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    start_job(&state, StubKind::Elastic, &form)
}

async fn start_ogusa(
    State(state): State<StubState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    start_job(&state, StubKind::Ogusa, &form)
}

fn start_job(
    state: &StubState,
    kind: StubKind,
    form: &HashMap<String, String>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    if state.submit_fails() {
        warn!("nodo caído: submit {:?} rechazado", kind);
        return Err(StatusCode::BAD_GATEWAY);
    }

    let year_field = match kind {
        StubKind::Ogusa => "first_year",
        StubKind::Dropq | StubKind::Elastic => "year",
    };
    let year = form
        .get(year_field)
        .and_then(|y| y.parse::<u32>().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let qlength = state.queue_length();
    let job_id = state.next_job_id(kind);
    let guid = (kind == StubKind::Ogusa).then(|| uuid::Uuid::new_v4().to_string());

    state.jobs().insert(
        job_id.clone(),
        StubJob {
            kind,
            year,
            polls: 0,
            callback: None,
        },
    );

    info!("job {} aceptado ({:?}, año {})", job_id, kind, year);
    Ok(Json(SubmitResponse {
        job_id,
        qlength,
        guid,
    }))
}

// Guarda el callback y avisa al master cuando el job "termina"
async fn register_job(
    State(state): State<StubState>,
    Form(req): Form<RegisterRequest>,
) -> Result<Json<Value>, StatusCode> {
    {
        let mut jobs = state.jobs();
        let job = jobs.get_mut(&req.job_id).ok_or(StatusCode::NOT_FOUND)?;
        job.callback = Some(req.callback.clone());
    }

    let http = state.http.clone();
    let delay = state.config.callback_delay;
    let form = CallbackForm {
        job_id: req.job_id.clone(),
        status: CallbackStatus::Success,
    };
    let callback = req.callback;

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match http.post(&callback).form(&form).send().await {
            Ok(resp) => info!("callback de {} entregado ({})", form.job_id, resp.status()),
            Err(e) => warn!("no se pudo entregar el callback de {}: {}", form.job_id, e),
        }
    });

    Ok(Json(json!({ "registered": req.job_id })))
}

async fn query_result(
    State(state): State<StubState>,
    Query(q): Query<JobQuery>,
) -> Result<&'static str, StatusCode> {
    let wait = state.config.wait_polls;
    let mut jobs = state.jobs();
    let job = jobs.get_mut(&q.job_id).ok_or(StatusCode::NOT_FOUND)?;

    if job.polls < wait {
        job.polls += 1;
        return Ok(STATUS_NOT_DONE);
    }
    Ok(STATUS_DONE)
}

async fn get_result(
    State(state): State<StubState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<Value>, StatusCode> {
    let job = state
        .jobs()
        .get(&q.job_id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(canned_result(&state, &job)))
}

/// Resultado fijo de un job: claves `<tabla>_<año>` para que los resultados
/// de años distintos no choquen al consolidarlos.
fn canned_result(state: &StubState, job: &StubJob) -> Value {
    let cfg = &state.config;
    let y = job.year;
    let mut body = Map::new();

    match job.kind {
        StubKind::Dropq => {
            for name in DROPQ_TABLES {
                let table = if name == FISCAL_TOTALS_TABLE {
                    TOTAL_ROWS
                        .iter()
                        .map(|row| (format!("{row}_{y}"), json!(format!("{:.2}", 1000.0 + f64::from(y)))))
                        .collect::<Map<String, Value>>()
                } else {
                    let mut t = Map::new();
                    t.insert(format!("{name}_{y}"), json!([0.0, f64::from(y)]));
                    t
                };
                body.insert(name.to_string(), Value::Object(table));
            }
            body.insert(ENGINE_VERSION_FIELD.to_string(), json!(cfg.engine_version));
            body.insert(DISPATCH_VERSION_FIELD.to_string(), json!(cfg.dispatch_version));
        }
        StubKind::Elastic => {
            let mut t = Map::new();
            t.insert(
                format!("{ELASTICITY_ROW}_{y}"),
                json!(format!("{:.5}", 0.001 * f64::from(y))),
            );
            body.insert(ELASTICITY_TABLE.to_string(), Value::Object(t));
            body.insert(ENGINE_VERSION_FIELD.to_string(), json!(cfg.engine_version));
            body.insert(DISPATCH_VERSION_FIELD.to_string(), json!(cfg.dispatch_version));
        }
        StubKind::Ogusa => {
            body.insert(
                DYNAMIC_TABLE.to_string(),
                json!({ format!("Y_{y}"): 1.0, format!("C_{y}"): 0.7 }),
            );
            body.insert(OGUSA_VERSION_FIELD.to_string(), json!(cfg.ogusa_version));
            body.insert(DISPATCH_VERSION_FIELD.to_string(), json!(cfg.dispatch_version));
        }
    }

    Value::Object(body)
}

use serde::{Deserialize, Serialize};

use crate::job::{CallbackStatus, JobId};

/* --------- Rutas que exponen los workers --------- */

pub const DROPQ_START_PATH: &str = "/dropq_start_job";
pub const ELASTIC_START_PATH: &str = "/elastic_gdp_start_job";
pub const OGUSA_START_PATH: &str = "/ogusa_start_job";
pub const REGISTER_PATH: &str = "/register_job";
pub const STATUS_PATH: &str = "/dropq_query_result";
pub const RESULT_PATH: &str = "/dropq_get_result";

/// Ruta del master que recibe el aviso de fin de un job dinámico.
pub const CALLBACK_PATH: &str = "/dynamic/dynamic_finished";

/* --------- Respuestas literales del endpoint de status --------- */

pub const STATUS_DONE: &str = "YES";
pub const STATUS_NOT_DONE: &str = "NO";
pub const STATUS_FAILED: &str = "FAIL";

/* --------- Campos de versión en los resultados --------- */

/// Versión del motor de simulación estático
pub const ENGINE_VERSION_FIELD: &str = "taxcalc_version";
/// Versión del motor dinámico
pub const OGUSA_VERSION_FIELD: &str = "ogusa_version";
/// Versión de la librería de despacho del worker
pub const DISPATCH_VERSION_FIELD: &str = "dropq_version";

/// Respuesta del worker a un submit exitoso.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    /// Largo de la cola del worker al momento de aceptar el job
    #[serde(default)]
    pub qlength: u32,
    /// Solo lo mandan los workers dinámicos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub job_id: JobId,
    pub callback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQuery {
    pub job_id: JobId,
}

/// Body (form) que el worker manda al callback del master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackForm {
    pub job_id: JobId,
    pub status: CallbackStatus,
}

/// Vista de un pool para `GET /api/v1/workers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub name: String,
    pub hosts: Vec<String>,
    /// Offset persistido (pool estático) o posición del cursor (pool dinámico)
    pub position: usize,
}

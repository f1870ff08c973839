use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::results::{AggregateResult, DynamicResult, ElasticResult};

pub type JobId = String;
pub type RunId = String;

/// Un job aceptado por un worker. El `job_id` solo tiene sentido junto con su host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub host: String,
}

impl SubmittedJob {
    pub fn new(job_id: impl Into<JobId>, host: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            host: host.into(),
        }
    }
}

/// Estado de un job remoto según el endpoint de status. Un `FAIL` no es un
/// estado: se informa como error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Succeeded,
}

/// Estado de un barrido completo (o de un job dinámico) del lado del master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Estado que reporta el worker en el callback de un job dinámico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Success,
    Failure,
}

/// Clase de barrido estático.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    /// Tablas completas (deciles, bins, totales fiscales), años 0..N
    Dropq,
    /// Elasticidad del PIB, años 1..N
    Elastic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRequest {
    pub kind: SweepKind,
    pub first_budget_year: u32,
    /// Modificaciones del usuario; el core no interpreta su forma
    pub user_mods: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepInfo {
    pub id: RunId,
    pub kind: SweepKind,
    pub status: RunStatus,
    pub first_budget_year: u32,
    pub jobs: Vec<SubmittedJob>,
    pub max_queue_length: u32,

    /// -------- Progreso --------
    pub completed_jobs: u32,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Resultado consolidado de un barrido, según su clase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepResults {
    Dropq(AggregateResult),
    Elastic(ElasticResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicRequest {
    pub first_budget_year: u32,
    pub ogusa_params: serde_json::Value,
    pub user_mods: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicInfo {
    pub id: RunId,
    pub status: RunStatus,
    pub job: SubmittedJob,
    pub guid: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<DynamicResult>,
}

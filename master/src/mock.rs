//! Worker guionado para tests y demos: respuestas fijas en memoria detrás
//! del mismo [`WorkerClient`] que usa el cliente HTTP real.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use common::STATUS_DONE;

use crate::client::{TransportError, WorkerClient, WorkerReply, WorkerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Submit,
    Register,
    Status,
    Result,
}

/// Una llamada que recibió el worker guionado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub host: String,
    /// Path en submit; `job_id` en registro, status y resultados
    pub target: String,
}

#[derive(Debug, Default)]
struct Script {
    submit: VecDeque<WorkerResult>,
    submit_default: Option<WorkerResult>,
    register: VecDeque<WorkerResult>,
    register_default: Option<WorkerResult>,
    status: HashMap<String, VecDeque<WorkerResult>>,
    results: HashMap<String, WorkerResult>,
    calls: Vec<Call>,
    next_job: u64,
}

/// Respuestas en cola por operación; cuando una cola se vacía se usa el
/// default de esa operación.
///
/// Defaults: submit acepta con `job-<n>` y `qlength` 2, registro acepta,
/// status responde `YES`, resultados responden 404.
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    script: Mutex<Script>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_submit(self, reply: WorkerResult) -> Self {
        self.with(|s| s.submit.push_back(reply))
    }

    pub fn always_submit(self, reply: WorkerResult) -> Self {
        self.with(|s| s.submit_default = Some(reply))
    }

    pub fn then_register(self, reply: WorkerResult) -> Self {
        self.with(|s| s.register.push_back(reply))
    }

    pub fn always_register(self, reply: WorkerResult) -> Self {
        self.with(|s| s.register_default = Some(reply))
    }

    pub fn status_for(self, job_id: &str, replies: Vec<WorkerResult>) -> Self {
        self.with(|s| {
            s.status.insert(job_id.to_string(), replies.into());
        })
    }

    pub fn result_for(self, job_id: &str, reply: WorkerResult) -> Self {
        self.with(|s| {
            s.results.insert(job_id.to_string(), reply);
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn hosts_for(&self, kind: CallKind) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.host.clone())
            .collect()
    }

    fn with(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut *self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, kind: CallKind, host: &str, target: &str) -> std::sync::MutexGuard<'_, Script> {
        let mut s = self.lock();
        s.calls.push(Call {
            kind,
            host: host.to_string(),
            target: target.to_string(),
        });
        s
    }
}

/// Respuesta de submit aceptado, con la forma que usan los workers.
pub fn accepted(job_id: &str, qlength: u32) -> WorkerResult {
    Ok(WorkerReply::ok(format!(
        r#"{{"job_id": "{job_id}", "qlength": {qlength}}}"#
    )))
}

pub fn http_status(status: u16) -> WorkerResult {
    Ok(WorkerReply::new(status, ""))
}

pub fn timeout() -> WorkerResult {
    Err(TransportError::Timeout)
}

pub fn refused() -> WorkerResult {
    Err(TransportError::Request("connection refused".to_string()))
}

impl WorkerClient for ScriptedWorker {
    async fn submit_job(&self, host: &str, path: &str, _form: &[(String, String)]) -> WorkerResult {
        let mut s = self.record(CallKind::Submit, host, path);
        if let Some(reply) = s.submit.pop_front() {
            return reply;
        }
        if let Some(reply) = s.submit_default.clone() {
            return reply;
        }
        s.next_job += 1;
        accepted(&format!("job-{}", s.next_job), 2)
    }

    async fn register_job(&self, host: &str, form: &[(String, String)]) -> WorkerResult {
        let job_id = form
            .iter()
            .find(|(k, _)| k == "job_id")
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        let mut s = self.record(CallKind::Register, host, job_id);
        s.register
            .pop_front()
            .or_else(|| s.register_default.clone())
            .unwrap_or_else(|| Ok(WorkerReply::ok(r#"{"registered": "guid-mock"}"#)))
    }

    async fn results_ready(&self, host: &str, job_id: &str) -> WorkerResult {
        let mut s = self.record(CallKind::Status, host, job_id);
        s.status
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(WorkerReply::ok(STATUS_DONE)))
    }

    async fn retrieve_results(&self, host: &str, job_id: &str) -> WorkerResult {
        let s = self.record(CallKind::Result, host, job_id);
        s.results
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| http_status(404))
    }
}

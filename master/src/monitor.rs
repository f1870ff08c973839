use chrono::Utc;
use common::{RunStatus, SubmittedJob, SweepKind, SweepResults};
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::error::DispatchError;
use crate::state::{lock, AppState};

pub async fn monitor_sweeps<C: WorkerClient + 'static>(state: AppState<C>) {
    loop {
        tokio::time::sleep(state.poll_interval).await;
        check_sweeps(&state).await;
    }
}

/// Una pasada sobre los barridos en curso: cuenta jobs listos y, cuando
/// están todos, consolida el resultado.
pub async fn check_sweeps<C: WorkerClient + 'static>(state: &AppState<C>) {
    let running: Vec<(String, SweepKind, Vec<SubmittedJob>)> = lock(&state.sweeps)
        .values()
        .filter(|s| s.status == RunStatus::Running)
        .map(|s| (s.id.clone(), s.kind, s.jobs.clone()))
        .collect();

    for (id, kind, jobs) in running {
        let ready = match state.dispatcher.results_ready(&jobs).await {
            Ok(ready) => ready,
            Err(e @ (DispatchError::TransportTimeout { .. } | DispatchError::Transport { .. })) => {
                // el host puede volver: se reintenta en la próxima pasada
                warn!("barrido {}: no se pudo consultar status: {}", id, e);
                continue;
            }
            Err(e) => {
                fail_sweep(state, &id, &e);
                continue;
            }
        };

        let completed = ready.iter().filter(|r| **r).count();
        if let Some(sweep) = lock(&state.sweeps).get_mut(&id) {
            sweep.completed_jobs = completed as u32;
        }

        if completed < jobs.len() {
            continue;
        }

        let outcome = match kind {
            SweepKind::Dropq => state
                .dispatcher
                .dropq_get_results(&jobs)
                .await
                .map(SweepResults::Dropq),
            SweepKind::Elastic => state
                .dispatcher
                .elastic_get_results(&jobs)
                .await
                .map(SweepResults::Elastic),
        };

        match outcome {
            Ok(results) => {
                lock(&state.sweep_results).insert(id.clone(), results);
                if let Some(sweep) = lock(&state.sweeps).get_mut(&id) {
                    sweep.status = RunStatus::Succeeded;
                    sweep.finished_at = Some(Utc::now());
                }
                info!("barrido {} terminado", id);
            }
            Err(e) => fail_sweep(state, &id, &e),
        }
    }
}

fn fail_sweep<C>(state: &AppState<C>, id: &str, e: &DispatchError) {
    warn!("barrido {} falló: {}", id, e);
    if let Some(sweep) = lock(&state.sweeps).get_mut(id) {
        sweep.status = RunStatus::Failed;
        sweep.error = Some(e.to_string());
        sweep.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WorkerReply;
    use crate::dispatcher::scripted;
    use crate::mock::{timeout, ScriptedWorker};
    use common::SweepInfo;
    use std::time::Duration;

    fn sweep(id: &str, kind: SweepKind, jobs: &[&str]) -> SweepInfo {
        SweepInfo {
            id: id.to_string(),
            kind,
            status: RunStatus::Running,
            first_budget_year: 2017,
            jobs: jobs.iter().map(|j| SubmittedJob::new(*j, "h0")).collect(),
            max_queue_length: 0,
            completed_jobs: 0,
            submitted_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    fn state_with(worker: ScriptedWorker, sweeps: Vec<SweepInfo>) -> AppState<ScriptedWorker> {
        let state = AppState::new(scripted(worker, 1, 1), Duration::from_millis(10));
        for s in sweeps {
            lock(&state.sweeps).insert(s.id.clone(), s);
        }
        state
    }

    fn elastic(key: &str) -> WorkerReply {
        WorkerReply::ok(serde_json::json!({"elasticity_gdp": {key: "0.1"}}).to_string())
    }

    #[tokio::test]
    async fn barrido_sigue_corriendo_mientras_haya_jobs_pendientes() {
        let worker = ScriptedWorker::new().status_for("b", vec![Ok(WorkerReply::ok("NO"))]);
        let state = state_with(worker, vec![sweep("s1", SweepKind::Elastic, &["a", "b"])]);

        check_sweeps(&state).await;

        let s = lock(&state.sweeps).get("s1").cloned().unwrap();
        assert_eq!(s.status, RunStatus::Running);
        assert_eq!(s.completed_jobs, 1);
        assert!(lock(&state.sweep_results).is_empty());
    }

    #[tokio::test]
    async fn barrido_completo_se_consolida() {
        let worker = ScriptedWorker::new()
            .result_for("a", Ok(elastic("gdp_elasticity_1")))
            .result_for("b", Ok(elastic("gdp_elasticity_2")));
        let state = state_with(worker, vec![sweep("s1", SweepKind::Elastic, &["a", "b"])]);

        check_sweeps(&state).await;

        let s = lock(&state.sweeps).get("s1").cloned().unwrap();
        assert_eq!(s.status, RunStatus::Succeeded);
        assert_eq!(s.completed_jobs, 2);
        assert!(s.finished_at.is_some());
        assert!(matches!(
            lock(&state.sweep_results).get("s1"),
            Some(SweepResults::Elastic(r)) if r.elasticity_gdp[0].values.len() == 3
        ));
    }

    #[tokio::test]
    async fn fail_remoto_marca_el_barrido_como_fallido() {
        let worker = ScriptedWorker::new().status_for("b", vec![Ok(WorkerReply::ok("FAIL"))]);
        let state = state_with(worker, vec![sweep("s1", SweepKind::Dropq, &["a", "b"])]);

        check_sweeps(&state).await;

        let s = lock(&state.sweeps).get("s1").cloned().unwrap();
        assert_eq!(s.status, RunStatus::Failed);
        assert!(s.error.unwrap().contains("b"));
    }

    #[tokio::test]
    async fn timeout_de_status_no_hace_fallar_el_barrido() {
        let worker = ScriptedWorker::new().status_for("a", vec![timeout()]);
        let state = state_with(worker, vec![sweep("s1", SweepKind::Dropq, &["a"])]);

        check_sweeps(&state).await;

        let s = lock(&state.sweeps).get("s1").cloned().unwrap();
        assert_eq!(s.status, RunStatus::Running);
        assert!(s.error.is_none());
    }

    #[tokio::test]
    async fn error_de_consolidacion_es_fatal() {
        // un body que no es un objeto JSON no se puede consolidar
        let worker = ScriptedWorker::new().result_for("a", Ok(WorkerReply::ok("[]")));
        let state = state_with(worker, vec![sweep("s1", SweepKind::Dropq, &["a"])]);

        check_sweeps(&state).await;

        let s = lock(&state.sweeps).get("s1").cloned().unwrap();
        assert_eq!(s.status, RunStatus::Failed);
    }
}

use common::{
    build_year_tasks, SubmitResponse, SubmittedJob, SweepKind, Task, DROPQ_START_PATH,
    ELASTIC_START_PATH,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// Lo que devuelve un despacho estático: un job por tarea y la cola más
/// larga que reportaron los workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub jobs: Vec<SubmittedJob>,
    pub max_queue_length: u32,
}

/// Sin modificaciones no se despacha nada.
pub fn has_mods(mods: &Value) -> bool {
    match mods {
        Value::Null => false,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

impl<C: WorkerClient> Dispatcher<C> {
    /// Barrido completo: un job por año en `0..num_budget_years`.
    pub async fn submit_dropq_calculation(
        &self,
        mods: &Value,
        first_budget_year: u32,
    ) -> Result<Submission, DispatchError> {
        self.submit_calculation(mods, first_budget_year, DROPQ_START_PATH, 0)
            .await
    }

    /// Elasticidad del PIB: arranca en el año 1.
    pub async fn submit_elastic_calculation(
        &self,
        mods: &Value,
        first_budget_year: u32,
    ) -> Result<Submission, DispatchError> {
        self.submit_calculation(mods, first_budget_year, ELASTIC_START_PATH, 1)
            .await
    }

    pub async fn submit_sweep(
        &self,
        kind: SweepKind,
        mods: &Value,
        first_budget_year: u32,
    ) -> Result<Submission, DispatchError> {
        match kind {
            SweepKind::Dropq => self.submit_dropq_calculation(mods, first_budget_year).await,
            SweepKind::Elastic => self.submit_elastic_calculation(mods, first_budget_year).await,
        }
    }

    async fn submit_calculation(
        &self,
        mods: &Value,
        first_budget_year: u32,
        path: &str,
        start_year: u32,
    ) -> Result<Submission, DispatchError> {
        if !has_mods(mods) {
            return Err(DispatchError::NothingToSubmit);
        }

        let tasks = build_year_tasks(
            mods,
            first_budget_year,
            start_year,
            self.settings.num_budget_years,
        )
        .map_err(|e| DispatchError::malformed("master", e))?;

        self.submit(&tasks, path).await
    }

    /// Envía cada tarea, en orden, a los hosts reservados del pool estático.
    ///
    /// El índice de host avanza tras cada envío exitoso y tras cada intento
    /// fallido (non-200, timeout o error de transporte), recorriendo todo el
    /// pool desde el primer host reservado. Si una tarea acumula más de
    /// `max_attempts` fallos se aborta todo el despacho; lo ya enviado no se
    /// deshace.
    pub async fn submit(&self, tasks: &[Task], path: &str) -> Result<Submission, DispatchError> {
        let reservation = self
            .rotation
            .acquire_hosts(&self.static_pool, tasks.len())
            .await?;
        info!("hosts reservados: {:?}", reservation.hosts);

        let mut jobs = Vec::with_capacity(tasks.len());
        let num_hosts = self.static_pool.len();
        let mut hostname_idx = reservation.start;
        let mut max_queue_length: u32 = 0;

        for task in tasks {
            let form = task.form_fields();
            let mut attempts: u32 = 0;

            loop {
                let host = self.static_pool.host(hostname_idx);

                match self.client.submit_job(host, path, &form).await {
                    Ok(reply) if reply.is_success() => {
                        let resp: SubmitResponse = reply.json(host)?;
                        info!("año {} enviado a {} (job {})", task.year, host, resp.job_id);

                        jobs.push(SubmittedJob::new(resp.job_id, host));
                        hostname_idx = (hostname_idx + 1) % num_hosts;
                        max_queue_length = max_queue_length.max(resp.qlength);
                        break;
                    }
                    Ok(reply) => {
                        warn!(
                            "FALLÓ año {} en {} (HTTP {})",
                            task.year, host, reply.status
                        );
                    }
                    Err(e) => {
                        warn!("no se pudo enviar año {} a {}: {}", task.year, host, e);
                    }
                }

                hostname_idx = (hostname_idx + 1) % num_hosts;
                attempts += 1;

                if attempts > self.settings.max_attempts {
                    warn!("máximo de intentos superado para año {}, se aborta", task.year);
                    return Err(DispatchError::SubmitExhausted {
                        task: format!("año {}", task.year),
                        attempts,
                    });
                }
            }
        }

        Ok(Submission {
            jobs,
            max_queue_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::scripted;
    use crate::mock::{accepted, http_status, refused, timeout, CallKind, ScriptedWorker};
    use serde_json::json;

    fn tasks(n: u32) -> Vec<Task> {
        (0..n).map(|y| Task::new(y, "{}")).collect()
    }

    #[tokio::test]
    async fn tres_hosts_diez_tareas_rotan_en_orden() {
        let d = scripted(ScriptedWorker::new(), 3, 1);

        let sub = d.submit(&tasks(10), DROPQ_START_PATH).await.unwrap();

        assert_eq!(sub.jobs.len(), 10);
        assert_eq!(
            d.client().hosts_for(CallKind::Submit),
            vec!["h0", "h1", "h2", "h0", "h1", "h2", "h0", "h1", "h2", "h0"]
        );
        assert_eq!(d.rotation().current_offset().await.unwrap(), 1);
        assert_eq!(sub.max_queue_length, 2);
    }

    #[tokio::test]
    async fn reintenta_en_otro_host_y_liga_el_job_al_que_acepto() {
        let worker = ScriptedWorker::new()
            .then_submit(http_status(502))
            .then_submit(timeout())
            .then_submit(refused())
            .then_submit(accepted("ok-1", 0));
        let d = scripted(worker, 5, 1);

        let sub = d.submit(&tasks(1), DROPQ_START_PATH).await.unwrap();

        assert_eq!(sub.jobs, vec![SubmittedJob::new("ok-1", "h3")]);
        assert_eq!(d.client().hosts_for(CallKind::Submit), vec!["h0", "h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn offset_al_final_del_pool_sigue_rotando_desde_el_principio() {
        let worker = ScriptedWorker::new()
            .then_submit(http_status(502))
            .then_submit(accepted("ok-1", 0));
        let d = scripted(worker, 3, 1);
        d.rotation()
            .acquire_hosts(d.static_pool(), 2)
            .await
            .unwrap();

        // offset 2: el primer intento va a h2 y el reintento a h0
        let sub = d.submit(&tasks(1), DROPQ_START_PATH).await.unwrap();
        assert_eq!(sub.jobs, vec![SubmittedJob::new("ok-1", "h0")]);

        let sub = d.submit(&tasks(4), DROPQ_START_PATH).await.unwrap();
        assert_eq!(
            sub.jobs.iter().map(|j| j.host.as_str()).collect::<Vec<_>>(),
            vec!["h0", "h1", "h2", "h0"]
        );
        assert_eq!(d.rotation().current_offset().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sin_respuestas_200_aborta_tras_techo_mas_uno_intentos() {
        let d = scripted(ScriptedWorker::new().always_submit(http_status(500)), 3, 1);

        let err = d.submit(&tasks(3), DROPQ_START_PATH).await.unwrap_err();

        assert!(matches!(err, DispatchError::SubmitExhausted { attempts: 21, .. }));
        assert_eq!(d.client().hosts_for(CallKind::Submit).len(), 21);
    }

    #[tokio::test]
    async fn lo_ya_enviado_no_se_deshace_al_abortar() {
        let worker = ScriptedWorker::new()
            .then_submit(accepted("primero", 1))
            .always_submit(timeout());
        let d = scripted(worker, 2, 1);

        let err = d.submit(&tasks(2), DROPQ_START_PATH).await.unwrap_err();

        assert!(matches!(err, DispatchError::SubmitExhausted { .. }));
        // 1 envío exitoso + 21 intentos fallidos del segundo año
        assert_eq!(d.client().hosts_for(CallKind::Submit).len(), 22);
        // el offset ya se consumió al reservar los hosts
        assert_eq!(d.rotation().current_offset().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guarda_la_cola_mas_larga() {
        let worker = ScriptedWorker::new()
            .then_submit(accepted("a", 2))
            .then_submit(accepted("b", 7))
            .then_submit(accepted("c", 3));
        let d = scripted(worker, 3, 1);

        let sub = d.submit(&tasks(3), DROPQ_START_PATH).await.unwrap();
        assert_eq!(sub.max_queue_length, 7);
    }

    #[tokio::test]
    async fn nodo_caido_intermitente_igual_completa() {
        // un submit sí, uno no
        let mut worker = ScriptedWorker::new();
        for i in 0..10 {
            worker = worker
                .then_submit(http_status(502))
                .then_submit(accepted(&format!("j{i}"), 1));
        }
        let d = scripted(worker, 4, 1);

        let sub = d.submit(&tasks(10), DROPQ_START_PATH).await.unwrap();
        assert_eq!(sub.jobs.len(), 10);
        assert_eq!(d.client().hosts_for(CallKind::Submit).len(), 20);
    }

    #[tokio::test]
    async fn respuesta_200_ilegible_es_fatal() {
        let worker = ScriptedWorker::new().then_submit(Ok(crate::client::WorkerReply::ok("oops")));
        let d = scripted(worker, 2, 1);

        let err = d.submit(&tasks(1), DROPQ_START_PATH).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse { host, .. } if host == "h0"));
    }

    #[tokio::test]
    async fn sin_mods_no_se_envia_nada() {
        let d = scripted(ScriptedWorker::new(), 2, 1);

        let err = d.submit_dropq_calculation(&json!({}), 2017).await.unwrap_err();
        assert!(matches!(err, DispatchError::NothingToSubmit));
        assert!(d.client().calls().is_empty());
    }

    #[tokio::test]
    async fn elasticidad_usa_su_endpoint_y_arranca_en_el_anio_uno() {
        let d = scripted(ScriptedWorker::new(), 3, 1);

        let sub = d
            .submit_sweep(SweepKind::Elastic, &json!({"_II_em": [4000]}), 2017)
            .await
            .unwrap();

        assert_eq!(sub.jobs.len(), 9);
        assert!(d
            .client()
            .calls()
            .iter()
            .all(|c| c.target == ELASTIC_START_PATH));
        assert_eq!(d.rotation().current_offset().await.unwrap(), 0);
    }

    #[test]
    fn has_mods_distingue_vacios() {
        assert!(!has_mods(&Value::Null));
        assert!(!has_mods(&json!({})));
        assert!(!has_mods(&json!([])));
        assert!(has_mods(&json!({"a": 1})));
        assert!(has_mods(&json!("x")));
    }
}

use common::{DynamicTask, SubmitResponse, SubmittedJob, OGUSA_START_PATH};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// Cómo se decide que el registro (fase 2) salió bien.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationCheck {
    /// Se exige HTTP 200 en la respuesta del registro
    Strict,
    /// Alcanza con que el registro no falle a nivel transporte. Es lo que hacía
    /// el despachador anterior, que miraba el código de la respuesta del submit.
    Legacy,
}

/// Job dinámico enviado y registrado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredJob {
    pub job: SubmittedJob,
    pub guid: Option<String>,
    /// Body que devolvió `/register_job`
    pub registration_ack: String,
}

impl<C: WorkerClient> Dispatcher<C> {
    /// Arma la tarea dinámica y la envía con el handshake de dos fases.
    pub async fn submit_ogusa_calculation(
        &self,
        ogusa_params: &Value,
        mods: &Value,
        first_budget_year: u32,
    ) -> Result<RegisteredJob, DispatchError> {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(first_budget_year.to_string(), mods.clone());

        let task = DynamicTask {
            ogusa_params: ogusa_params.to_string(),
            user_mods: Value::Object(wrapped).to_string(),
            first_year: first_budget_year,
            callback: self.settings.callback_url.clone(),
        };

        self.submit_and_register(&task).await
    }

    /// Fase 1: submit al pool dinámico desde la posición del cursor, rotando
    /// ante cada fallo. Fase 2: registro del callback en el host que aceptó
    /// el job, con un contador de intentos nuevo.
    ///
    /// El cursor queda tomado durante toda la secuencia y avanza una vez más
    /// al terminar, así llamadas consecutivas recorren el pool.
    pub async fn submit_and_register(
        &self,
        task: &DynamicTask,
    ) -> Result<RegisteredJob, DispatchError> {
        let mut cursor = self.cursor.lock().await;
        let max_attempts = self.settings.max_attempts;

        // ---- fase 1: submit ----
        let form = task.form_fields();
        let mut attempts: u32 = 0;

        let (job, guid) = loop {
            let host = self.dynamic_pool.host(cursor.position()).to_string();

            match self.client.submit_job(&host, OGUSA_START_PATH, &form).await {
                Ok(reply) if reply.is_success() => {
                    let resp: SubmitResponse = reply.json(&host)?;
                    info!("job dinámico {} enviado a {}", resp.job_id, host);
                    break (SubmittedJob::new(resp.job_id, host), resp.guid);
                }
                Ok(reply) => warn!("FALLÓ submit dinámico en {} (HTTP {})", host, reply.status),
                Err(e) => warn!("no se pudo enviar a {}: {}", host, e),
            }

            cursor.advance();
            attempts += 1;

            if attempts > max_attempts {
                cursor.advance();
                warn!("máximo de intentos superado en submit dinámico, se aborta");
                return Err(DispatchError::SubmitExhausted {
                    task: "job dinámico".to_string(),
                    attempts,
                });
            }
        };

        // ---- fase 2: registro ----
        let reg_form = vec![
            ("callback".to_string(), task.callback.clone()),
            ("job_id".to_string(), job.job_id.clone()),
        ];
        let mut attempts: u32 = 0;

        let registration_ack = loop {
            match self.client.register_job(&job.host, &reg_form).await {
                Ok(reply) => {
                    let accepted = match self.settings.registration {
                        RegistrationCheck::Strict => reply.is_success(),
                        RegistrationCheck::Legacy => true,
                    };
                    if accepted {
                        info!("job {} registrado en {}", job.job_id, job.host);
                        break reply.body;
                    }
                    warn!("FALLÓ registro de {} en {} (HTTP {})", job.job_id, job.host, reply.status);
                }
                Err(e) => warn!("no se pudo registrar {} en {}: {}", job.job_id, job.host, e),
            }

            cursor.advance();
            attempts += 1;

            if attempts > max_attempts {
                warn!(
                    "job {} quedó huérfano en {}: registro agotado",
                    job.job_id, job.host
                );
                return Err(DispatchError::RegistrationFailedAfterSubmit {
                    job_id: job.job_id,
                    host: job.host,
                    attempts,
                });
            }
        };

        // enviado y registrado: el próximo job dinámico va al siguiente nodo
        cursor.advance();

        Ok(RegisteredJob {
            job,
            guid,
            registration_ack,
        })
    }
}

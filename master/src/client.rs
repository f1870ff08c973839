use std::future::Future;
use std::time::Duration;

use common::{REGISTER_PATH, RESULT_PATH, STATUS_PATH};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::DispatchError;

/// Respuesta cruda de un worker: código HTTP y body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReply {
    pub status: u16,
    pub body: String,
}

impl WorkerReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn json<T: DeserializeOwned>(&self, host: &str) -> Result<T, DispatchError> {
        serde_json::from_str(&self.body).map_err(|e| DispatchError::malformed(host, e))
    }
}

/// Falla a nivel transporte (no llegó respuesta HTTP).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Request(String),
}

impl TransportError {
    pub fn at(self, host: &str) -> DispatchError {
        match self {
            TransportError::Timeout => DispatchError::TransportTimeout {
                host: host.to_string(),
            },
            TransportError::Request(message) => DispatchError::Transport {
                host: host.to_string(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

pub type WorkerResult = Result<WorkerReply, TransportError>;

/// Las cuatro llamadas que el core le hace a un worker remoto.
///
/// El dispatcher solo interpreta códigos y bodies; cualquier implementación
/// (HTTP real, dobles de prueba) se puede enchufar detrás.
pub trait WorkerClient: Send + Sync {
    /// `POST http://{host}{path}` con body de formulario.
    fn submit_job(
        &self,
        host: &str,
        path: &str,
        form: &[(String, String)],
    ) -> impl Future<Output = WorkerResult> + Send;

    /// `POST http://{host}/register_job` con `job_id` y `callback`.
    fn register_job(
        &self,
        host: &str,
        form: &[(String, String)],
    ) -> impl Future<Output = WorkerResult> + Send;

    /// `GET http://{host}/dropq_query_result?job_id=...`
    fn results_ready(&self, host: &str, job_id: &str) -> impl Future<Output = WorkerResult> + Send;

    /// `GET http://{host}/dropq_get_result?job_id=...`
    fn retrieve_results(
        &self,
        host: &str,
        job_id: &str,
    ) -> impl Future<Output = WorkerResult> + Send;
}

/// Cliente real sobre reqwest.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    http: Client,
    /// Timeout corto para submit y registro
    submit_timeout: Duration,
    /// Timeout para status y descarga de resultados
    result_timeout: Duration,
}

impl HttpWorkerClient {
    pub fn new(submit_timeout: Duration, result_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            submit_timeout,
            result_timeout,
        }
    }

    async fn post_form(&self, url: String, form: &[(String, String)]) -> WorkerResult {
        let resp = self
            .http
            .post(&url)
            .form(form)
            .timeout(self.submit_timeout)
            .send()
            .await?;
        into_reply(resp).await
    }

    async fn get_job(&self, url: String, job_id: &str) -> WorkerResult {
        let resp = self
            .http
            .get(&url)
            .query(&[("job_id", job_id)])
            .timeout(self.result_timeout)
            .send()
            .await?;
        into_reply(resp).await
    }
}

async fn into_reply(resp: reqwest::Response) -> WorkerResult {
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    Ok(WorkerReply { status, body })
}

fn worker_url(host: &str, path: &str) -> String {
    format!("http://{}{}", host, path)
}

impl WorkerClient for HttpWorkerClient {
    async fn submit_job(&self, host: &str, path: &str, form: &[(String, String)]) -> WorkerResult {
        self.post_form(worker_url(host, path), form).await
    }

    async fn register_job(&self, host: &str, form: &[(String, String)]) -> WorkerResult {
        self.post_form(worker_url(host, REGISTER_PATH), form).await
    }

    async fn results_ready(&self, host: &str, job_id: &str) -> WorkerResult {
        self.get_job(worker_url(host, STATUS_PATH), job_id).await
    }

    async fn retrieve_results(&self, host: &str, job_id: &str) -> WorkerResult {
        self.get_job(worker_url(host, RESULT_PATH), job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_url_arma_http_con_host_y_path() {
        assert_eq!(
            worker_url("10.0.0.1:5050", "/dropq_start_job"),
            "http://10.0.0.1:5050/dropq_start_job"
        );
    }

    #[test]
    fn transport_error_conserva_el_host() {
        assert!(matches!(
            TransportError::Timeout.at("h1"),
            DispatchError::TransportTimeout { host } if host == "h1"
        ));
        assert!(matches!(
            TransportError::Request("conn refused".into()).at("h2"),
            DispatchError::Transport { host, message } if host == "h2" && message == "conn refused"
        ));
    }

    #[test]
    fn reply_json_mal_formado_es_malformed_response() {
        let reply = WorkerReply::ok("<html>");
        let parsed: Result<common::SubmitResponse, _> = reply.json("h1");
        assert!(matches!(parsed, Err(DispatchError::MalformedResponse { .. })));
    }

    #[tokio::test]
    async fn host_inalcanzable_es_error_de_transporte() {
        // puerto 9 (discard) en loopback: conexión rechazada, sin esperar al timeout
        let client = HttpWorkerClient::new(Duration::from_secs(1), Duration::from_secs(1));
        let res = client.results_ready("127.0.0.1:9", "x").await;
        assert!(res.is_err());
    }
}

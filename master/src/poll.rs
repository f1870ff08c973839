use common::{JobStatus, SubmittedJob, STATUS_DONE, STATUS_FAILED, STATUS_NOT_DONE};
use tracing::debug;

use crate::client::WorkerClient;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

impl<C: WorkerClient> Dispatcher<C> {
    /// Pregunta al host del job si ya terminó.
    ///
    /// Un código distinto de 200 no permite decidir: se informa `Pending`.
    pub async fn poll(&self, job: &SubmittedJob) -> Result<JobStatus, DispatchError> {
        let reply = self
            .client
            .results_ready(&job.host, &job.job_id)
            .await
            .map_err(|e| e.at(&job.host))?;

        if !reply.is_success() {
            debug!(
                "status de {} en {} no determinable (HTTP {})",
                job.job_id, job.host, reply.status
            );
            return Ok(JobStatus::Pending);
        }

        match reply.body.as_str() {
            STATUS_DONE => Ok(JobStatus::Succeeded),
            STATUS_NOT_DONE => Ok(JobStatus::Pending),
            STATUS_FAILED => Err(DispatchError::RemoteJobFailed {
                job_id: job.job_id.clone(),
                host: job.host.clone(),
            }),
            _ => Err(DispatchError::UnknownStatusResponse {
                host: job.host.clone(),
                body: reply.body.clone(),
            }),
        }
    }

    /// Estado de cada job, en orden: `true` si ya se puede bajar el resultado.
    pub async fn results_ready(&self, jobs: &[SubmittedJob]) -> Result<Vec<bool>, DispatchError> {
        let mut ready = Vec::with_capacity(jobs.len());
        for job in jobs {
            ready.push(self.poll(job).await? == JobStatus::Succeeded);
        }
        Ok(ready)
    }
}

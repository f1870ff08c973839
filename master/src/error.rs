use std::io;

use common::JobId;

/// Errores del core de despacho.
///
/// `TransportTimeout` y `Transport` son recuperables dentro de los loops de
/// submit/registro (rotan de host); el resto aborta la operación en curso.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("timeout hablando con {host}")]
    TransportTimeout { host: String },

    #[error("error de transporte con {host}: {message}")]
    Transport { host: String, message: String },

    #[error("el job {job_id} falló en el host {host}")]
    RemoteJobFailed { job_id: JobId, host: String },

    #[error("se superó el máximo de intentos ({attempts}) enviando {task}")]
    SubmitExhausted { task: String, attempts: u32 },

    #[error(
        "el job {job_id} quedó creado en {host} pero no se pudo registrar tras {attempts} intentos"
    )]
    RegistrationFailedAfterSubmit {
        job_id: JobId,
        host: String,
        attempts: u32,
    },

    #[error("versiones distintas de {component} entre workers: se esperaba {expected}, llegó {found:?}")]
    VersionMismatch {
        component: String,
        expected: String,
        found: Option<String>,
    },

    #[error("respuesta de status desconocida de {host}: {body:?}")]
    UnknownStatusResponse { host: String, body: String },

    #[error("no se pudo bajar el resultado del job {job_id} en {host} (HTTP {status})")]
    ResultUnavailable {
        job_id: JobId,
        host: String,
        status: u16,
    },

    #[error("respuesta mal formada de {host}: {message}")]
    MalformedResponse { host: String, message: String },

    #[error("la clave {key} de la tabla {table} llegó de más de un job")]
    KeyCollision { table: String, key: String },

    #[error("la fila {row} no está en el orden canónico de totales")]
    UnknownTotalsRow { row: String },

    #[error("el pool de workers {0} está vacío")]
    EmptyPool(String),

    #[error("no hay modificaciones para enviar")]
    NothingToSubmit,

    #[error("no se pudo persistir el estado de rotación: {0}")]
    RotationStore(#[from] io::Error),
}

impl DispatchError {
    pub fn malformed(host: &str, message: impl ToString) -> Self {
        Self::MalformedResponse {
            host: host.to_string(),
            message: message.to_string(),
        }
    }
}

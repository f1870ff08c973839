//! Core de despacho de barridos de parámetros: reparte un job por año entre
//! los workers, registra jobs dinámicos con callback, consulta su estado y
//! consolida los resultados parciales.
//!
//! El binario `master` expone este core como servicio HTTP.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod poll;
pub mod pool;
pub mod register;
pub mod rotation;
pub mod submit;
pub mod totals;
pub mod versions;

pub mod handlers;
pub mod monitor;
pub mod state;

pub use client::{HttpWorkerClient, WorkerClient, WorkerReply};
pub use config::DispatchConfig;
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::DispatchError;
pub use register::{RegisteredJob, RegistrationCheck};
pub use submit::Submission;

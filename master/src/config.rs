use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::pool::WorkerPool;
use crate::register::RegistrationCheck;
use crate::versions::VersionPolicy;

pub const DEFAULT_NUM_BUDGET_YEARS: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS_SUBMIT_JOB: u32 = 20;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 1.0;
pub const DEFAULT_RESULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_TOTAL_ROW_NAMES: &str = "ind_tax,payroll_tax,combined_tax";

/// Configuración del master, leída una sola vez al arrancar.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub dropq_workers: WorkerPool,
    pub ogusa_workers: WorkerPool,
    pub num_budget_years: u32,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub result_timeout: Duration,
    pub poll_interval: Duration,
    pub callback_hostname: String,
    pub versions: VersionPolicy,
    pub total_row_names: Vec<String>,
    pub registration: RegistrationCheck,
    /// Si falta, el estado de rotación vive solo en memoria
    pub rotation_state_path: Option<PathBuf>,
    pub bind_addr: String,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("valor inválido en {name}: {raw:?}")),
        None => Ok(default),
    }
}

/// Mismo criterio que usan los despliegues: solo `True` activa el flag.
fn flag(name: &str, default: bool) -> bool {
    match var(name) {
        Some(raw) => matches!(raw.trim(), "True" | "true" | "1"),
        None => default,
    }
}

fn secs(name: &str, default: f64) -> Result<Duration> {
    let s: f64 = parsed_or(name, default)?;
    Duration::try_from_secs_f64(s).with_context(|| format!("duración inválida en {name}: {s}"))
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        // Sin workers estáticos no hay nada que hacer: falla al arrancar
        let dropq_list = var("DROPQ_WORKERS").unwrap_or_default();
        let dropq_workers = WorkerPool::parse("dropq", &dropq_list)?;

        // El pool dinámico puede coincidir con el estático
        let ogusa_workers = match var("OGUSA_WORKERS") {
            Some(list) => WorkerPool::parse("ogusa", &list)?,
            None => WorkerPool::new("ogusa", dropq_workers.hosts().to_vec())?,
        };

        let total_row_names = var("TOTAL_ROW_NAMES")
            .unwrap_or_else(|| DEFAULT_TOTAL_ROW_NAMES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let registration = if flag("STRICT_REGISTRATION", true) {
            RegistrationCheck::Strict
        } else {
            RegistrationCheck::Legacy
        };

        Ok(Self {
            dropq_workers,
            ogusa_workers,
            num_budget_years: parsed_or("NUM_BUDGET_YEARS", DEFAULT_NUM_BUDGET_YEARS)?,
            max_attempts: parsed_or("MAX_ATTEMPTS_SUBMIT_JOB", DEFAULT_MAX_ATTEMPTS_SUBMIT_JOB)?,
            request_timeout: secs("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            result_timeout: secs("RESULT_TIMEOUT_SECS", DEFAULT_RESULT_TIMEOUT_SECS)?,
            poll_interval: Duration::from_secs(parsed_or(
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            callback_hostname: var("CALLBACK_HOSTNAME")
                .unwrap_or_else(|| "localhost:8000".to_string()),
            versions: VersionPolicy {
                enforce: flag("ENFORCE_VERSION", false),
                expected_engine: var("EXPECTED_ENGINE_VERSION"),
                expected_ogusa: var("EXPECTED_OGUSA_VERSION"),
                ..VersionPolicy::default()
            },
            total_row_names,
            registration,
            rotation_state_path: var("ROTATION_STATE_PATH").map(PathBuf::from),
            bind_addr: var("MASTER_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }

    /// URL que los workers dinámicos llaman al terminar.
    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.callback_hostname, common::CALLBACK_PATH)
    }
}

use crate::client::{HttpWorkerClient, WorkerClient};
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::pool::{PoolCursor, WorkerPool};
use crate::register::RegistrationCheck;
use crate::rotation::HostRotation;
use crate::versions::VersionPolicy;

/// Parámetros de despacho que no cambian durante la vida del proceso.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Intentos fallidos tolerados por tarea antes de abortar
    pub max_attempts: u32,
    pub num_budget_years: u32,
    pub callback_url: String,
    pub registration: RegistrationCheck,
    pub versions: VersionPolicy,
    /// Orden canónico de filas de los totales fiscales
    pub total_row_names: Vec<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS_SUBMIT_JOB,
            num_budget_years: crate::config::DEFAULT_NUM_BUDGET_YEARS,
            callback_url: format!("http://localhost:8000{}", common::CALLBACK_PATH),
            registration: RegistrationCheck::Strict,
            versions: VersionPolicy::default(),
            total_row_names: crate::config::DEFAULT_TOTAL_ROW_NAMES
                .split(',')
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Core de despacho: dueño del estado de rotación, del cursor del pool
/// dinámico y del cliente hacia los workers.
///
/// Las operaciones viven en `submit`, `register`, `poll` y `aggregate`.
#[derive(Debug)]
pub struct Dispatcher<C> {
    pub(crate) client: C,
    pub(crate) static_pool: WorkerPool,
    pub(crate) dynamic_pool: WorkerPool,
    pub(crate) rotation: HostRotation,
    pub(crate) cursor: PoolCursor,
    pub(crate) settings: DispatchSettings,
}

impl<C: WorkerClient> Dispatcher<C> {
    pub fn new(
        client: C,
        static_pool: WorkerPool,
        dynamic_pool: WorkerPool,
        rotation: HostRotation,
        settings: DispatchSettings,
    ) -> Self {
        let cursor = PoolCursor::new(&dynamic_pool);
        Self {
            client,
            static_pool,
            dynamic_pool,
            rotation,
            cursor,
            settings,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn static_pool(&self) -> &WorkerPool {
        &self.static_pool
    }

    pub fn dynamic_pool(&self) -> &WorkerPool {
        &self.dynamic_pool
    }

    pub fn rotation(&self) -> &HostRotation {
        &self.rotation
    }

    pub fn cursor(&self) -> &PoolCursor {
        &self.cursor
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }
}

impl Dispatcher<HttpWorkerClient> {
    pub fn from_config(config: &DispatchConfig) -> Result<Self, DispatchError> {
        let rotation = match &config.rotation_state_path {
            Some(path) => HostRotation::open(path)?,
            None => HostRotation::in_memory(),
        };

        let settings = DispatchSettings {
            max_attempts: config.max_attempts,
            num_budget_years: config.num_budget_years,
            callback_url: config.callback_url(),
            registration: config.registration,
            versions: config.versions.clone(),
            total_row_names: config.total_row_names.clone(),
        };

        Ok(Self::new(
            HttpWorkerClient::new(config.request_timeout, config.result_timeout),
            config.dropq_workers.clone(),
            config.ogusa_workers.clone(),
            rotation,
            settings,
        ))
    }
}

#[cfg(test)]
pub(crate) fn scripted(
    worker: crate::mock::ScriptedWorker,
    static_hosts: usize,
    dynamic_hosts: usize,
) -> Dispatcher<crate::mock::ScriptedWorker> {
    scripted_with(worker, static_hosts, dynamic_hosts, DispatchSettings::default())
}

#[cfg(test)]
pub(crate) fn scripted_with(
    worker: crate::mock::ScriptedWorker,
    static_hosts: usize,
    dynamic_hosts: usize,
    settings: DispatchSettings,
) -> Dispatcher<crate::mock::ScriptedWorker> {
    let hosts = |prefix: &str, n: usize| -> Vec<String> { (0..n).map(|i| format!("{prefix}{i}")).collect() };
    Dispatcher::new(
        worker,
        WorkerPool::new("dropq", hosts("h", static_hosts)).unwrap(),
        WorkerPool::new("ogusa", hosts("d", dynamic_hosts)).unwrap(),
        HostRotation::in_memory(),
        settings,
    )
}

use std::{
    collections::HashMap,
    env,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::Client;

/// Qué endpoint creó el job; define la forma del resultado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    Dropq,
    Elastic,
    Ogusa,
}

impl StubKind {
    fn prefix(self) -> &'static str {
        match self {
            StubKind::Dropq => "dropq",
            StubKind::Elastic => "elastic",
            StubKind::Ogusa => "ogusa",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StubJob {
    pub kind: StubKind,
    pub year: u32,
    /// Veces que se consultó el status
    pub polls: u32,
    pub callback: Option<String>,
}

/// Configuración del worker de prueba (variables `WORKER_BIND`, `STUB_*`).
#[derive(Debug, Clone)]
pub struct StubConfig {
    pub bind_addr: String,
    /// Consultas de status que responden `NO` antes de `YES`
    pub wait_polls: u32,
    /// Nodo caído a medias: uno de cada dos submits responde 502
    pub node_down: bool,
    pub engine_version: String,
    pub ogusa_version: String,
    pub dispatch_version: String,
    pub callback_delay: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5050".to_string(),
            wait_polls: 0,
            node_down: false,
            engine_version: "0.6.9".to_string(),
            ogusa_version: "0.5.5".to_string(),
            dispatch_version: env!("CARGO_PKG_VERSION").to_string(),
            callback_delay: Duration::from_millis(100),
        }
    }
}

impl StubConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let wait_polls = match var("STUB_WAIT_POLLS") {
            Some(v) => v.trim().parse().context("STUB_WAIT_POLLS inválido")?,
            None => d.wait_polls,
        };
        let callback_delay = match var("STUB_CALLBACK_DELAY_MS") {
            Some(v) => Duration::from_millis(
                v.trim().parse().context("STUB_CALLBACK_DELAY_MS inválido")?,
            ),
            None => d.callback_delay,
        };

        Ok(Self {
            bind_addr: var("WORKER_BIND").unwrap_or(d.bind_addr),
            wait_polls,
            node_down: var("STUB_NODE_DOWN").is_some_and(|v| matches!(v.trim(), "True" | "true" | "1")),
            engine_version: var("STUB_ENGINE_VERSION").unwrap_or(d.engine_version),
            ogusa_version: var("STUB_OGUSA_VERSION").unwrap_or(d.ogusa_version),
            dispatch_version: var("STUB_DISPATCH_VERSION").unwrap_or(d.dispatch_version),
            callback_delay,
        })
    }
}

#[derive(Clone)]
pub struct StubState {
    pub config: Arc<StubConfig>,
    pub jobs: Arc<Mutex<HashMap<String, StubJob>>>,
    submits: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    pub http: Client,
}

impl StubState {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config: Arc::new(config),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            submits: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(0)),
            http: Client::new(),
        }
    }

    pub fn jobs(&self) -> MutexGuard<'_, HashMap<String, StubJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// En modo nodo caído, el primer submit y uno de cada dos después fallan.
    pub fn submit_fails(&self) -> bool {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        self.config.node_down && n % 2 == 0
    }

    /// Ids deterministas: `dropq000001`, `ogusa000002`, ...
    pub fn next_job_id(&self, kind: StubKind) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{:06}", kind.prefix(), n)
    }

    /// Jobs que todavía no responderían `YES`.
    pub fn queue_length(&self) -> u32 {
        let wait = self.config.wait_polls;
        self.jobs().values().filter(|j| j.polls < wait).count() as u32
    }
}

use tokio::sync::{Mutex, MutexGuard};

use crate::error::DispatchError;

/// Lista ordenada de workers de una misma clase. Nunca vacía.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    name: String,
    hosts: Vec<String>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, hosts: Vec<String>) -> Result<Self, DispatchError> {
        let name = name.into();
        if hosts.is_empty() {
            return Err(DispatchError::EmptyPool(name));
        }
        Ok(Self { name, hosts })
    }

    /// Parsea una lista `host1:port,host2:port` (ignora entradas vacías).
    pub fn parse(name: impl Into<String>, list: &str) -> Result<Self, DispatchError> {
        let hosts = list
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(name, hosts)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn host(&self, idx: usize) -> &str {
        &self.hosts[idx % self.hosts.len()]
    }
}

/// Cursor compartido que recorre el pool dinámico.
///
/// Avanza en cada reintento del registrador y una vez más al terminar cada
/// secuencia submit+registro; da la vuelta al llegar al tamaño del pool.
/// Quien lo use debe tomar el lock durante toda la secuencia.
#[derive(Debug)]
pub struct PoolCursor {
    position: Mutex<usize>,
    size: usize,
}

impl PoolCursor {
    pub fn new(pool: &WorkerPool) -> Self {
        Self {
            position: Mutex::new(0),
            size: pool.len(),
        }
    }

    pub async fn lock(&self) -> CursorGuard<'_> {
        CursorGuard {
            position: self.position.lock().await,
            size: self.size,
        }
    }

    pub async fn position(&self) -> usize {
        *self.position.lock().await
    }

    pub async fn reset(&self) {
        *self.position.lock().await = 0;
    }
}

pub struct CursorGuard<'a> {
    position: MutexGuard<'a, usize>,
    size: usize,
}

impl CursorGuard<'_> {
    pub fn position(&self) -> usize {
        *self.position
    }

    /// Avanza una posición y devuelve la nueva.
    pub fn advance(&mut self) -> usize {
        *self.position = (*self.position + 1) % self.size;
        *self.position
    }
}

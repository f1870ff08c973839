use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::pool::WorkerPool;

/// Registro persistido: próximo offset del pool estático.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRotationState {
    pub current_offset: usize,
}

/// Hosts reservados para un despacho.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReservation {
    /// `count` hosts a partir de `start`, dando la vuelta al pool
    pub hosts: Vec<String>,
    /// Índice en el pool del primer host reservado
    pub start: usize,
    /// Offset guardado tras la reserva
    pub next_offset: usize,
}

#[derive(Debug)]
enum Backing {
    Memory(Mutex<HostRotationState>),
    /// Archivo JSON más un `.lock` hermano con lock exclusivo de archivo
    File(PathBuf),
}

/// Estado de rotación de hosts compartido por todos los despachos.
///
/// Cada read-modify-write del offset es una sección crítica. En memoria la
/// protege un mutex; con archivo, un lock exclusivo sobre `<path>.lock`
/// tomado en cada reserva, así que varios procesos que comparten el mismo
/// archivo nunca reciben el mismo offset. El estado se relee bajo el lock y
/// se escribe (archivo temporal + rename) antes de soltarlo.
#[derive(Debug)]
pub struct HostRotation {
    backing: Backing,
}

impl HostRotation {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(HostRotationState::default())),
        }
    }

    /// Abre (o crea) el estado persistido en `path`. Un archivo ilegible es
    /// error acá y no en el primer despacho.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DispatchError> {
        let path = path.into();
        let (state, _) = locked_update(&path, |state| state)?;

        debug!(
            "estado de rotación cargado de {} (offset={})",
            path.display(),
            state.current_offset
        );

        Ok(Self {
            backing: Backing::File(path),
        })
    }

    pub async fn current_offset(&self) -> Result<usize, DispatchError> {
        let (current, _) = self.update(|state| state).await?;
        Ok(current.current_offset)
    }

    /// Reserva `count` hosts para un despacho.
    ///
    /// Los hosts arrancan en el offset guardado y dan la vuelta al pool; el
    /// offset nuevo es `(offset + count) % len`. Un offset fuera de rango se
    /// normaliza a 0.
    pub async fn acquire_hosts(
        &self,
        pool: &WorkerPool,
        count: usize,
    ) -> Result<HostReservation, DispatchError> {
        let n = pool.len();
        let (previous, next) = self
            .update(move |state| HostRotationState {
                current_offset: (normalize(state.current_offset, n) + count) % n,
            })
            .await?;

        let start = normalize(previous.current_offset, n);
        if start != previous.current_offset {
            warn!(
                "offset {} fuera del pool {} (tamaño {}), se reinicia a 0",
                previous.current_offset,
                pool.name(),
                n
            );
        }

        let hosts = (0..count).map(|i| pool.host(start + i).to_string()).collect();
        debug!(
            "pool {}: offset {} -> {} ({} hosts reservados)",
            pool.name(),
            start,
            next.current_offset,
            count
        );
        Ok(HostReservation {
            hosts,
            start,
            next_offset: next.current_offset,
        })
    }

    pub async fn reset(&self) -> Result<(), DispatchError> {
        self.update(|_| HostRotationState::default()).await?;
        Ok(())
    }

    /// Aplica `f` dentro de la sección crítica y devuelve (anterior, nuevo).
    /// Con archivo, el lock y la E/S van en un hilo bloqueante.
    async fn update<F>(&self, f: F) -> Result<(HostRotationState, HostRotationState), DispatchError>
    where
        F: FnOnce(HostRotationState) -> HostRotationState + Send + 'static,
    {
        match &self.backing {
            Backing::Memory(state) => {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                let previous = *state;
                *state = f(previous);
                Ok((previous, *state))
            }
            Backing::File(path) => {
                let path = path.clone();
                let res = tokio::task::spawn_blocking(move || locked_update(&path, f))
                    .await
                    .map_err(io::Error::other)??;
                Ok(res)
            }
        }
    }
}

fn normalize(offset: usize, n: usize) -> usize {
    if offset >= n {
        0
    } else {
        offset
    }
}

/// Read-modify-write del archivo bajo el lock exclusivo de `<path>.lock`.
/// El lock se suelta al cerrar el archivo de lock.
fn locked_update<F>(path: &Path, f: F) -> io::Result<(HostRotationState, HostRotationState)>
where
    F: FnOnce(HostRotationState) -> HostRotationState,
{
    let lock = lock_file(path)?;
    let previous = read_state(path)?;
    let next = f(previous);
    if next != previous || !path.exists() {
        write_state(path, &next)?;
    }
    drop(lock);
    Ok((previous, next))
}

fn lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(sibling(path, ".lock"))?;
    lock.lock_exclusive()?;
    Ok(lock)
}

fn read_state(path: &Path) -> io::Result<HostRotationState> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("estado de rotación ilegible en {}: {e}", path.display()),
            )
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HostRotationState::default()),
        Err(e) => Err(e),
    }
}

fn write_state(path: &Path, state: &HostRotationState) -> io::Result<()> {
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, serde_json::to_vec(state)?)?;
    fs::rename(&tmp, path)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

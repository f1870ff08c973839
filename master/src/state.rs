// master/src/state.rs

use common::{DynamicInfo, RunId, SweepInfo, SweepResults};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::client::HttpWorkerClient;
use crate::dispatcher::Dispatcher;

/// Estado compartido del servicio. El master es el único dueño del estado de
/// rotación y del cursor del pool dinámico: todo despacho pasa por acá.
pub struct AppState<C = HttpWorkerClient> {
    pub dispatcher: Arc<Dispatcher<C>>,
    pub sweeps: Arc<Mutex<HashMap<RunId, SweepInfo>>>,
    // resultados consolidados de barridos terminados
    pub sweep_results: Arc<Mutex<HashMap<RunId, SweepResults>>>,
    pub dynamic: Arc<Mutex<HashMap<RunId, DynamicInfo>>>,
    pub poll_interval: Duration,
}

// derive(Clone) exigiría C: Clone
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            sweeps: self.sweeps.clone(),
            sweep_results: self.sweep_results.clone(),
            dynamic: self.dynamic.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<C> AppState<C> {
    pub fn new(dispatcher: Dispatcher<C>, poll_interval: Duration) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sweeps: Arc::new(Mutex::new(HashMap::new())),
            sweep_results: Arc::new(Mutex::new(HashMap::new())),
            dynamic: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
        }
    }
}

/// Un handler que paniquea con el lock tomado no debe tumbar al resto.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

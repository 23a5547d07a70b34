pub mod game;
pub mod kiosk;
pub mod slots;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::machine_store::MachineStore,
    dto::ids::MachineId,
    error::ServiceError,
    services::host_service::HostHandle,
    transport::{ChannelHub, Transport},
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the channel hub, running hosts and the record store.
pub struct AppState {
    config: Arc<AppConfig>,
    hub: Arc<ChannelHub>,
    hosts: DashMap<MachineId, HostHandle>,
    machine_store: RwLock<Option<Arc<dyn MachineStore>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            hub: Arc::new(ChannelHub::default()),
            hosts: DashMap::new(),
            machine_store: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// In-process hub backing every machine topic.
    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    /// The hub seen through the transport abstraction.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.hub.clone()
    }

    /// Registry of running kiosk hosts keyed by machine.
    pub fn hosts(&self) -> &DashMap<MachineId, HostHandle> {
        &self.hosts
    }

    /// Look up the host running on `machine`.
    pub fn host(&self, machine: &MachineId) -> Result<HostHandle, ServiceError> {
        self.hosts
            .get(machine)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no host running on machine `{machine}`"))
            })
    }

    /// Obtain a handle to the current machine store, if one is installed.
    pub async fn machine_store(&self) -> Option<Arc<dyn MachineStore>> {
        let guard = self.machine_store.read().await;
        guard.as_ref().cloned()
    }

    /// Machine store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_machine_store(&self) -> Result<Arc<dyn MachineStore>, ServiceError> {
        self.machine_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new machine store implementation and leave degraded mode.
    pub async fn set_machine_store(&self, store: Arc<dyn MachineStore>) {
        {
            let mut guard = self.machine_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

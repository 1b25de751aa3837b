use std::sync::Arc;

use shared::{
    domain::{Item, ItemId, NewItem},
    error::{StoreError, ValidationError},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::backend::{StoreBackend, StoreEvent, Subscription};

#[derive(Debug, Error)]
pub enum ListError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no active backend selected")]
    NoActiveBackend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    /// The projection changed; the payload is its full new contents.
    ItemsChanged(Vec<Item>),
    /// The live stream dropped. The projection stays frozen at the last
    /// delivered state until the backend is activated again.
    SyncLost { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No backend activated.
    Idle,
    /// Subscription healthy; the projection tracks the store.
    Live,
    /// Stream lost; the projection may be behind the store.
    Stale,
}

struct ActiveBackend {
    backend: Arc<dyn StoreBackend>,
    pump: Option<JoinHandle<()>>,
}

struct ControllerState {
    active: Option<ActiveBackend>,
    items: Vec<Item>,
    status: SyncStatus,
    // Bumped on every activation; a snapshot may only land while the
    // generation it was subscribed under is still current.
    generation: u64,
}

/// Owns the derived item projection and at most one active backend.
///
/// Every mutation goes to the backend first; the projection changes only
/// through delivered snapshots (pushed or re-listed), never optimistically,
/// and a failed operation leaves it untouched.
pub struct ListController {
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ListEvent>,
}

impl ListController {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            inner: Mutex::new(ControllerState {
                active: None,
                items: Vec::new(),
                status: SyncStatus::Idle,
                generation: 0,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    pub async fn items(&self) -> Vec<Item> {
        self.inner.lock().await.items.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        self.inner.lock().await.status
    }

    /// Makes `backend` the active store. The previous subscription is torn
    /// down first and the projection cleared, so the two streams never
    /// overlap and nothing from the old store survives the switch. The new
    /// store's state arrives through its initial snapshot.
    pub async fn activate(
        self: &Arc<Self>,
        backend: Arc<dyn StoreBackend>,
    ) -> Result<(), ListError> {
        let generation = {
            let mut state = self.inner.lock().await;
            state.generation += 1;
            if let Some(mut previous) = state.active.take() {
                if let Some(pump) = previous.pump.take() {
                    pump.abort();
                }
            }
            state.items.clear();
            state.status = SyncStatus::Idle;
            state.generation
        };
        let _ = self.events.send(ListEvent::ItemsChanged(Vec::new()));

        let mut subscription = backend.subscribe().await?;
        // Initial sync completes before activation returns; anything later
        // is pumped in the background. Without this, a write racing the
        // activation could be overwritten by the older initial snapshot.
        let initial = subscription.recv().await;

        {
            let mut state = self.inner.lock().await;
            if state.generation != generation {
                // A later activation superseded this one while it
                // subscribed.
                return Ok(());
            }
            state.active = Some(ActiveBackend {
                backend,
                pump: None,
            });
            state.status = SyncStatus::Live;
        }

        match initial {
            Some(StoreEvent::Snapshot(items)) => {
                self.apply_snapshot(generation, items).await;
            }
            Some(StoreEvent::ConnectionLost { reason }) => {
                self.mark_stale(generation, reason).await;
                return Ok(());
            }
            None => {
                self.mark_stale(generation, "stream ended before initial sync".to_string())
                    .await;
                return Ok(());
            }
        }

        let pump = tokio::spawn(Arc::clone(self).pump_events(subscription, generation));
        let mut state = self.inner.lock().await;
        if state.generation == generation {
            if let Some(active) = state.active.as_mut() {
                active.pump = Some(pump);
            }
        } else {
            pump.abort();
        }
        debug!(generation, "backend activated");
        Ok(())
    }

    /// Tears down and re-subscribes the current backend. This is the
    /// recovery path for a stale stream.
    pub async fn reactivate(self: &Arc<Self>) -> Result<(), ListError> {
        let backend = self.active_backend().await?;
        self.activate(backend).await
    }

    pub async fn add_item(&self, title: &str, quantity: &str) -> Result<Item, ListError> {
        let input = NewItem::parse(title, quantity)?;
        let backend = self.active_backend().await?;
        let created = backend.create(&input).await?;
        info!(id = %created.id, "item added");
        if !backend.pushes_updates() {
            self.refresh().await?;
        }
        Ok(created)
    }

    pub async fn remove_item(&self, id: &ItemId) -> Result<(), ListError> {
        let backend = self.active_backend().await?;
        backend.delete(id).await?;
        info!(%id, "item removed");
        if !backend.pushes_updates() {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Re-reads the active store into the projection. Also the user-driven
    /// catch-up while a remote stream is down.
    pub async fn refresh(&self) -> Result<(), ListError> {
        let (backend, generation) = {
            let state = self.inner.lock().await;
            let backend = state
                .active
                .as_ref()
                .map(|active| Arc::clone(&active.backend))
                .ok_or(ListError::NoActiveBackend)?;
            (backend, state.generation)
        };
        let items = backend.list().await?;
        self.apply_snapshot(generation, items).await;
        Ok(())
    }

    async fn active_backend(&self) -> Result<Arc<dyn StoreBackend>, ListError> {
        let state = self.inner.lock().await;
        state
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.backend))
            .ok_or(ListError::NoActiveBackend)
    }

    async fn pump_events(self: Arc<Self>, mut subscription: Subscription, generation: u64) {
        // A store without a change feed closes its stream after the initial
        // snapshot; the loop simply ends then. Connection loss is always
        // signalled explicitly.
        while let Some(event) = subscription.recv().await {
            match event {
                StoreEvent::Snapshot(items) => {
                    if !self.apply_snapshot(generation, items).await {
                        break;
                    }
                }
                StoreEvent::ConnectionLost { reason } => {
                    self.mark_stale(generation, reason).await;
                    break;
                }
            }
        }
    }

    async fn mark_stale(&self, generation: u64, reason: String) {
        {
            let mut state = self.inner.lock().await;
            if state.generation != generation {
                return;
            }
            state.status = SyncStatus::Stale;
        }
        warn!(%reason, "live sync lost");
        let _ = self.events.send(ListEvent::SyncLost { reason });
    }

    /// Replaces the projection if `generation` is still current. Returns
    /// false when a newer activation owns the projection, in which case the
    /// snapshot is discarded.
    async fn apply_snapshot(&self, generation: u64, items: Vec<Item>) -> bool {
        let mut state = self.inner.lock().await;
        if state.generation != generation {
            return false;
        }
        if state.items == items {
            return true;
        }
        state.items = items.clone();
        drop(state);
        let _ = self.events.send(ListEvent::ItemsChanged(items));
        true
    }
}

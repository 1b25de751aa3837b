use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{Item, ItemId, NewItem},
    error::StoreError,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Events a store delivers through an active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Full replacement of the set, never a diff.
    Snapshot(Vec<Item>),
    /// The stream is gone and anything delivered before may be stale.
    /// Terminal for this subscription.
    ConnectionLost { reason: String },
}

/// Live feed of store changes. Delivers the current full set at least once
/// promptly after creation. Dropping it cancels the producer at once;
/// nothing arrives afterwards, including notifications already in flight.
pub struct Subscription {
    events: mpsc::Receiver<StoreEvent>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        events: mpsc::Receiver<StoreEvent>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, producer }
    }

    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Contract every persistence strategy presents to the list layer. The
/// consumer never learns which implementation is behind the handle.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Persists a validated entry and returns it with its assigned id. For
    /// a replicated store this resolves on acknowledgment; the projection
    /// still changes only through the subscription stream.
    async fn create(&self, input: &NewItem) -> Result<Item, StoreError>;

    /// Point-in-time full set, newest first. May be stale relative to a
    /// concurrent subscription.
    async fn list(&self) -> Result<Vec<Item>, StoreError>;

    /// Removes the entry if present; deleting an unknown id succeeds.
    async fn delete(&self, id: &ItemId) -> Result<(), StoreError>;

    async fn subscribe(&self) -> Result<Subscription, StoreError>;

    /// Whether the subscription stream carries changes on its own, this
    /// client's writes included. When false the owner must re-`list` after
    /// each of its own writes.
    fn pushes_updates(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!(
                "unknown backend '{other}', expected 'local' or 'remote'"
            )),
        }
    }
}

/// Both configured stores, selected by kind. Selection hands out a handle
/// to one of them; it never copies data between the two.
pub struct BackendSet {
    local: Arc<dyn StoreBackend>,
    remote: Arc<dyn StoreBackend>,
}

impl BackendSet {
    pub fn new(local: Arc<dyn StoreBackend>, remote: Arc<dyn StoreBackend>) -> Self {
        Self { local, remote }
    }

    pub fn select(&self, kind: BackendKind) -> Arc<dyn StoreBackend> {
        match kind {
            BackendKind::Local => Arc::clone(&self.local),
            BackendKind::Remote => Arc::clone(&self.remote),
        }
    }
}

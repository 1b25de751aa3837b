use async_trait::async_trait;
use shared::{
    domain::{Item, ItemId, NewItem},
    error::StoreError,
};
use storage::{Storage, StoredItem};
use tokio::sync::mpsc;

use crate::backend::{StoreBackend, StoreEvent, Subscription};

/// Embedded store. Immediately consistent: a write is durable when its call
/// returns, and the next read sees it. The stream never pushes changes, so
/// the owner re-lists after each of its own writes.
pub struct LocalBackend {
    storage: Storage,
}

impl LocalBackend {
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let storage = Storage::new(database_url)
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(Self { storage })
    }

    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

fn item_from_stored(stored: StoredItem) -> Item {
    Item {
        id: ItemId::from(stored.id),
        title: stored.title,
        quantity: stored.quantity,
    }
}

#[async_trait]
impl StoreBackend for LocalBackend {
    async fn create(&self, input: &NewItem) -> Result<Item, StoreError> {
        let stored = self
            .storage
            .insert_item(input.title(), input.quantity())
            .await
            .map_err(|e| StoreError::write_rejected(e.to_string()))?;
        Ok(item_from_stored(stored))
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        let items = self
            .storage
            .list_items()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(items.into_iter().map(item_from_stored).collect())
    }

    async fn delete(&self, id: &ItemId) -> Result<(), StoreError> {
        // An id from the other key space never parses to a row id; deleting
        // it is the same no-op as deleting an already removed entry.
        let Ok(row_id) = id.as_str().parse::<i64>() else {
            return Ok(());
        };
        self.storage
            .delete_item(row_id)
            .await
            .map_err(|e| StoreError::write_rejected(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        // One synthesized snapshot; the embedded store has no change feed.
        let items = self.list().await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(StoreEvent::Snapshot(items));
        Ok(Subscription::new(rx, None))
    }

    fn pushes_updates(&self) -> bool {
        false
    }
}

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Map, Value};
use shared::{
    domain::{Item, ItemId, NewItem},
    error::{ApiError, StoreError},
    protocol::{CreateEntryResponse, EntryPayload, SyncEvent},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::backend::{StoreBackend, StoreEvent, Subscription};

/// Replicated store shared by every client on the same list path. Writes
/// are requests acknowledged by the server; observed state comes from the
/// push stream, which re-delivers the entire set on every change.
pub struct RemoteBackend {
    http: Client,
    server_url: String,
    path: String,
}

impl RemoteBackend {
    pub fn new(server_url: &str, path: &str) -> Result<Self, StoreError> {
        let base = Url::parse(server_url)
            .map_err(|e| StoreError::unavailable(format!("invalid server url '{server_url}': {e}")))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(StoreError::unavailable(
                "server url must start with http:// or https://",
            ));
        }
        Ok(Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
        })
    }

    fn entries_url(&self) -> String {
        format!("{}/lists/{}/entries", self.server_url, self.path)
    }
}

/// Decodes a raw entry map into items, newest key first. A malformed entry
/// is dropped on its own; its siblings still make it into the result. The
/// order is recomputed here on every call, never carried over from an
/// earlier snapshot.
pub(crate) fn items_from_entries(entries: &Map<String, Value>) -> Vec<Item> {
    let mut items: Vec<Item> = entries
        .iter()
        .filter_map(|(key, value)| {
            let item = item_from_entry(key, value);
            if item.is_none() {
                warn!(%key, "skipping malformed list entry");
            }
            item
        })
        .collect();
    items.sort_by(|a, b| b.id.0.cmp(&a.id.0));
    items
}

fn item_from_entry(key: &str, value: &Value) -> Option<Item> {
    let title = value.get("title")?.as_str()?.trim();
    let quantity = value.get("quantity")?.as_str()?.trim();
    if title.is_empty() || quantity.is_empty() {
        return None;
    }
    Some(Item {
        id: ItemId::from(key),
        title: title.to_string(),
        quantity: quantity.to_string(),
    })
}

async fn rejection_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(api) => api.message,
        Err(_) => format!("server returned {status}"),
    }
}

fn ws_url(server_url: &str, path: &str) -> Result<String, StoreError> {
    let ws_base = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(StoreError::unavailable(
            "server url must start with http:// or https://",
        ));
    };
    Ok(format!("{ws_base}/ws?path={path}"))
}

#[async_trait]
impl StoreBackend for RemoteBackend {
    async fn create(&self, input: &NewItem) -> Result<Item, StoreError> {
        let response = self
            .http
            .post(self.entries_url())
            .json(&EntryPayload {
                title: input.title().to_string(),
                quantity: input.quantity().to_string(),
            })
            .send()
            .await
            .map_err(|e| StoreError::write_rejected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::write_rejected(rejection_message(response).await));
        }
        let body: CreateEntryResponse = response
            .json()
            .await
            .map_err(|e| StoreError::write_rejected(e.to_string()))?;
        debug!(key = %body.key, "create acknowledged");
        Ok(Item {
            id: ItemId(body.key),
            title: input.title().to_string(),
            quantity: input.quantity().to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        let entries: Map<String, Value> = self
            .http
            .get(self.entries_url())
            .send()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| StoreError::unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(items_from_entries(&entries))
    }

    async fn delete(&self, id: &ItemId) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.entries_url(), id))
            .send()
            .await
            .map_err(|e| StoreError::write_rejected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::write_rejected(rejection_message(response).await));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let ws_url = ws_url(&self.server_url, &self.path)?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| StoreError::unavailable(format!("failed to connect websocket {ws_url}: {e}")))?;
        let (_, mut ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(16);
        let path = self.path.clone();
        let reader = tokio::spawn(async move {
            loop {
                match ws_reader.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SyncEvent>(&text) {
                            Ok(SyncEvent::SnapshotChanged { snapshot }) => {
                                if snapshot.path != path {
                                    continue;
                                }
                                let items = items_from_entries(&snapshot.entries);
                                if tx.send(StoreEvent::Snapshot(items)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(%err, "ignoring unparseable sync frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = tx
                            .send(StoreEvent::ConnectionLost {
                                reason: "connection closed by server".to_string(),
                            })
                            .await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = tx
                            .send(StoreEvent::ConnectionLost {
                                reason: err.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, Some(reader)))
    }

    fn pushes_updates(&self) -> bool {
        true
    }
}

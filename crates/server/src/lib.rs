use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{CreateEntryResponse, EntryPayload, ListSnapshot, SyncEvent},
};
use tokio::sync::{broadcast, RwLock};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

pub mod config;
mod keys;

pub struct AppState {
    lists: RwLock<HashMap<String, BTreeMap<String, EntryPayload>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl AppState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            lists: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    async fn snapshot(&self, path: &str) -> ListSnapshot {
        let lists = self.lists.read().await;
        snapshot_of(path, lists.get(path))
    }

    async fn insert_entry(&self, path: &str, payload: EntryPayload) -> String {
        let mut lists = self.lists.write().await;
        let entries = lists.entry(path.to_string()).or_default();
        let key = keys::push_key();
        entries.insert(key.clone(), payload);
        let snapshot = snapshot_of(path, Some(entries));
        drop(lists);
        let _ = self.events.send(SyncEvent::SnapshotChanged { snapshot });
        key
    }

    async fn remove_entry(&self, path: &str, key: &str) -> bool {
        let mut lists = self.lists.write().await;
        let removed = lists
            .get_mut(path)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            let snapshot = snapshot_of(path, lists.get(path));
            drop(lists);
            let _ = self.events.send(SyncEvent::SnapshotChanged { snapshot });
        }
        removed
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(path: &str, entries: Option<&BTreeMap<String, EntryPayload>>) -> ListSnapshot {
    let mut map = Map::new();
    if let Some(entries) = entries {
        for (key, payload) in entries {
            if let Ok(value) = serde_json::to_value(payload) {
                map.insert(key.clone(), value);
            }
        }
    }
    ListSnapshot {
        path: path.to_string(),
        entries: map,
    }
}

pub fn build_router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/lists/:path/entries", get(list_entries).post(create_entry))
        .route("/lists/:path/entries/:key", delete(delete_entry))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_entries(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Json<Map<String, Value>> {
    Json(state.snapshot(&path).await.entries)
}

async fn create_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(req): Json<EntryPayload>,
) -> Result<Json<CreateEntryResponse>, (StatusCode, Json<ApiError>)> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "title must not be empty",
            )),
        ));
    }
    let quantity = req.quantity.trim();
    if quantity.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "quantity must not be empty",
            )),
        ));
    }

    let key = state
        .insert_entry(
            &path,
            EntryPayload {
                title: title.to_string(),
                quantity: quantity.to_string(),
            },
        )
        .await;
    info!(%path, %key, "entry created");
    Ok(Json(CreateEntryResponse { key }))
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path((path, key)): Path<(String, String)>,
) -> StatusCode {
    if state.remove_entry(&path, &key).await {
        info!(%path, %key, "entry removed");
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    path: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, q.path))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket, path: String) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the initial snapshot so a write landing in
    // between is not missed.
    let mut events_rx = state.events.subscribe();
    let initial = state.snapshot(&path).await;

    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        let mut pending = Some(SyncEvent::SnapshotChanged { snapshot: initial });
        loop {
            let event = match pending.take() {
                Some(event) => event,
                None => match events_rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Every frame is a full replacement, so skipped
                        // intermediates are harmless; resend current state.
                        warn!(%path, skipped, "subscriber lagged, resending snapshot");
                        SyncEvent::SnapshotChanged {
                            snapshot: send_state.snapshot(&path).await,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let SyncEvent::SnapshotChanged { snapshot } = &event;
            if snapshot.path != path {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

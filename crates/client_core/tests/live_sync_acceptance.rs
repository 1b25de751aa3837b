//! End-to-end checks that drive the remote backend against a real sync
//! server over HTTP and websockets.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use client_core::{
    ListController, ListEvent, LocalBackend, RemoteBackend, StoreBackend, SyncStatus,
};
use serde::Deserialize;
use serde_json::Map;
use server::{build_router, AppState};
use shared::{
    domain::NewItem,
    protocol::{ListSnapshot, SyncEvent},
};
use tokio::{net::TcpListener, sync::broadcast, time::timeout};

async fn spawn_sync_server() -> String {
    let state = Arc::new(AppState::new());
    spawn_app(build_router(state, 16 * 1024)).await
}

async fn spawn_app(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

async fn next_event(rx: &mut broadcast::Receiver<ListEvent>) -> ListEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timely event")
        .expect("event channel open")
}

async fn wait_for_titles(rx: &mut broadcast::Receiver<ListEvent>, expected: &[&str]) {
    loop {
        if let ListEvent::ItemsChanged(items) = next_event(rx).await {
            let titles: Vec<&str> = items.iter().map(|item| item.title.as_str()).collect();
            if titles == expected {
                return;
            }
        }
    }
}

#[tokio::test]
async fn initial_sync_delivers_preexisting_items_newest_first() {
    let url = spawn_sync_server().await;
    let writer = RemoteBackend::new(&url, "groceries").expect("backend");
    writer
        .create(&NewItem::parse("Milk", "2 l").expect("input"))
        .await
        .expect("create milk");
    writer
        .create(&NewItem::parse("Bread", "1 loaf").expect("input"))
        .await
        .expect("create bread");

    let controller = ListController::new();
    controller
        .activate(Arc::new(
            RemoteBackend::new(&url, "groceries").expect("backend"),
        ))
        .await
        .expect("activate");

    let titles: Vec<String> = controller
        .items()
        .await
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(titles, ["Bread", "Milk"]);
    assert_eq!(controller.status().await, SyncStatus::Live);
}

#[tokio::test]
async fn remote_writes_propagate_to_other_subscribers() {
    let url = spawn_sync_server().await;

    let writer = ListController::new();
    writer
        .activate(Arc::new(
            RemoteBackend::new(&url, "family").expect("backend"),
        ))
        .await
        .expect("activate writer");

    let watcher = ListController::new();
    let mut watcher_events = watcher.subscribe_events();
    watcher
        .activate(Arc::new(
            RemoteBackend::new(&url, "family").expect("backend"),
        ))
        .await
        .expect("activate watcher");

    let milk = writer.add_item("Milk", "2 l").await.expect("add");
    wait_for_titles(&mut watcher_events, &["Milk"]).await;

    writer.remove_item(&milk.id).await.expect("remove");
    wait_for_titles(&mut watcher_events, &[]).await;

    // Removing the same entry again is acknowledged and changes nothing.
    writer.remove_item(&milk.id).await.expect("second remove");
    assert!(watcher.items().await.is_empty());
}

#[tokio::test]
async fn backend_switch_shows_only_the_active_stores_items() {
    let url = spawn_sync_server().await;
    let local: Arc<dyn StoreBackend> =
        Arc::new(LocalBackend::open("sqlite::memory:").await.expect("open"));
    let remote: Arc<dyn StoreBackend> =
        Arc::new(RemoteBackend::new(&url, "trips").expect("backend"));

    let controller = ListController::new();
    let mut events = controller.subscribe_events();

    controller
        .activate(local.clone())
        .await
        .expect("activate local");
    controller.add_item("Hammer", "1").await.expect("add local");
    let titles: Vec<String> = controller
        .items()
        .await
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(titles, ["Hammer"]);

    controller
        .activate(remote.clone())
        .await
        .expect("activate remote");
    assert!(controller.items().await.is_empty());

    controller.add_item("Milk", "2 l").await.expect("add remote");
    wait_for_titles(&mut events, &["Milk"]).await;

    controller.activate(local).await.expect("back to local");
    let titles: Vec<String> = controller
        .items()
        .await
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(titles, ["Hammer"]);

    controller.activate(remote).await.expect("back to remote");
    let titles: Vec<String> = controller
        .items()
        .await
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(titles, ["Milk"]);
}

#[derive(Deserialize)]
struct WsQuery {
    path: String,
}

async fn snapshot_then_drop(Query(query): Query<WsQuery>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| deliver_and_drop(socket, query.path))
}

async fn deliver_and_drop(mut socket: WebSocket, path: String) {
    let event = SyncEvent::SnapshotChanged {
        snapshot: ListSnapshot {
            path,
            entries: Map::new(),
        },
    };
    if let Ok(frame) = serde_json::to_string(&event) {
        let _ = socket.send(Message::Text(frame)).await;
    }
    // Returning drops the socket, which closes the connection.
}

#[tokio::test]
async fn losing_the_push_stream_marks_the_list_stale() {
    let app = Router::new().route("/ws", get(snapshot_then_drop));
    let url = spawn_app(app).await;

    let controller = ListController::new();
    let mut events = controller.subscribe_events();
    controller
        .activate(Arc::new(
            RemoteBackend::new(&url, "groceries").expect("backend"),
        ))
        .await
        .expect("activate");

    let reason = loop {
        if let ListEvent::SyncLost { reason } = next_event(&mut events).await {
            break reason;
        }
    };
    assert!(!reason.is_empty());
    assert_eq!(controller.status().await, SyncStatus::Stale);
}

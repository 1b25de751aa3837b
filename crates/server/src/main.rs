use std::{net::SocketAddr, sync::Arc};

use server::{build_router, config::load_settings, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = Arc::new(AppState::new());
    let app = build_router(state, settings.body_limit_bytes);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "sync server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

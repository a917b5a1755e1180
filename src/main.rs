use std::net::SocketAddr;
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::server::{build_router, AppState};
use chat_relay::upstream::HttpInvoker;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = env_path("CHAT_RELAY_DATA_DIR", "data");
    let backup_dir = env_path("CHAT_RELAY_BACKUP_DIR", "backup");
    let port = std::env::var("CHAT_RELAY_PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(8000);

    std::fs::create_dir_all(&data_dir).unwrap();
    tracing::info!(data_dir = %data_dir.display(), backup_dir = %backup_dir.display(), "starting");

    let state = AppState::new(data_dir, backup_dir, HttpInvoker::new());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

use axum::{Extension, Router, routing::get};
use content_repository::config::RepositoryConfig;
use content_repository::repository::ContentRepository;
use content_repository::repository::handlers::{
    handle_get_resource, handle_health, handle_search, handle_stats, handle_suggest,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut bind_addr: Option<SocketAddr> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--help" => {
                eprintln!("Usage: {} [--config <path>] [--bind <addr:port>]", args[0]);
                eprintln!("Example: {} --config repository.toml --bind 127.0.0.1:8080", args[0]);
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = RepositoryConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_max_level(config.observability.level())
        .init();

    let bind_addr = match bind_addr {
        Some(addr) => addr,
        None => config.http.bind_address().parse()?,
    };

    tracing::info!("Starting content repository for site {}", config.site.site);

    // 1. Repository (in-memory store and index):
    let repository = Arc::new(ContentRepository::in_memory(&config));
    repository.connect().await?;

    // 2. HTTP Router:
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/resource/:identifier", get(handle_get_resource))
        .route("/search", get(handle_search))
        .route("/suggest", get(handle_suggest))
        .layer(Extension(repository.clone()));

    // 3. Spawn stale index resync:
    let resync_repository = repository.clone();
    let resync_interval = Duration::from_secs(config.index.resync_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(resync_interval);

        loop {
            interval.tick().await;
            let queued = resync_repository.resync_stale();
            if queued > 0 {
                tracing::info!("Queued {} stale index entries for resync", queued);
            }
        }
    });

    // 4. Spawn stats reporter:
    let stats_repository = repository.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            match stats_repository.stats().await {
                Ok(stats) => tracing::info!(
                    "Repository stats: {} resources, {} revisions, {} locks, {} pending, index healthy={}",
                    stats.resources,
                    stats.revisions,
                    stats.locks,
                    stats.pending_operations,
                    stats.index.healthy
                ),
                Err(e) => tracing::warn!("Failed to collect repository stats: {}", e),
            }
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use instabuy::auth::FacebookAuth;
use instabuy::blobs::FsBlobStore;
use instabuy::config::{Cli, Config};
use instabuy::db;
use instabuy::routes;
use instabuy::search::SqliteSearchIndex;
use instabuy::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let state = AppState {
        db: pool.clone(),
        config: config.clone(),
        auth: Arc::new(FacebookAuth::new(config.auth.facebook_graph_url.clone())),
        blobs: Arc::new(FsBlobStore::new(config.blobs_path())?),
        search: Arc::new(SqliteSearchIndex::new(pool)),
    };

    let app = routes::build(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

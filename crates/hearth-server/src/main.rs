use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use hearth_db::Database;
use hearth_server::{Gateway, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hearth_server=debug,hearth_api=debug,hearth_gateway=debug,hearth_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&config.db_path, config.storage_key)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    let gateway = Gateway::new(Arc::new(db), config.handshake_key);

    let addr = config.addr()?;
    info!("Hearth server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, hearth_server::app(gateway)).await?;

    Ok(())
}

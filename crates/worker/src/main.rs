//! Worker binary: claims pending executions and runs them.

mod dispatcher;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawjud_storage::S3Store;

use crate::dispatcher::Dispatcher;
use crate::registry::PortalRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawjud_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = crawjud_db::connect(&database_url).await?;
    let storage = Arc::new(S3Store::from_env().await?);

    let worker_name = std::env::var("WORKER_NAME").unwrap_or_else(|_| {
        hostname().unwrap_or_else(|| "crawjud-worker".to_string())
    });
    let work_dir = std::env::var("WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("crawjud"));

    // Portal implementations register themselves here; an empty
    // registry still runs, failing claims it cannot serve.
    let registry = Arc::new(PortalRegistry::new());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_token.cancel();
        }
    });

    Dispatcher::new(pool, storage, registry, worker_name, work_dir)
        .run(shutdown)
        .await;

    Ok(())
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME").ok()
}

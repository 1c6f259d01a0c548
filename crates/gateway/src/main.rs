//! Dispatch gateway server binary.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawjud_gateway::notify::{EmailConfig, Notifier};
use crawjud_gateway::{AppState, DbCredentialStore};
use crawjud_storage::S3Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawjud_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = crawjud_db::connect(&database_url).await?;
    let storage = Arc::new(S3Store::from_env().await?);

    let notifier = EmailConfig::from_env().map(|config| Arc::new(Notifier::new(config)));
    if notifier.is_none() {
        tracing::warn!("SMTP_HOST not set, notification emails disabled");
    }

    let state = AppState {
        pool: pool.clone(),
        storage,
        credentials: Arc::new(DbCredentialStore::new(pool)),
        notifier,
        log_ws_url: std::env::var("LOG_WS_URL").ok(),
    };

    let addr = std::env::var("GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, crawjud_gateway::router(state)).await?;
    Ok(())
}

//! Shared state for gateway handlers.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crawjud_storage::ObjectStore;

use crate::error::GatewayError;
use crate::notify::Notifier;

/// License validation seam. The production implementation checks the
/// licenses table; tests substitute an in-memory double.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verify the license token may launch bots for `system`.
    async fn authorize(&self, license_token: &str, system: &str) -> Result<(), GatewayError>;
}

/// Postgres-backed license check.
pub struct DbCredentialStore {
    pool: PgPool,
}

impl DbCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn authorize(&self, license_token: &str, system: &str) -> Result<(), GatewayError> {
        let valid: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM licenses WHERE token = $1 AND $2 = ANY(systems) AND active",
        )
        .bind(license_token)
        .bind(system)
        .fetch_optional(&self.pool)
        .await?;

        if valid.is_some() {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized(
                "Licença inválida para o sistema solicitado".into(),
            ))
        }
    }
}

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub storage: Arc<dyn ObjectStore>,
    pub credentials: Arc<dyn CredentialStore>,
    /// `None` when SMTP is not configured; emails are skipped.
    pub notifier: Option<Arc<Notifier>>,
    /// Log server WebSocket URL for stop requests.
    pub log_ws_url: Option<String>,
}

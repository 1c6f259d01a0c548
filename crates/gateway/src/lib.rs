//! Dispatch gateway.
//!
//! Two outward-facing routes: launch a bot (upload the input bundle,
//! register the execution, hand the task to the worker queue) and stop
//! a running bot (emit `stopbot` to its log room). Notification emails
//! are fire-and-forget and never fail a request.

pub mod error;
pub mod handlers;
pub mod notify;
pub mod state;

pub use error::{GatewayError, GatewayResult};
pub use state::{AppState, CredentialStore, DbCredentialStore};

use axum::routing::post;
use axum::Router;

/// Gateway routes.
///
/// ```text
/// POST /bot/launch       -> handlers::launch
/// POST /bot/{pid}/stop   -> handlers::stop
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bot/launch", post(handlers::launch))
        .route("/bot/{pid}/stop", post(handlers::stop))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

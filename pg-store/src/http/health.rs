//! `/health`: liveness plus a snapshot of the key table.

use crate::server::StoreServer;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the process is answering.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
    /// Open client connections.
    pub connections: usize,
    /// Keys currently stored.
    pub keys: usize,
    /// Sum of all stored value sizes.
    pub value_bytes: usize,
    /// Seconds since the server was created.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Snapshot `server` as it is right now.
    pub fn of(server: &StoreServer) -> Self {
        let table = server.table();
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            connections: server.active_connections(),
            keys: table.len(),
            value_bytes: table.total_value_bytes(),
            uptime_seconds: server.uptime().as_secs(),
        }
    }
}

/// `GET /health`
pub async fn health_handler(Extension(server): Extension<Arc<StoreServer>>) -> Json<HealthStatus> {
    Json(HealthStatus::of(&server))
}

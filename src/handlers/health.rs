use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
    timestamp: String,
}

/// Liveness plus a database ping.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1",
        ))
        .await
    {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Json(HealthResponse {
        status: if db_status == "up" { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: db_status,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

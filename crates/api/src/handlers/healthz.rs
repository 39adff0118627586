//! `GET /healthz` — liveness plus a shallow metadata-database ping, replacing the
//! teacher's separate `/health`/`/ready` pair with the one endpoint spec.md §6 names.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let metadata_healthy = match sqlx::query("SELECT 1").execute(&state.metadata_pool).await {
        Ok(_) => true,
        Err(e) => {
            error!("metadata database health check failed: {}", e);
            false
        }
    };

    let status = if metadata_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if metadata_healthy { "healthy" } else { "degraded" },
            "service": "gateway-api",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": { "metadata_db": metadata_healthy },
        })),
    )
}

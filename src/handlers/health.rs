use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Create the health router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

/// Simple up/down status; always up while the process serves requests.
pub async fn health() -> impl IntoResponse {
    Json(HealthInfo {
        status: HealthStatus::Up,
        timestamp: Utc::now().to_rfc3339(),
        message: None,
    })
}

/// Liveness: the process is alive.
pub async fn liveness() -> impl IntoResponse {
    Json(HealthInfo {
        status: HealthStatus::Up,
        timestamp: Utc::now().to_rfc3339(),
        message: None,
    })
}

/// Readiness: the system can accept traffic, i.e. the database responds.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match crate::db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthInfo {
                status: HealthStatus::Up,
                timestamp: Utc::now().to_rfc3339(),
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthInfo {
                status: HealthStatus::Down,
                timestamp: Utc::now().to_rfc3339(),
                message: Some(format!("database unreachable: {}", e)),
            }),
        ),
    }
}

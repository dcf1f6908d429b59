use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::ServiceError;
use crate::services::issues::DirectIssueRequest;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct IssueRecordListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

/// Create the direct-issue router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_issue_records).post(create_issue_record))
}

#[utoipa::path(
    post,
    path = "/api/v1/issues",
    request_body = DirectIssueRequest,
    responses(
        (status = 201, description = "Direct issue recorded; stock decremented through the ledger"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "issues"
)]
pub async fn create_issue_record(
    State(state): State<AppState>,
    Json(payload): Json<DirectIssueRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state.services.issues.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues",
    params(IssueRecordListQuery),
    responses((status = 200, description = "Issue records returned")),
    tag = "issues"
)]
pub async fn list_issue_records(
    State(state): State<AppState>,
    Query(query): Query<IssueRecordListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let list = state
        .services
        .issues
        .list(query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

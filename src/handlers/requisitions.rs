use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::entities::requisition::RequisitionStatus;
use crate::errors::ServiceError;
use crate::services::requisitions::{
    ApproveRequest, ConfirmRequest, FinalReceiptRequest, HandoverRequest, IssueRequest,
    RejectRequest, RequisitionFilter, SubmitRequisitionRequest,
};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RequisitionListQuery {
    pub status: Option<String>,
    pub requested_by: Option<String>,
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

/// Create the requisition router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_requisition).get(list_requisitions))
        .route("/:id", get(get_requisition))
        .route("/:id/confirm", post(confirm_requisition))
        .route("/:id/approve", post(approve_requisition))
        .route("/:id/reject", post(reject_requisition))
        .route("/:id/issue", post(issue_requisition))
        .route("/:id/handover", post(confirm_handover))
        .route("/:id/receipt", post(confirm_final_receipt))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions",
    request_body = SubmitRequisitionRequest,
    responses(
        (status = 201, description = "Requisition submitted"),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown department", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn submit_requisition(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequisitionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state.services.requisitions.submit(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(requisition))))
}

#[utoipa::path(
    get,
    path = "/api/v1/requisitions",
    params(RequisitionListQuery),
    responses(
        (status = 200, description = "Requisition list returned"),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn list_requisitions(
    State(state): State<AppState>,
    Query(query): Query<RequisitionListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            RequisitionStatus::from_str(raw).map_err(|_| {
                ServiceError::ValidationFailed(format!("Unknown requisition status '{}'", raw))
            })
        })
        .transpose()?;

    let filter = RequisitionFilter {
        status,
        requested_by: query.requested_by,
        page: query.page,
        per_page: query.per_page,
    };
    let list = state.services.requisitions.list(filter).await?;
    Ok(Json(ApiResponse::success(list)))
}

#[utoipa::path(
    get,
    path = "/api/v1/requisitions/{id}",
    params(("id" = Uuid, Path, description = "Requisition id")),
    responses(
        (status = 200, description = "Requisition returned"),
        (status = 404, description = "Requisition not found", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn get_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state.services.requisitions.get(id).await?;
    Ok(Json(ApiResponse::success(requisition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/confirm",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Requisition confirmed"),
        (status = 409, description = "Wrong status for confirmation", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn confirm_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state.services.requisitions.confirm(id, payload).await?;
    Ok(Json(ApiResponse::success(requisition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/approve",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Requisition approved"),
        (status = 409, description = "Wrong status for approval", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn approve_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state.services.requisitions.approve(id, payload).await?;
    Ok(Json(ApiResponse::success(requisition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/reject",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Requisition rejected"),
        (status = 409, description = "Wrong status for rejection", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn reject_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state.services.requisitions.reject(id, payload).await?;
    Ok(Json(ApiResponse::success(requisition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/issue",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = IssueRequest,
    responses(
        (status = 200, description = "Requisition issued; response lists any shortages"),
        (status = 409, description = "Wrong status for issuance", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn issue_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<IssueRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.requisitions.issue(id, payload).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/handover",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = HandoverRequest,
    responses(
        (status = 200, description = "Handover confirmed"),
        (status = 409, description = "Wrong status for handover", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn confirm_handover(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HandoverRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state
        .services
        .requisitions
        .confirm_handover(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(requisition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/requisitions/{id}/receipt",
    params(("id" = Uuid, Path, description = "Requisition id")),
    request_body = FinalReceiptRequest,
    responses(
        (status = 200, description = "Final receipt confirmed"),
        (status = 409, description = "Wrong status for final receipt", body = crate::errors::ErrorResponse)
    ),
    tag = "requisitions"
)]
pub async fn confirm_final_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FinalReceiptRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let requisition = state
        .services
        .requisitions
        .confirm_final_receipt(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(requisition)))
}

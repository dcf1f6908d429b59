use axum::{
    extract::State, response::IntoResponse, routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::stock::StockDelta;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    /// Signed: negative issues stock, positive receives it. Zero is a no-op
    /// and rejected.
    pub delta: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct BulkAdjustStockRequest {
    #[validate(length(min = 1, message = "At least one adjustment is required"))]
    pub adjustments: Vec<AdjustmentLine>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdjustmentLine {
    pub product_id: Uuid,
    pub delta: i32,
}

/// Create the stock router. Every quantity change in the system enters
/// through these ledger endpoints; there is no field-patch path.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/adjust", post(adjust_stock))
        .route("/bulk-adjust", post(bulk_adjust_stock))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Delta applied; response carries new quantity and any shortage"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(payload): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    if payload.delta == 0 {
        return Err(ServiceError::ValidationFailed(
            "Stock delta must be non-zero".to_string(),
        ));
    }
    let outcome = state
        .services
        .stock
        .apply_delta(payload.product_id, payload.delta)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock/bulk-adjust",
    request_body = BulkAdjustStockRequest,
    responses(
        (status = 200, description = "All deltas applied atomically"),
        (status = 400, description = "Unknown product in batch; nothing applied", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn bulk_adjust_stock(
    State(state): State<AppState>,
    Json(payload): Json<BulkAdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let deltas: Vec<StockDelta> = payload
        .adjustments
        .iter()
        .map(|line| StockDelta {
            product_id: line.product_id,
            delta: line.delta,
        })
        .collect();
    let outcomes = state.services.stock.apply_batch(&deltas).await?;
    Ok(Json(ApiResponse::success(outcomes)))
}

use super::common::{map_service_error, success_response, validate_input};
use crate::{errors::ApiError, handlers::AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinanceDecisionRequest {
    pub approved: bool,
    #[validate(length(min = 1, max = 100))]
    pub decided_by: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = i32, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "purchase"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .purchase
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Compares outstanding materials against store stock
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/check-stock",
    params(("id" = i32, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Availability report with shortages"),
        (status = 409, description = "Purchase order not checkable", body = crate::errors::ErrorResponse),
    ),
    tag = "purchase"
)]
pub async fn check_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .purchase
        .check_stock(id)
        .await
        .map_err(map_service_error)?;

    info!(
        purchase_order_id = id,
        all_available = result.all_available,
        shortages = result.shortages.len(),
        "Stock checked"
    );
    Ok(success_response(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/finance-approval",
    params(("id" = i32, Path, description = "Purchase order id")),
    request_body = FinanceDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded"),
        (status = 409, description = "Not awaiting finance", body = crate::errors::ErrorResponse),
    ),
    tag = "purchase"
)]
pub async fn decide_finance(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<FinanceDecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .purchase
        .decide_finance(id, payload.approved, payload.decided_by)
        .await
        .map_err(map_service_error)?;

    info!(purchase_order_id = id, approved = payload.approved, "Finance decision recorded");
    Ok(success_response(order))
}

/// Store verification: buys what finance approved and allocates everything to the batch
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/verify",
    params(("id" = i32, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Materials allocated"),
        (status = 409, description = "Not approved yet", body = crate::errors::ErrorResponse),
        (status = 422, description = "Store short of stock", body = crate::errors::ErrorResponse),
    ),
    tag = "purchase"
)]
pub async fn verify_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .purchase
        .verify_and_allocate(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}

pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_purchase_order))
        .route("/:id/check-stock", post(check_stock))
        .route("/:id/finance-approval", post(decide_finance))
        .route("/:id/verify", post(verify_purchase_order))
}

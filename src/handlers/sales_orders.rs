use super::common::{
    created_response, map_service_error, success_response, validate_input, DecisionRequest,
    PaginatedResponse, ReasonRequest,
};
use crate::{
    entities::sales_order::OrderStatus,
    errors::ApiError,
    handlers::AppState,
    services::{
        dispatch::DispatchInput,
        sales::{NewSalesOrder, PricingUpdate},
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize)]
pub struct SalesOrderFilters {
    pub status: Option<OrderStatus>,
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

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("positive_amount"));
    }
    Ok(())
}

fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative_amount"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    #[validate(custom = "positive_amount")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: String,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: String,
    #[validate(custom = "non_negative_amount")]
    pub discount_amount: Decimal,
    #[validate(length(max = 100))]
    pub requested_by: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FreeDeliveryRequest {
    #[validate(length(max = 100))]
    pub requested_by: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Sells units from a showroom batch
#[utoipa::path(
    post,
    path = "/api/v1/sales-orders",
    request_body = NewSalesOrder,
    responses(
        (status = 201, description = "Sales order created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough units left in the batch", body = crate::errors::ErrorResponse),
    ),
    tag = "sales"
)]
pub async fn create_sales_order(
    State(state): State<AppState>,
    Json(payload): Json<NewSalesOrder>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let created = state
        .services
        .sales
        .create(payload)
        .await
        .map_err(map_service_error)?;

    info!(
        sales_order_id = created.sales_order.id,
        order_number = %created.sales_order.order_number,
        "Sales order created"
    );
    Ok(created_response(created))
}

pub async fn list_sales_orders(
    State(state): State<AppState>,
    Query(filters): Query<SalesOrderFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let page = filters.page.max(1);
    let per_page = filters.per_page.clamp(1, 100);
    let (orders, total) = state
        .services
        .sales
        .list(filters.status, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales-orders/{id}",
    params(("id" = i32, Path, description = "Sales order id")),
    responses(
        (status = 200, description = "Sales order with payments and open requests"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "sales"
)]
pub async fn get_sales_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .sales
        .get_details(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales-orders/{id}/payments",
    params(("id" = i32, Path, description = "Sales order id")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded"),
        (status = 400, description = "Invalid payment", body = crate::errors::ErrorResponse),
    ),
    tag = "sales"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let transaction = state
        .services
        .sales
        .record_payment(id, payload.amount, payload.payment_method, payload.reference)
        .await
        .map_err(map_service_error)?;

    info!(sales_order_id = id, amount = %transaction.amount, "Payment recorded");
    Ok(created_response(transaction))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = state
        .services
        .sales
        .list_payments(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(payments))
}

/// Finance review of a payment held for approval
pub async fn review_payment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<PaymentApprovalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .sales
        .review_payment(id, payload.approved)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales-orders/{id}/pricing",
    params(("id" = i32, Path, description = "Sales order id")),
    request_body = PricingUpdate,
    responses(
        (status = 200, description = "Order repriced"),
        (status = 400, description = "Discount exceeds subtotal", body = crate::errors::ErrorResponse),
    ),
    tag = "sales"
)]
pub async fn update_pricing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<PricingUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .sales
        .update_pricing(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .sales
        .apply_coupon(
            id,
            payload.coupon_code,
            payload.discount_amount,
            payload.requested_by,
        )
        .await
        .map_err(map_service_error)?;
    Ok(created_response(outcome))
}

pub async fn request_free_delivery(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<FreeDeliveryRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    validate_input(&payload)?;
    let outcome = state
        .services
        .sales
        .request_free_delivery(id, payload.requested_by, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(outcome))
}

pub async fn cancel_sales_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    validate_input(&payload)?;
    let order = state
        .services
        .sales
        .cancel(id, payload.reason)
        .await
        .map_err(map_service_error)?;

    info!(sales_order_id = id, "Sales order cancelled");
    Ok(success_response(order))
}

/// Hands a confirmed order to dispatch
#[utoipa::path(
    post,
    path = "/api/v1/sales-orders/{id}/dispatch",
    params(("id" = i32, Path, description = "Sales order id")),
    request_body = DispatchInput,
    responses(
        (status = 201, description = "Dispatch request created"),
        (status = 409, description = "Order not ready for dispatch", body = crate::errors::ErrorResponse),
    ),
    tag = "dispatch"
)]
pub async fn send_to_dispatch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<DispatchInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let outcome = state
        .services
        .dispatch
        .send(id, payload)
        .await
        .map_err(map_service_error)?;

    info!(
        sales_order_id = id,
        dispatch_request_id = outcome.dispatch_request.id,
        "Order sent to dispatch"
    );
    Ok(created_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/approval-requests/{id}/decision",
    params(("id" = i32, Path, description = "Approval request id")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision applied to the order"),
        (status = 409, description = "Request already decided", body = crate::errors::ErrorResponse),
    ),
    tag = "sales"
)]
pub async fn decide_approval_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .sales
        .decide_approval(id, payload.approved, payload.decided_by, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

pub fn sales_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_sales_order).get(list_sales_orders))
        .route("/:id", get(get_sales_order))
        .route("/:id/payments", post(record_payment).get(list_payments))
        .route("/:id/payments/approval", post(review_payment))
        .route("/:id/pricing", post(update_pricing))
        .route("/:id/coupon", post(apply_coupon))
        .route("/:id/free-delivery", post(request_free_delivery))
        .route("/:id/cancel", post(cancel_sales_order))
        .route("/:id/dispatch", post(send_to_dispatch))
}

pub fn approval_request_routes() -> Router<AppState> {
    Router::new().route("/:id/decision", post(decide_approval_request))
}

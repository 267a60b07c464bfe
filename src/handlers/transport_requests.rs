use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{errors::ApiError, handlers::AppState, services::transport::DemandAction};
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

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    pub sales_order_id: i32,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequestFilters {
    /// Restrict to one order's negotiation history; pending requests otherwise
    pub sales_order_id: Option<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveTransportRequest {
    #[validate(length(max = 100))]
    pub approved_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectTransportRequest {
    /// What transport is prepared to charge instead
    #[validate(custom = "non_negative")]
    pub demand_amount: Decimal,
    #[validate(length(max = 100))]
    pub rejected_by: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDemandRequest {
    pub action: DemandAction,
    #[validate(length(max = 100))]
    pub confirmed_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateRequest {
    #[validate(custom = "non_negative")]
    pub negotiated_amount: Decimal,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/transport-requests",
    request_body = CreateTransportRequest,
    responses(
        (status = 201, description = "Negotiation opened"),
        (status = 200, description = "A pending request already existed"),
        (status = 400, description = "Order delivery type needs no transport approval", body = crate::errors::ErrorResponse),
    ),
    tag = "transport"
)]
pub async fn create_transport_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (request, created) = state
        .services
        .transport
        .create_request(payload.sales_order_id)
        .await
        .map_err(map_service_error)?;

    if created {
        info!(
            transport_request_id = request.id,
            sales_order_id = payload.sales_order_id,
            "Transport request opened"
        );
        Ok(created_response(request))
    } else {
        Ok(success_response(request))
    }
}

pub async fn list_transport_requests(
    State(state): State<AppState>,
    Query(filters): Query<TransportRequestFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = match filters.sales_order_id {
        Some(sales_order_id) => state.services.transport.list_for_order(sales_order_id).await,
        None => state.services.transport.list_pending().await,
    }
    .map_err(map_service_error)?;
    Ok(success_response(requests))
}

pub async fn get_transport_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .services
        .transport
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

#[utoipa::path(
    post,
    path = "/api/v1/transport-requests/{id}/approve",
    params(("id" = i32, Path, description = "Transport request id")),
    request_body = ApproveTransportRequest,
    responses(
        (status = 200, description = "Cost accepted; order confirmed"),
        (status = 409, description = "Request no longer pending", body = crate::errors::ErrorResponse),
    ),
    tag = "transport"
)]
pub async fn approve_transport_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<ApproveTransportRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    validate_input(&payload)?;
    let outcome = state
        .services
        .transport
        .approve(id, payload.approved_by)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/transport-requests/{id}/reject",
    params(("id" = i32, Path, description = "Transport request id")),
    request_body = RejectTransportRequest,
    responses(
        (status = 200, description = "Counter-demand recorded"),
        (status = 409, description = "Request no longer pending", body = crate::errors::ErrorResponse),
    ),
    tag = "transport"
)]
pub async fn reject_transport_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RejectTransportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .transport
        .reject(id, payload.demand_amount, payload.rejected_by, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

/// Sales answers a transport demand: accept the amount or switch the order to self delivery
#[utoipa::path(
    post,
    path = "/api/v1/transport-requests/{id}/confirm-demand",
    params(("id" = i32, Path, description = "Transport request id")),
    request_body = ConfirmDemandRequest,
    responses(
        (status = 200, description = "Demand answered; order repriced"),
        (status = 409, description = "No open demand on this request", body = crate::errors::ErrorResponse),
    ),
    tag = "transport"
)]
pub async fn confirm_demand(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ConfirmDemandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .transport
        .confirm_demand(id, payload.action, payload.confirmed_by)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/transport-requests/{id}/renegotiate",
    params(("id" = i32, Path, description = "Transport request id")),
    request_body = RenegotiateRequest,
    responses(
        (status = 201, description = "New negotiation round opened"),
        (status = 409, description = "Another request is pending", body = crate::errors::ErrorResponse),
    ),
    tag = "transport"
)]
pub async fn renegotiate(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RenegotiateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .transport
        .renegotiate(id, payload.negotiated_amount, payload.notes)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(outcome))
}

pub fn transport_request_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(create_transport_request).get(list_transport_requests),
        )
        .route("/:id", get(get_transport_request))
        .route("/:id/approve", post(approve_transport_request))
        .route("/:id/reject", post(reject_transport_request))
        .route("/:id/confirm-demand", post(confirm_demand))
        .route("/:id/renegotiate", post(renegotiate))
}

use super::common::{map_service_error, success_response, validate_input};
use crate::{
    entities::dispatch_request::DispatchStatus,
    errors::ApiError,
    handlers::AppState,
    services::dispatch::{GateOutcome, GateVerification, ProcessInput},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct DispatchFilters {
    pub status: Option<DispatchStatus>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetailsRequest {
    #[validate(length(min = 1, max = 50))]
    pub party_contact: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub party_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagerOverrideRequest {
    #[validate(length(min = 1, max = 100))]
    pub manager: String,
}

pub async fn list_dispatch_requests(
    State(state): State<AppState>,
    Query(filters): Query<DispatchFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state
        .services
        .dispatch
        .list(filters.status)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(requests))
}

pub async fn get_dispatch_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .services
        .dispatch
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

#[utoipa::path(
    post,
    path = "/api/v1/dispatch-requests/{id}/customer-details",
    params(("id" = i32, Path, description = "Dispatch request id")),
    request_body = CustomerDetailsRequest,
    responses(
        (status = 200, description = "Details recorded"),
        (status = 409, description = "Dispatch already processed", body = crate::errors::ErrorResponse),
    ),
    tag = "dispatch"
)]
pub async fn update_customer_details(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CustomerDetailsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let request = state
        .services
        .dispatch
        .update_customer_details(id, payload.party_contact, payload.party_address)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

#[utoipa::path(
    post,
    path = "/api/v1/dispatch-requests/{id}/process",
    params(("id" = i32, Path, description = "Dispatch request id")),
    request_body = ProcessInput,
    responses(
        (status = 200, description = "Dispatch processed"),
        (status = 400, description = "Customer details missing", body = crate::errors::ErrorResponse),
        (status = 409, description = "Vehicle not available", body = crate::errors::ErrorResponse),
    ),
    tag = "dispatch"
)]
pub async fn process_dispatch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<ProcessInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let outcome = state
        .services
        .dispatch
        .process(id, payload)
        .await
        .map_err(map_service_error)?;

    info!(
        dispatch_request_id = id,
        status = ?outcome.dispatch_request.status,
        "Dispatch processed"
    );
    Ok(success_response(outcome))
}

pub async fn mark_loaded(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .services
        .dispatch
        .mark_loaded(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(request))
}

pub async fn get_gate_pass(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let pass = state
        .services
        .dispatch
        .get_gate_pass(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(pass))
}

/// Gate desk action on a self-pickup pass. An identity mismatch is reported in the body,
/// not as an error, so the desk can ask for a manager override.
#[utoipa::path(
    post,
    path = "/api/v1/gate-passes/{id}/verify",
    params(("id" = i32, Path, description = "Gate pass id")),
    request_body = GateVerification,
    responses(
        (status = 200, description = "Gate outcome"),
        (status = 409, description = "Pass already released or rejected", body = crate::errors::ErrorResponse),
    ),
    tag = "gate"
)]
pub async fn verify_gate_pass(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<GateVerification>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .dispatch
        .verify_gate_pass(id, payload)
        .await
        .map_err(map_service_error)?;

    if let GateOutcome::IdentityMismatch { presented_name, .. } = &outcome {
        warn!(gate_pass_id = id, presented = %presented_name, "Gate identity mismatch");
    }
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/gate-passes/{id}/override",
    params(("id" = i32, Path, description = "Gate pass id")),
    request_body = ManagerOverrideRequest,
    responses(
        (status = 200, description = "Released on manager authority"),
        (status = 409, description = "Pass not awaiting override", body = crate::errors::ErrorResponse),
    ),
    tag = "gate"
)]
pub async fn manager_override(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ManagerOverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .dispatch
        .manager_override_release(id, payload.manager)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

pub fn dispatch_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_dispatch_requests))
        .route("/:id", get(get_dispatch_request))
        .route("/:id/customer-details", post(update_customer_details))
        .route("/:id/process", post(process_dispatch))
        .route("/:id/loaded", post(mark_loaded))
}

pub fn gate_pass_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_gate_pass))
        .route("/:id/verify", post(verify_gate_pass))
        .route("/:id/override", post(manager_override))
}

use super::common::{
    created_response, map_service_error, success_response, validate_input, ReasonRequest,
};
use crate::{
    entities::vehicle::VehicleStatus, errors::ApiError, handlers::AppState,
    services::transport_jobs::NewVehicle,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct VehicleFilters {
    pub status: Option<VehicleStatus>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct FailJobRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/vehicles",
    request_body = NewVehicle,
    responses(
        (status = 201, description = "Vehicle registered"),
        (status = 409, description = "Registration already on file", body = crate::errors::ErrorResponse),
    ),
    tag = "fleet"
)]
pub async fn register_vehicle(
    State(state): State<AppState>,
    Json(payload): Json<NewVehicle>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let vehicle = state
        .services
        .transport_jobs
        .register_vehicle(payload)
        .await
        .map_err(map_service_error)?;

    info!(vehicle_id = vehicle.id, registration = %vehicle.registration_number, "Vehicle registered");
    Ok(created_response(vehicle))
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    Query(filters): Query<VehicleFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let vehicles = state
        .services
        .transport_jobs
        .list_vehicles(filters.status)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vehicles))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let vehicle = state
        .services
        .transport_jobs
        .get_vehicle(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vehicle))
}

/// Driver is back; the vehicle returns to the available pool
#[utoipa::path(
    post,
    path = "/api/v1/vehicles/{id}/reached",
    params(("id" = i32, Path, description = "Vehicle id")),
    responses(
        (status = 200, description = "Vehicle available again"),
        (status = 409, description = "Vehicle is not returning", body = crate::errors::ErrorResponse),
    ),
    tag = "fleet"
)]
pub async fn driver_reached(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let vehicle = state
        .services
        .transport_jobs
        .driver_reached(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vehicle))
}

pub async fn get_transport_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .services
        .transport_jobs
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(job))
}

#[utoipa::path(
    post,
    path = "/api/v1/transport-jobs/{id}/start",
    params(("id" = i32, Path, description = "Transport job id")),
    responses(
        (status = 200, description = "Job in transit"),
        (status = 409, description = "Job or dispatch not ready", body = crate::errors::ErrorResponse),
    ),
    tag = "fleet"
)]
pub async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .services
        .transport_jobs
        .start(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(job))
}

pub async fn deliver_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .services
        .transport_jobs
        .deliver(id)
        .await
        .map_err(map_service_error)?;

    info!(transport_job_id = id, sales_order_id = job.sales_order_id, "Delivery completed");
    Ok(success_response(job))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    validate_input(&payload)?;
    let job = state
        .services
        .transport_jobs
        .cancel(id, payload.reason)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(job))
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<FailJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let job = state
        .services
        .transport_jobs
        .fail(id, payload.reason)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(job))
}

pub fn vehicle_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(register_vehicle).get(list_vehicles))
        .route("/:id", get(get_vehicle))
        .route("/:id/reached", post(driver_reached))
}

pub fn transport_job_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_transport_job))
        .route("/:id/start", post(start_job))
        .route("/:id/deliver", post(deliver_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/fail", post(fail_job))
}

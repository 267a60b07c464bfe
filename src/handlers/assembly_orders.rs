use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    entities::assembly_order::QualityTest, errors::ApiError, handlers::AppState,
    services::assembly::ShowroomPromotion,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProgressRequest {
    #[validate(range(min = 0, max = 100))]
    pub progress: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToShowroomRequest {
    #[validate(custom = "tests_named")]
    pub tests: Vec<QualityTest>,
    pub sale_price: Option<Decimal>,
}

fn tests_named(tests: &[QualityTest]) -> Result<(), ValidationError> {
    if tests.iter().any(|t| t.name.trim().is_empty()) {
        return Err(ValidationError::new("test_name_required"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly-orders/{id}",
    params(("id" = i32, Path, description = "Assembly order id")),
    responses(
        (status = 200, description = "Assembly order"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn get_assembly_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .assembly
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly-orders/{id}/progress",
    params(("id" = i32, Path, description = "Assembly order id")),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "Progress recorded"),
        (status = 409, description = "Materials not allocated or batch frozen", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .assembly
        .update_progress(id, payload.progress)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

pub async fn pause_assembly(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .assembly
        .pause(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

pub async fn resume_assembly(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .assembly
        .resume(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Runs the quality gate; a passing batch is created in the showroom (201), a failing one
/// comes back flagged for rework (200)
#[utoipa::path(
    post,
    path = "/api/v1/assembly-orders/{id}/showroom",
    params(("id" = i32, Path, description = "Assembly order id")),
    request_body = AddToShowroomRequest,
    responses(
        (status = 201, description = "Batch placed in the showroom"),
        (status = 200, description = "Quality tests failed; rework required"),
        (status = 409, description = "Assembly not completed", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn add_to_showroom(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<AddToShowroomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .assembly
        .add_to_showroom(id, payload.tests, payload.sale_price)
        .await
        .map_err(map_service_error)?;

    match outcome {
        ShowroomPromotion::Promoted(promoted) => {
            info!(
                assembly_order_id = id,
                showroom_product_id = promoted.showroom_product.id,
                "Batch promoted to showroom"
            );
            Ok(created_response(promoted))
        }
        rework @ ShowroomPromotion::ReworkRequired(_) => Ok(success_response(rework)),
    }
}

pub fn assembly_order_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_assembly_order))
        .route("/:id/progress", post(update_progress))
        .route("/:id/pause", post(pause_assembly))
        .route("/:id/resume", post(resume_assembly))
        .route("/:id/showroom", post(add_to_showroom))
}

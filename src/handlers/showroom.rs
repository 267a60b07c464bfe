use super::common::{map_service_error, success_response};
use crate::{errors::ApiError, handlers::AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};

/// Batches on display with their sellable quantity
#[utoipa::path(
    get,
    path = "/api/v1/showroom",
    responses((status = 200, description = "Available showroom batches")),
    tag = "showroom"
)]
pub async fn list_showroom(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .showroom
        .list_available()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

#[utoipa::path(
    get,
    path = "/api/v1/showroom/{id}",
    params(("id" = i32, Path, description = "Showroom product id")),
    responses(
        (status = 200, description = "Showroom batch"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "showroom"
)]
pub async fn get_showroom_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .showroom
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

pub fn showroom_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_showroom))
        .route("/:id", get(get_showroom_product))
}

use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{errors::ApiError, handlers::AppState};
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

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct InventoryFilters {
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryItemRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub quantity: i32,
    #[validate(length(max = 100))]
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(max = 100))]
    pub category: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(InventoryFilters),
    responses((status = 200, description = "Store inventory")),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(filters): Query<InventoryFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .services
        .inventory
        .list_items(filters.category.as_deref())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(items))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    request_body = CreateInventoryItemRequest,
    responses(
        (status = 201, description = "Material registered"),
        (status = 409, description = "Material already exists", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn create_inventory_item(
    State(state): State<AppState>,
    Json(payload): Json<CreateInventoryItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .inventory
        .create_item(&payload.name, payload.quantity, payload.category)
        .await
        .map_err(map_service_error)?;

    info!(material = %item.name, quantity = item.quantity, "Inventory item created");
    Ok(created_response(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/{name}",
    params(("name" = String, Path, description = "Material name")),
    responses(
        (status = 200, description = "Inventory item"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn get_inventory_item(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .inventory
        .get_item(&name)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

/// Receives stock into the store, creating the row if needed
pub async fn add_stock(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<StockQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .inventory
        .add_stock(&name, payload.quantity, payload.category)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

/// Takes stock out of the store; fails without touching the row when short
pub async fn allocate_stock(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<StockQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .inventory
        .allocate_stock(&name, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_inventory).post(create_inventory_item))
        .route("/:name", get(get_inventory_item))
        .route("/:name/add", post(add_stock))
        .route("/:name/allocate", post(allocate_stock))
}

use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    entities::purchase_order::MaterialLine, errors::ApiError, handlers::AppState,
    services::production::NewProductionOrder,
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

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductionOrderRequest {
    #[validate(length(min = 1, max = 255))]
    pub product_name: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate]
    pub materials: Vec<MaterialRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub unit_cost: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

impl From<CreateProductionOrderRequest> for NewProductionOrder {
    fn from(req: CreateProductionOrderRequest) -> Self {
        Self {
            product_name: req.product_name,
            category: req.category,
            quantity: req.quantity,
            materials: req
                .materials
                .into_iter()
                .map(|m| MaterialLine {
                    name: m.name,
                    quantity: m.quantity,
                    unit_cost: m.unit_cost,
                })
                .collect(),
        }
    }
}

/// Creates a production order together with its purchase and assembly orders
#[utoipa::path(
    post,
    path = "/api/v1/production-orders",
    request_body = CreateProductionOrderRequest,
    responses(
        (status = 201, description = "Production order created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    tag = "production"
)]
pub async fn create_production_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductionOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let bundle = state
        .services
        .production
        .create(payload.into())
        .await
        .map_err(map_service_error)?;

    info!(
        production_order_id = bundle.production_order.id,
        "Production order created"
    );
    Ok(created_response(bundle))
}

#[utoipa::path(
    get,
    path = "/api/v1/production-orders",
    params(PaginationParams),
    responses((status = 200, description = "Production orders with derived status")),
    tag = "production"
)]
pub async fn list_production_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let per_page = params.limit();
    let page = params.page.max(1);
    let (orders, total) = state
        .services
        .production
        .list(page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/production-orders/{id}",
    params(("id" = i32, Path, description = "Production order id")),
    responses(
        (status = 200, description = "Production order with children"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "production"
)]
pub async fn get_production_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .production
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

#[utoipa::path(
    post,
    path = "/api/v1/production-orders/{id}/cancel",
    params(("id" = i32, Path, description = "Production order id")),
    responses(
        (status = 200, description = "Production order cancelled"),
        (status = 409, description = "Batch already past assembly", body = crate::errors::ErrorResponse),
    ),
    tag = "production"
)]
pub async fn cancel_production_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .production
        .cancel(id)
        .await
        .map_err(map_service_error)?;

    info!(production_order_id = id, "Production order cancelled");
    Ok(success_response(view))
}

pub async fn update_production_quantity(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let view = state
        .services
        .production
        .update_quantity(id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(view))
}

pub fn production_order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(create_production_order).get(list_production_orders),
        )
        .route("/:id", get(get_production_order))
        .route("/:id/cancel", post(cancel_production_order))
        .route("/:id/quantity", post(update_production_quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(quantity: i32, unit_cost: Decimal) -> CreateProductionOrderRequest {
        CreateProductionOrderRequest {
            product_name: "Oak Table".into(),
            category: "Tables".into(),
            quantity,
            materials: vec![MaterialRequest {
                name: "Oak Plank".into(),
                quantity: 4,
                unit_cost,
            }],
        }
    }

    #[test]
    fn rejects_zero_quantity_and_negative_cost() {
        assert!(request(0, dec!(10)).validate().is_err());
        assert!(request(2, dec!(-1)).validate().is_err());
        assert!(request(2, dec!(10)).validate().is_ok());
    }

    #[test]
    fn converts_materials_into_lines() {
        let input: NewProductionOrder = request(3, dec!(12.50)).into();
        assert_eq!(input.materials.len(), 1);
        assert_eq!(input.materials[0].unit_cost, dec!(12.50));
    }
}

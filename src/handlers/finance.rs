use super::common::{map_service_error, success_response};
use crate::{errors::ApiError, handlers::AppState};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct FinanceFilters {
    /// `sales_order` or `purchase_order`
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
}

/// Revenue, expense and reversal entries, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/finance-transactions",
    params(FinanceFilters),
    responses((status = 200, description = "Finance ledger entries")),
    tag = "finance"
)]
pub async fn list_finance_transactions(
    State(state): State<AppState>,
    Query(filters): Query<FinanceFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .services
        .sales
        .list_finance_transactions(filters.reference_type, filters.reference_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(entries))
}

pub fn finance_routes() -> Router<AppState> {
    Router::new().route("/", get(list_finance_transactions))
}

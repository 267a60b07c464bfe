use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Furniture ERP API",
        version = "0.1.0",
        description = r#"
# Furniture ERP API

Drives a furniture batch from the production floor to the customer:

- **Production**: production orders with derived status, purchase and assembly children
- **Store**: material stock checks, finance approval and allocation
- **Assembly**: progress tracking and the quality gate in front of the showroom
- **Sales**: showroom sales, payments, coupons and free delivery approvals
- **Transport**: cost negotiation between sales and the transport desk
- **Dispatch**: gate passes for self pickup, transport jobs for company delivery

## Error Handling

Errors share one body:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: only 2 units left in showroom batch 4",
  "request_id": "req-abc123xyz",
  "timestamp": "2026-10-19T10:30:00Z"
}
```
        "#
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "production", description = "Production orders"),
        (name = "purchase", description = "Material purchasing and allocation"),
        (name = "inventory", description = "Store inventory ledger"),
        (name = "assembly", description = "Assembly progress and quality gate"),
        (name = "showroom", description = "Showroom catalog"),
        (name = "sales", description = "Sales orders, payments and approvals"),
        (name = "transport", description = "Transport cost negotiation"),
        (name = "dispatch", description = "Dispatch requests"),
        (name = "gate", description = "Gate pass verification"),
        (name = "fleet", description = "Vehicles and transport jobs"),
        (name = "finance", description = "Finance ledger")
    ),
    paths(
        // Production
        crate::handlers::production_orders::create_production_order,
        crate::handlers::production_orders::list_production_orders,
        crate::handlers::production_orders::get_production_order,
        crate::handlers::production_orders::cancel_production_order,

        // Purchase
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::check_stock,
        crate::handlers::purchase_orders::decide_finance,
        crate::handlers::purchase_orders::verify_purchase_order,

        // Inventory
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::create_inventory_item,
        crate::handlers::inventory::get_inventory_item,

        // Assembly and showroom
        crate::handlers::assembly_orders::get_assembly_order,
        crate::handlers::assembly_orders::update_progress,
        crate::handlers::assembly_orders::add_to_showroom,
        crate::handlers::showroom::list_showroom,
        crate::handlers::showroom::get_showroom_product,

        // Sales
        crate::handlers::sales_orders::create_sales_order,
        crate::handlers::sales_orders::get_sales_order,
        crate::handlers::sales_orders::record_payment,
        crate::handlers::sales_orders::update_pricing,
        crate::handlers::sales_orders::send_to_dispatch,
        crate::handlers::sales_orders::decide_approval_request,

        // Transport negotiation
        crate::handlers::transport_requests::create_transport_request,
        crate::handlers::transport_requests::approve_transport_request,
        crate::handlers::transport_requests::reject_transport_request,
        crate::handlers::transport_requests::confirm_demand,
        crate::handlers::transport_requests::renegotiate,

        // Dispatch and gate
        crate::handlers::dispatch::update_customer_details,
        crate::handlers::dispatch::process_dispatch,
        crate::handlers::dispatch::verify_gate_pass,
        crate::handlers::dispatch::manager_override,

        // Fleet
        crate::handlers::fleet::register_vehicle,
        crate::handlers::fleet::driver_reached,
        crate::handlers::fleet::start_job,

        // Finance
        crate::handlers::finance::list_finance_transactions,
    ),
    components(
        schemas(
            crate::handlers::common::DecisionRequest,
            crate::handlers::common::ReasonRequest,
            crate::handlers::production_orders::CreateProductionOrderRequest,
            crate::handlers::production_orders::MaterialRequest,
            crate::handlers::production_orders::UpdateQuantityRequest,
            crate::handlers::purchase_orders::FinanceDecisionRequest,
            crate::handlers::inventory::CreateInventoryItemRequest,
            crate::handlers::inventory::StockQuantityRequest,
            crate::handlers::assembly_orders::ProgressRequest,
            crate::handlers::assembly_orders::AddToShowroomRequest,
            crate::entities::assembly_order::QualityTest,
            crate::services::sales::NewSalesOrder,
            crate::services::sales::PricingUpdate,
            crate::handlers::sales_orders::RecordPaymentRequest,
            crate::handlers::sales_orders::PaymentApprovalRequest,
            crate::handlers::sales_orders::CouponRequest,
            crate::handlers::sales_orders::FreeDeliveryRequest,
            crate::handlers::transport_requests::CreateTransportRequest,
            crate::handlers::transport_requests::ApproveTransportRequest,
            crate::handlers::transport_requests::RejectTransportRequest,
            crate::handlers::transport_requests::ConfirmDemandRequest,
            crate::handlers::transport_requests::RenegotiateRequest,
            crate::services::transport::DemandAction,
            crate::services::dispatch::DispatchInput,
            crate::services::dispatch::ProcessInput,
            crate::services::dispatch::GateVerification,
            crate::services::dispatch::GateAction,
            crate::handlers::dispatch::CustomerDetailsRequest,
            crate::handlers::dispatch::ManagerOverrideRequest,
            crate::services::transport_jobs::NewVehicle,
            crate::handlers::fleet::FailJobRequest,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document as JSON
pub async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_workflow_paths() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Furniture ERP API"));
        assert!(json.contains("/api/v1/sales-orders"));
        assert!(json.contains("/api/v1/gate-passes/{id}/verify"));
        assert!(json.contains("ErrorResponse"));
    }
}

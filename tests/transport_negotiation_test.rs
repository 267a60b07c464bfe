mod common;

use assert_matches::assert_matches;
use common::TestApp;
use furniture_erp_api::{
    entities::{
        sales_order::{DeliveryType, OrderStatus},
        transport_approval::TransportApprovalStatus,
    },
    errors::ServiceError,
    services::transport::DemandAction,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn company_sale(app: &TestApp, name: &str) -> (i32, i32) {
    let product = app.showroom_batch(name, 2, dec!(2000)).await;
    let created = app.sell(product.id, 1, "company delivery", dec!(600)).await;
    let request = created.transport_request.expect("transport request opened");
    assert_eq!(request.status, TransportApprovalStatus::Pending);
    assert_eq!(request.original_transport_cost, dec!(600));
    assert_eq!(request.negotiation_round, 0);
    (created.sales_order.id, request.id)
}

#[tokio::test]
async fn approval_confirms_the_quoted_cost() {
    let app = TestApp::new().await;
    let (order_id, request_id) = company_sale(&app, "Sheesham Dining Set").await;
    let transport = &app.services().transport;

    let (existing, created) = transport.create_request(order_id).await.unwrap();
    assert!(!created);
    assert_eq!(existing.id, request_id);
    assert_eq!(transport.list_pending().await.unwrap().len(), 1);

    let outcome = transport
        .approve(request_id, Some("transport desk".into()))
        .await
        .unwrap();
    assert_eq!(outcome.transport_request.status, TransportApprovalStatus::Approved);
    assert_eq!(outcome.sales_order.order_status, OrderStatus::Confirmed);
    assert_eq!(outcome.sales_order.transport_cost, dec!(600));
    assert_eq!(outcome.sales_order.final_amount, dec!(2600));

    assert_matches!(
        transport.approve(request_id, None).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert!(transport.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn accepted_demand_becomes_the_transport_cost() {
    let app = TestApp::new().await;
    let (order_id, request_id) = company_sale(&app, "Mahogany Bureau").await;
    let transport = &app.services().transport;

    assert_matches!(
        transport.reject(request_id, dec!(-5), None, None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        transport
            .confirm_demand(request_id, DemandAction::Accept, None)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );

    let rejected = transport
        .reject(request_id, dec!(900), Some("transport desk".into()), Some("long haul".into()))
        .await
        .unwrap();
    assert_eq!(rejected.transport_request.status, TransportApprovalStatus::Rejected);
    assert_eq!(rejected.transport_request.demand_amount, Some(dec!(900)));
    assert_eq!(rejected.sales_order.transport_cost, dec!(600));
    assert_eq!(
        rejected.sales_order.order_status,
        OrderStatus::PendingTransportApproval
    );

    let accepted = transport
        .confirm_demand(request_id, DemandAction::Accept, Some("sales desk".into()))
        .await
        .unwrap();
    assert_eq!(accepted.transport_request.status, TransportApprovalStatus::Approved);
    assert_eq!(accepted.sales_order.transport_cost, dec!(900));
    assert_eq!(accepted.sales_order.final_amount, dec!(2900));
    assert_eq!(accepted.sales_order.order_status, OrderStatus::Confirmed);

    let order = app.services().sales.get(order_id).await.unwrap();
    assert_eq!(order.transport_cost, dec!(900));
}

#[tokio::test]
async fn declined_demand_switches_to_self_pickup() {
    let app = TestApp::new().await;
    let (_, request_id) = company_sale(&app, "Steel Almirah").await;
    let transport = &app.services().transport;

    transport.reject(request_id, dec!(1200), None, None).await.unwrap();
    let declined = transport
        .confirm_demand(request_id, DemandAction::Decline, None)
        .await
        .unwrap();
    let order = declined.sales_order;
    assert_eq!(order.delivery_type, DeliveryType::SelfDelivery);
    assert_eq!(order.previous_delivery_type, Some(DeliveryType::CompanyDelivery));
    assert_eq!(order.transport_cost, Decimal::ZERO);
    assert_eq!(order.final_amount, dec!(2000));
    assert_eq!(order.order_status, OrderStatus::Confirmed);

    assert_matches!(
        transport
            .confirm_demand(request_id, DemandAction::Accept, None)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn counter_offer_reopens_the_request() {
    let app = TestApp::new().await;
    let (order_id, request_id) = company_sale(&app, "Corner Sofa").await;
    let transport = &app.services().transport;

    assert_matches!(
        transport.renegotiate(request_id, dec!(700), None).await,
        Err(ServiceError::InvalidStatus(_))
    );

    transport.reject(request_id, dec!(1000), None, None).await.unwrap();
    let countered = transport
        .renegotiate(request_id, dec!(750), Some("split the difference".into()))
        .await
        .unwrap();
    let request = countered.transport_request;
    assert_eq!(request.status, TransportApprovalStatus::Pending);
    assert_eq!(request.negotiation_round, 1);
    assert_eq!(request.original_transport_cost, dec!(750));
    assert!(request.demand_amount.is_none());
    assert_eq!(countered.sales_order.transport_cost, dec!(750));
    assert_eq!(
        countered.sales_order.order_status,
        OrderStatus::PendingTransportApproval
    );

    transport.reject(request_id, dec!(800), None, None).await.unwrap();
    let second = transport.renegotiate(request_id, dec!(780), None).await.unwrap();
    assert_eq!(second.transport_request.negotiation_round, 2);

    let approved = transport.approve(request_id, None).await.unwrap();
    assert_eq!(approved.sales_order.transport_cost, dec!(780));
    assert_eq!(approved.sales_order.final_amount, dec!(2780));

    let history = transport.list_for_order(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn self_delivery_orders_have_nothing_to_negotiate() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Study Chair", 1, dec!(900)).await;
    let order = app
        .sell(product.id, 1, "self delivery", Decimal::ZERO)
        .await
        .sales_order;

    assert_matches!(
        app.services().transport.create_request(order.id).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        app.services().transport.get(9999).await,
        Err(ServiceError::NotFound(_))
    );
}

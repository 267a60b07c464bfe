mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{new_sale, TestApp};
use furniture_erp_api::{
    entities::{
        approval_request::{ApprovalKind, ApprovalStatus},
        finance_transaction::FinanceKind,
        sales_order::{DeliveryType, OrderStatus, PaymentStatus},
        showroom_product::ShowroomStatus,
        transport_approval::TransportApprovalStatus,
    },
    errors::ServiceError,
    services::sales::PricingUpdate,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn self_delivery_sale_is_confirmed_immediately() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Oak Sofa", 3, dec!(1000)).await;

    let created = app
        .sell(product.id, 2, "self delivery", dec!(250))
        .await;
    let order = &created.sales_order;
    assert_eq!(order.order_status, OrderStatus::Confirmed);
    assert_eq!(order.delivery_type, DeliveryType::SelfDelivery);
    assert_eq!(order.transport_cost, Decimal::ZERO);
    assert_eq!(order.unit_price, dec!(1000));
    assert_eq!(order.final_amount, dec!(2000));
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(created.transport_request.is_none());
    assert!(!created.showroom_sold_out);

    let parts: Vec<&str> = order.order_number.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "MIOS");
    assert_eq!(parts[1].len(), 8);
    assert_eq!(parts[2].len(), 4);
    assert!(parts[2].chars().all(|c| c.is_ascii_digit()));

    let revenue = app
        .services()
        .sales
        .list_finance_transactions(Some("sales_order".into()), Some(order.id))
        .await
        .unwrap();
    assert_eq!(revenue.len(), 1);
    assert_eq!(revenue[0].kind, FinanceKind::Revenue);
    assert_eq!(revenue[0].amount, dec!(2000));

    let view = app.services().showroom.get(product.id).await.unwrap();
    assert_eq!(view.remaining_quantity, 1);
}

#[tokio::test]
async fn concurrent_sales_never_oversell_a_batch() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Cane Chair", 3, dec!(400)).await;
    let sales = Arc::clone(&app.services().sales);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let sales = sales.clone();
        let showroom_id = product.id;
        tasks.push(tokio::spawn(async move {
            sales
                .create(new_sale(showroom_id, 1, "self delivery", Decimal::ZERO))
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert_matches!(
                err,
                ServiceError::InsufficientStock(_) | ServiceError::InvalidStatus(_)
            ),
        }
    }
    assert_eq!(successes, 3);

    let view = app.services().showroom.get(product.id).await.unwrap();
    assert_eq!(view.remaining_quantity, 0);
    assert_eq!(view.product.showroom_status, ShowroomStatus::Sold);
    assert!(view.product.sold_date.is_some());
}

#[tokio::test]
async fn quantity_above_remaining_is_refused() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Jute Ottoman", 2, dec!(150)).await;

    let result = app
        .services()
        .sales
        .create(new_sale(product.id, 3, "self delivery", Decimal::ZERO))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let unknown_type = app
        .services()
        .sales
        .create(new_sale(product.id, 1, "drone drop", Decimal::ZERO))
        .await;
    assert_matches!(unknown_type, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn prices_beyond_decimal_range_are_refused() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Teak Almirah", 3, dec!(900)).await;

    let mut sale = new_sale(product.id, 2, "self delivery", Decimal::ZERO);
    sale.unit_price = Some(Decimal::MAX);
    let result = app.services().sales.create(sale).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let order = app
        .sell(product.id, 1, "self delivery", Decimal::ZERO)
        .await
        .sales_order;
    let repriced = app
        .services()
        .sales
        .update_pricing(
            order.id,
            PricingUpdate {
                unit_price: Some(Decimal::MAX),
                quantity: Some(2),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(repriced, Err(ServiceError::ValidationError(_)));
    assert_eq!(
        app.services().sales.get(order.id).await.unwrap().final_amount,
        dec!(900)
    );
}

#[tokio::test]
async fn payments_count_only_after_finance_review() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Leather Recliner", 2, dec!(1000)).await;
    let order = app.sell(product.id, 2, "self delivery", Decimal::ZERO).await.sales_order;
    let sales = &app.services().sales;

    assert_matches!(
        sales.record_payment(order.id, Decimal::ZERO, "cash".into(), None).await,
        Err(ServiceError::ValidationError(_))
    );

    sales
        .record_payment(order.id, dec!(500), "upi".into(), Some("UPI-1".into()))
        .await
        .unwrap();
    assert_eq!(
        sales.get(order.id).await.unwrap().payment_status,
        PaymentStatus::PendingFinanceApproval
    );
    let partial = sales.review_payment(order.id, true).await.unwrap();
    assert_eq!(partial.payment_status, PaymentStatus::Partial);
    assert_matches!(
        sales.review_payment(order.id, true).await,
        Err(ServiceError::InvalidStatus(_))
    );

    sales
        .record_payment(order.id, dec!(700), "card".into(), None)
        .await
        .unwrap();
    let after_reject = sales.review_payment(order.id, false).await.unwrap();
    assert_eq!(after_reject.payment_status, PaymentStatus::Partial);
    assert_eq!(sales.list_payments(order.id).await.unwrap().len(), 1);

    sales
        .record_payment(order.id, dec!(1500), "bank transfer".into(), None)
        .await
        .unwrap();
    let settled = sales.review_payment(order.id, true).await.unwrap();
    assert_eq!(settled.payment_status, PaymentStatus::Completed);

    let detail = sales.get_details(order.id).await.unwrap();
    assert_eq!(detail.amount_paid, dec!(2000));
    assert_eq!(detail.balance_due, Decimal::ZERO);
    assert_eq!(detail.payments.len(), 2);
}

#[tokio::test]
async fn cancelling_returns_units_to_the_showroom() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Teak Wardrobe", 2, dec!(3000)).await;
    let created = app.sell(product.id, 2, "self delivery", Decimal::ZERO).await;
    assert!(created.showroom_sold_out);
    let sales = &app.services().sales;

    let cancelled = sales
        .cancel(created.sales_order.id, Some("customer changed mind".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);

    let view = app.services().showroom.get(product.id).await.unwrap();
    assert_eq!(view.product.showroom_status, ShowroomStatus::Available);
    assert_eq!(view.remaining_quantity, 2);

    let ledger = sales
        .list_finance_transactions(Some("sales_order".into()), Some(created.sales_order.id))
        .await
        .unwrap();
    assert_matches!(
        ledger.iter().map(|t| t.kind).collect::<Vec<_>>().as_slice(),
        [FinanceKind::Revenue, FinanceKind::Reversal]
    );

    assert_matches!(
        sales.cancel(created.sales_order.id, None).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        sales
            .record_payment(created.sales_order.id, dec!(10), "cash".into(), None)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn repricing_moves_quantity_and_books_the_difference() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Bamboo Shelf", 2, dec!(500)).await;
    let order = app.sell(product.id, 1, "self delivery", Decimal::ZERO).await.sales_order;
    let sales = &app.services().sales;

    let updated = sales
        .update_pricing(
            order.id,
            PricingUpdate {
                quantity: Some(2),
                discount_amount: Some(dec!(100)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.final_amount, dec!(900));
    let view = app.services().showroom.get(product.id).await.unwrap();
    assert_eq!(view.product.showroom_status, ShowroomStatus::Sold);

    assert_matches!(
        sales
            .update_pricing(
                order.id,
                PricingUpdate {
                    quantity: Some(3),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::InsufficientStock(_))
    );
    assert_matches!(
        sales
            .update_pricing(
                order.id,
                PricingUpdate {
                    transport_cost: Some(dec!(50)),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let ledger = sales
        .list_finance_transactions(Some("sales_order".into()), Some(order.id))
        .await
        .unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[1].kind, FinanceKind::Revenue);
    assert_eq!(ledger[1].amount, dec!(400));
}

#[tokio::test]
async fn coupon_is_applied_then_approved_or_rolled_back() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Rattan Swing", 2, dec!(800)).await;
    let order = app.sell(product.id, 1, "self delivery", Decimal::ZERO).await.sales_order;
    let sales = &app.services().sales;

    assert_matches!(
        sales.apply_coupon(order.id, "  ".into(), dec!(50), None).await,
        Err(ServiceError::ValidationError(_))
    );

    let staged = sales
        .apply_coupon(order.id, "DIWALI10".into(), dec!(80), Some("sales desk".into()))
        .await
        .unwrap();
    assert_eq!(staged.sales_order.final_amount, dec!(720));
    assert_eq!(staged.sales_order.coupon_code.as_deref(), Some("DIWALI10"));
    assert_eq!(staged.approval_request.kind, ApprovalKind::Coupon);
    assert_eq!(staged.approval_request.status, ApprovalStatus::Pending);

    assert_matches!(
        sales.apply_coupon(order.id, "EXTRA".into(), dec!(10), None).await,
        Err(ServiceError::Conflict(_))
    );

    let rejected = sales
        .decide_approval(staged.approval_request.id, false, Some("admin".into()), None)
        .await
        .unwrap();
    assert_eq!(rejected.approval_request.status, ApprovalStatus::Rejected);
    assert_eq!(rejected.sales_order.final_amount, dec!(800));
    assert!(rejected.sales_order.coupon_code.is_none());
    assert_matches!(
        sales
            .decide_approval(staged.approval_request.id, true, None, None)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );

    let second = sales
        .apply_coupon(order.id, "DIWALI10".into(), dec!(80), None)
        .await
        .unwrap();
    let approved = sales
        .decide_approval(second.approval_request.id, true, Some("admin".into()), None)
        .await
        .unwrap();
    assert!(approved.sales_order.finance_bypass);
    assert_eq!(approved.sales_order.final_amount, dec!(720));
    assert!(approved.sales_order.is_payment_cleared());
}

#[tokio::test]
async fn free_delivery_approval_drops_transport_cost() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("King Bed", 2, dec!(5000)).await;
    let created = app.sell(product.id, 1, "company delivery", dec!(600)).await;
    assert_eq!(
        created.sales_order.order_status,
        OrderStatus::PendingTransportApproval
    );
    assert_eq!(created.sales_order.final_amount, dec!(5600));
    let transport_request = created.transport_request.expect("transport request opened");
    let sales = &app.services().sales;

    let requested = sales
        .request_free_delivery(created.sales_order.id, Some("sales desk".into()), None)
        .await
        .unwrap();
    assert_eq!(
        requested.sales_order.order_status,
        OrderStatus::PendingFreeDeliveryApproval
    );
    assert_eq!(
        requested.sales_order.previous_delivery_type,
        Some(DeliveryType::CompanyDelivery)
    );

    let approved = sales
        .decide_approval(requested.approval_request.id, true, Some("admin".into()), None)
        .await
        .unwrap();
    let order = approved.sales_order;
    assert_eq!(order.order_status, OrderStatus::Confirmed);
    assert_eq!(order.delivery_type, DeliveryType::FreeDelivery);
    assert_eq!(order.transport_cost, Decimal::ZERO);
    assert_eq!(order.final_amount, dec!(5000));
    assert!(order.finance_bypass);

    let superseded = app
        .services()
        .transport
        .get(transport_request.id)
        .await
        .unwrap();
    assert_eq!(superseded.status, TransportApprovalStatus::Rejected);

    assert_matches!(
        sales.request_free_delivery(order.id, None, None).await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn rejected_free_delivery_restores_negotiation() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Pine Bunk Bed", 1, dec!(4200)).await;
    let created = app.sell(product.id, 1, "part load", dec!(300)).await;
    let sales = &app.services().sales;

    let requested = sales
        .request_free_delivery(created.sales_order.id, None, None)
        .await
        .unwrap();
    let rejected = sales
        .decide_approval(requested.approval_request.id, false, None, Some("not eligible".into()))
        .await
        .unwrap();
    let order = rejected.sales_order;
    assert_eq!(order.delivery_type, DeliveryType::PartLoad);
    assert_eq!(order.order_status, OrderStatus::PendingTransportApproval);
    assert_eq!(order.transport_cost, dec!(300));
    assert!(!order.finance_bypass);

    let pending = app
        .services()
        .transport
        .list_for_order(order.id)
        .await
        .unwrap();
    assert_eq!(
        pending
            .iter()
            .filter(|r| r.status == TransportApprovalStatus::Pending)
            .count(),
        1
    );
}

#[tokio::test]
async fn free_delivery_at_checkout_waits_for_an_admin() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Rosewood Divan", 2, dec!(3200)).await;
    let sales = &app.services().sales;

    let created = app.sell(product.id, 1, "free delivery", dec!(250)).await;
    let order = &created.sales_order;
    assert_eq!(order.order_status, OrderStatus::PendingFreeDeliveryApproval);
    assert_eq!(order.delivery_type, DeliveryType::FreeDelivery);
    assert_eq!(order.previous_delivery_type, None);
    assert_eq!(order.transport_cost, Decimal::ZERO);
    assert_eq!(order.final_amount, dec!(3200));
    assert!(created.transport_request.is_none());
    let approval = created.approval_request.expect("approval request opened");
    assert_eq!(approval.kind, ApprovalKind::FreeDelivery);
    assert_eq!(approval.status, ApprovalStatus::Pending);
    assert_eq!(approval.sales_order_id, order.id);

    let detail = sales.get_details(order.id).await.unwrap();
    assert_eq!(detail.approval_requests.len(), 1);
    assert_eq!(detail.approval_requests[0].id, approval.id);

    let approved = sales
        .decide_approval(approval.id, true, Some("admin".into()), None)
        .await
        .unwrap();
    assert_eq!(approved.sales_order.order_status, OrderStatus::Confirmed);
    assert_eq!(approved.sales_order.final_amount, dec!(3200));
    assert!(approved.sales_order.finance_bypass);
    assert_eq!(approved.approval_request.status, ApprovalStatus::Approved);

    let second = app.sell(product.id, 1, "free delivery", Decimal::ZERO).await;
    let rejected = sales
        .decide_approval(
            second.approval_request.expect("approval request opened").id,
            false,
            None,
            Some("outside delivery zone".into()),
        )
        .await
        .unwrap();
    let order = rejected.sales_order;
    assert_eq!(order.delivery_type, DeliveryType::SelfDelivery);
    assert_eq!(order.order_status, OrderStatus::Confirmed);
    assert_eq!(order.transport_cost, Decimal::ZERO);
    assert!(!order.finance_bypass);
}

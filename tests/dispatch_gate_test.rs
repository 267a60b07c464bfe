mod common;

use assert_matches::assert_matches;
use common::{new_sale, TestApp};
use furniture_erp_api::{
    entities::{
        approval_request::ApprovalStatus,
        dispatch_request::{DispatchKind, DispatchStatus},
        gate_pass::GatePassStatus,
        sales_order::{self, OrderStatus},
        transport_job::TransportJobStatus,
        vehicle::VehicleStatus,
    },
    errors::ServiceError,
    services::{
        dispatch::{DispatchInput, GateAction, GateOutcome, GateVerification, ProcessInput},
        transport_jobs::NewVehicle,
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn settle(app: &TestApp, order: &sales_order::Model) {
    let sales = &app.services().sales;
    sales
        .record_payment(order.id, order.final_amount, "cash".into(), None)
        .await
        .unwrap();
    let settled = sales.review_payment(order.id, true).await.unwrap();
    assert_eq!(settled.payment_status, sales_order::PaymentStatus::Completed);
}

async fn paid_pickup(app: &TestApp, name: &str) -> sales_order::Model {
    let product = app.showroom_batch(name, 2, dec!(1500)).await;
    let order = app
        .sell(product.id, 1, "self delivery", Decimal::ZERO)
        .await
        .sales_order;
    settle(app, &order).await;
    order
}

async fn paid_company_delivery(app: &TestApp, name: &str) -> sales_order::Model {
    let product = app.showroom_batch(name, 2, dec!(2500)).await;
    let created = app.sell(product.id, 1, "company delivery", dec!(400)).await;
    let request = created.transport_request.expect("transport request opened");
    let order = app
        .services()
        .transport
        .approve(request.id, None)
        .await
        .unwrap()
        .sales_order;
    settle(app, &order).await;
    order
}

fn release_as(name: &str) -> GateVerification {
    GateVerification {
        action: GateAction::Release,
        customer_name: Some(name.to_string()),
        vehicle_number: None,
        verified_by: Some("gate 2".to_string()),
    }
}

#[tokio::test]
async fn unpaid_or_unconfirmed_orders_stay_in_the_showroom() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Divan", 2, dec!(1800)).await;
    let dispatch = &app.services().dispatch;

    let unpaid = app
        .sell(product.id, 1, "self delivery", Decimal::ZERO)
        .await
        .sales_order;
    assert_matches!(
        dispatch.send(unpaid.id, DispatchInput::default()).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let awaiting_transport = app
        .sell(product.id, 1, "company delivery", dec!(300))
        .await
        .sales_order;
    assert_matches!(
        dispatch.send(awaiting_transport.id, DispatchInput::default()).await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn self_pickup_is_released_at_the_gate() {
    let app = TestApp::new().await;
    let order = paid_pickup(&app, "Recliner").await;
    let dispatch = &app.services().dispatch;

    assert_matches!(
        dispatch
            .send(
                order.id,
                DispatchInput {
                    delivery_type: Some("company delivery".into()),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::InvalidOperation(_))
    );

    let sent = dispatch.send(order.id, DispatchInput::default()).await.unwrap();
    assert_eq!(sent.dispatch_request.delivery_kind, DispatchKind::SelfPickup);
    assert_eq!(sent.dispatch_request.status, DispatchStatus::Pending);
    assert_eq!(sent.sales_order.order_status, OrderStatus::Dispatched);
    assert!(sent.transport_job.is_none());
    let pass = sent.gate_pass.expect("gate pass issued");
    assert_eq!(pass.status, GatePassStatus::Pending);
    assert_eq!(pass.customer_name, "Meera Iyer");

    assert_matches!(
        dispatch.send(order.id, DispatchInput::default()).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let processed = dispatch
        .process(sent.dispatch_request.id, ProcessInput::default())
        .await
        .unwrap();
    assert_eq!(processed.dispatch_request.status, DispatchStatus::ReadyForLoad);

    let entered = dispatch
        .verify_gate_pass(
            pass.id,
            GateVerification {
                action: GateAction::Enter,
                customer_name: None,
                vehicle_number: None,
                verified_by: None,
            },
        )
        .await
        .unwrap();
    assert_matches!(
        entered,
        GateOutcome::EnteredForPickup { ref gate_pass, ref dispatch_request }
            if gate_pass.status == GatePassStatus::EnteredForPickup
                && dispatch_request.status == DispatchStatus::EnteredForPickup
    );

    let released = dispatch
        .verify_gate_pass(pass.id, release_as("  meera   IYER "))
        .await
        .unwrap();
    let (gate_pass, dispatch_request, sales_order) = assert_matches!(
        released,
        GateOutcome::Released { gate_pass, dispatch_request, sales_order }
            => (gate_pass, dispatch_request, sales_order)
    );
    assert_eq!(gate_pass.status, GatePassStatus::Verified);
    assert_eq!(gate_pass.released_by.as_deref(), Some("gate 2"));
    assert!(gate_pass.released_at.is_some());
    assert!(gate_pass.override_by.is_none());
    assert_eq!(dispatch_request.status, DispatchStatus::Completed);
    assert_eq!(sales_order.order_status, OrderStatus::Delivered);

    assert_matches!(
        dispatch.verify_gate_pass(pass.id, release_as("Meera Iyer")).await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn identity_mismatch_needs_a_manager_override() {
    let app = TestApp::new().await;
    let order = paid_pickup(&app, "Chest of Drawers").await;
    let dispatch = &app.services().dispatch;
    let pass = dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap()
        .gate_pass
        .expect("gate pass issued");

    assert_matches!(
        dispatch
            .manager_override_release(pass.id, "Store Manager".into())
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        dispatch
            .verify_gate_pass(
                pass.id,
                GateVerification {
                    action: GateAction::Release,
                    customer_name: Some("   ".into()),
                    vehicle_number: None,
                    verified_by: None,
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let mismatch = dispatch
        .verify_gate_pass(pass.id, release_as("Someone Else"))
        .await
        .unwrap();
    let gate_pass = assert_matches!(
        mismatch,
        GateOutcome::IdentityMismatch { gate_pass, requires_override: true, .. } => gate_pass
    );
    assert_eq!(gate_pass.mismatch_attempts, 1);
    assert_eq!(gate_pass.status, GatePassStatus::Pending);
    assert_eq!(gate_pass.last_attempted_name.as_deref(), Some("Someone Else"));
    assert_eq!(
        app.services().sales.get(order.id).await.unwrap().order_status,
        OrderStatus::Dispatched
    );

    assert_matches!(
        dispatch.manager_override_release(pass.id, " ".into()).await,
        Err(ServiceError::ValidationError(_))
    );
    let released = dispatch
        .manager_override_release(pass.id, "Store Manager".into())
        .await
        .unwrap();
    let (gate_pass, sales_order) = assert_matches!(
        released,
        GateOutcome::Released { gate_pass, sales_order, .. } => (gate_pass, sales_order)
    );
    assert_eq!(gate_pass.override_by.as_deref(), Some("Store Manager"));
    assert_eq!(gate_pass.status, GatePassStatus::Verified);
    assert_eq!(sales_order.order_status, OrderStatus::Delivered);
}

#[tokio::test]
async fn rejected_passes_cannot_be_released() {
    let app = TestApp::new().await;
    let order = paid_pickup(&app, "Shoe Rack").await;
    let dispatch = &app.services().dispatch;
    let pass = dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap()
        .gate_pass
        .expect("gate pass issued");

    let rejected = dispatch
        .verify_gate_pass(
            pass.id,
            GateVerification {
                action: GateAction::Reject,
                customer_name: None,
                vehicle_number: None,
                verified_by: None,
            },
        )
        .await
        .unwrap();
    assert_matches!(rejected, GateOutcome::Rejected { gate_pass } if gate_pass.status == GatePassStatus::Rejected);
    assert_matches!(
        dispatch.verify_gate_pass(pass.id, release_as("Meera Iyer")).await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn missing_contact_holds_the_dispatch() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Wall Mirror", 1, dec!(700)).await;
    let mut sale = new_sale(product.id, 1, "self delivery", Decimal::ZERO);
    sale.customer_phone = None;
    let order = app
        .services()
        .sales
        .create(sale)
        .await
        .unwrap()
        .sales_order;
    settle(&app, &order).await;
    let dispatch = &app.services().dispatch;

    let sent = dispatch.send(order.id, DispatchInput::default()).await.unwrap();
    assert_eq!(
        sent.dispatch_request.status,
        DispatchStatus::CustomerDetailsRequired
    );
    assert_matches!(
        dispatch
            .process(sent.dispatch_request.id, ProcessInput::default())
            .await,
        Err(ServiceError::InvalidStatus(_))
    );

    let updated = dispatch
        .update_customer_details(sent.dispatch_request.id, Some("9000012345".into()), None)
        .await
        .unwrap();
    assert_eq!(updated.status, DispatchStatus::Pending);
    assert_eq!(updated.party_contact.as_deref(), Some("9000012345"));

    let listed = dispatch.list(Some(DispatchStatus::Pending)).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn approved_coupon_bypasses_payment_for_dispatch() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Tea Table", 1, dec!(600)).await;
    let order = app
        .sell(product.id, 1, "self delivery", Decimal::ZERO)
        .await
        .sales_order;
    let sales = &app.services().sales;
    let staged = sales
        .apply_coupon(order.id, "STAFF".into(), dec!(600), None)
        .await
        .unwrap();
    sales
        .decide_approval(staged.approval_request.id, true, None, None)
        .await
        .unwrap();

    let sent = app
        .services()
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    assert!(sent.gate_pass.is_some());
}

#[tokio::test]
async fn company_delivery_runs_a_transport_job() {
    let app = TestApp::new().await;
    let order = paid_company_delivery(&app, "Dining Hutch").await;
    let services = app.services();

    let vehicle = services
        .transport_jobs
        .register_vehicle(NewVehicle {
            registration_number: "mh12 ab 4321".into(),
            driver_name: Some("Raju".into()),
            driver_contact: Some("9000000001".into()),
        })
        .await
        .unwrap();
    assert_eq!(vehicle.registration_number, "MH12 AB 4321");
    assert_eq!(vehicle.status, VehicleStatus::Available);
    assert_matches!(
        services
            .transport_jobs
            .register_vehicle(NewVehicle {
                registration_number: "MH12 AB 4321".into(),
                driver_name: None,
                driver_contact: None,
            })
            .await,
        Err(ServiceError::Conflict(_))
    );

    let sent = services
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    assert_eq!(sent.dispatch_request.delivery_kind, DispatchKind::Transport);
    assert!(sent.gate_pass.is_none());
    let job = sent.transport_job.expect("transport job created");
    assert_eq!(job.status, TransportJobStatus::Pending);
    assert_eq!(job.destination.as_deref(), Some("14 Lake Road, Pune"));

    assert_matches!(
        services.transport_jobs.start(job.id).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let processed = services
        .dispatch
        .process(
            sent.dispatch_request.id,
            ProcessInput {
                vehicle_id: Some(vehicle.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        processed.dispatch_request.status,
        DispatchStatus::AssignedTransport
    );
    assert_eq!(
        processed.dispatch_request.vehicle_number.as_deref(),
        Some("MH12 AB 4321")
    );
    let assigned = processed.transport_job.expect("job assigned");
    assert_eq!(assigned.status, TransportJobStatus::Assigned);
    assert_eq!(assigned.driver_name.as_deref(), Some("Raju"));
    assert_eq!(
        services.transport_jobs.get_vehicle(vehicle.id).await.unwrap().status,
        VehicleStatus::Assigned
    );

    let loaded = services
        .dispatch
        .mark_loaded(sent.dispatch_request.id)
        .await
        .unwrap();
    assert_eq!(loaded.status, DispatchStatus::Loaded);

    let in_transit = services.transport_jobs.start(job.id).await.unwrap();
    assert_eq!(in_transit.status, TransportJobStatus::InTransit);
    assert!(in_transit.started_at.is_some());
    assert_eq!(
        services
            .dispatch
            .get(sent.dispatch_request.id)
            .await
            .unwrap()
            .status,
        DispatchStatus::Completed
    );
    assert_matches!(
        services.transport_jobs.driver_reached(vehicle.id).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        services.transport_jobs.cancel(job.id, None).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let delivered = services.transport_jobs.deliver(job.id).await.unwrap();
    assert_eq!(delivered.status, TransportJobStatus::Delivered);
    assert_eq!(
        services.sales.get(order.id).await.unwrap().order_status,
        OrderStatus::Delivered
    );
    assert_eq!(
        services.transport_jobs.get_vehicle(vehicle.id).await.unwrap().status,
        VehicleStatus::Returning
    );

    let back = services.transport_jobs.driver_reached(vehicle.id).await.unwrap();
    assert_eq!(back.status, VehicleStatus::Available);
    assert_eq!(
        services
            .transport_jobs
            .list_vehicles(Some(VehicleStatus::Available))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn hired_transport_needs_a_vehicle_number() {
    let app = TestApp::new().await;
    let order = paid_company_delivery(&app, "Garden Bench").await;
    let services = app.services();
    let sent = services
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    let job = sent.transport_job.expect("transport job created");

    assert_matches!(
        services
            .dispatch
            .process(sent.dispatch_request.id, ProcessInput::default())
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let processed = services
        .dispatch
        .process(
            sent.dispatch_request.id,
            ProcessInput {
                vehicle_number: Some("KA05 HIRE 77".into()),
                driver_name: Some("Anil".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        processed.transport_job.as_ref().map(|j| j.vehicle_id),
        Some(None)
    );

    let cancelled = services
        .transport_jobs
        .cancel(job.id, Some("customer rescheduled".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransportJobStatus::Cancelled);
    assert_eq!(cancelled.failure_reason.as_deref(), Some("customer rescheduled"));
    assert_matches!(
        services.transport_jobs.fail(job.id, "flat tyre".into()).await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn failed_run_sends_the_vehicle_home() {
    let app = TestApp::new().await;
    let order = paid_company_delivery(&app, "Sofa Cum Bed").await;
    let services = app.services();
    let vehicle = services
        .transport_jobs
        .register_vehicle(NewVehicle {
            registration_number: "GJ01 XY 1000".into(),
            driver_name: None,
            driver_contact: None,
        })
        .await
        .unwrap();
    let sent = services
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    let job = sent.transport_job.expect("transport job created");
    services
        .dispatch
        .process(
            sent.dispatch_request.id,
            ProcessInput {
                vehicle_id: Some(vehicle.id),
                driver_name: Some("Kiran".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    services.transport_jobs.start(job.id).await.unwrap();

    assert_matches!(
        services.transport_jobs.fail(job.id, "  ".into()).await,
        Err(ServiceError::ValidationError(_))
    );
    let failed = services
        .transport_jobs
        .fail(job.id, "road closed".into())
        .await
        .unwrap();
    assert_eq!(failed.status, TransportJobStatus::Failed);
    assert_eq!(
        services.transport_jobs.get_vehicle(vehicle.id).await.unwrap().status,
        VehicleStatus::Returning
    );
    assert_eq!(
        services.sales.get(order.id).await.unwrap().order_status,
        OrderStatus::Dispatched
    );
}

#[tokio::test]
async fn free_delivery_sale_dispatches_once_approved() {
    let app = TestApp::new().await;
    let product = app.showroom_batch("Swing Chair", 1, dec!(2200)).await;
    let services = app.services();
    let created = app.sell(product.id, 1, "free delivery", dec!(300)).await;
    let order = created.sales_order;
    assert_eq!(order.order_status, OrderStatus::PendingFreeDeliveryApproval);

    assert_matches!(
        services.dispatch.send(order.id, DispatchInput::default()).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let approval = created.approval_request.expect("approval request opened");
    let decided = services
        .sales
        .decide_approval(approval.id, true, Some("admin".into()), None)
        .await
        .unwrap();
    assert_eq!(decided.approval_request.status, ApprovalStatus::Approved);

    let sent = services
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    assert_eq!(sent.sales_order.order_status, OrderStatus::Dispatched);
    assert_eq!(sent.dispatch_request.delivery_kind, DispatchKind::Transport);
    assert_eq!(sent.dispatch_request.status, DispatchStatus::Pending);
    let job = sent.transport_job.expect("transport job created");
    assert_eq!(job.status, TransportJobStatus::Pending);
}

#[tokio::test]
async fn cancelled_job_puts_the_dispatch_back_in_the_queue() {
    let app = TestApp::new().await;
    let order = paid_company_delivery(&app, "Wardrobe").await;
    let services = app.services();
    let vehicle = services
        .transport_jobs
        .register_vehicle(NewVehicle {
            registration_number: "TN09 QR 5555".into(),
            driver_name: Some("Selvam".into()),
            driver_contact: Some("9000000002".into()),
        })
        .await
        .unwrap();
    let sent = services
        .dispatch
        .send(order.id, DispatchInput::default())
        .await
        .unwrap();
    let dispatch_id = sent.dispatch_request.id;
    let job = sent.transport_job.expect("transport job created");
    services
        .dispatch
        .process(
            dispatch_id,
            ProcessInput {
                vehicle_id: Some(vehicle.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    services.dispatch.mark_loaded(dispatch_id).await.unwrap();

    let cancelled = services
        .transport_jobs
        .cancel(job.id, Some("vehicle breakdown".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransportJobStatus::Cancelled);
    assert_eq!(
        services.transport_jobs.get_vehicle(vehicle.id).await.unwrap().status,
        VehicleStatus::Available
    );
    let requeued = services.dispatch.get(dispatch_id).await.unwrap();
    assert_eq!(requeued.status, DispatchStatus::Pending);
    assert_eq!(requeued.vehicle_id, None);
    assert_eq!(requeued.vehicle_number, None);
    assert_eq!(
        services.sales.get(order.id).await.unwrap().order_status,
        OrderStatus::Dispatched
    );
    assert_matches!(
        services.transport_jobs.start(job.id).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let reprocessed = services
        .dispatch
        .process(
            dispatch_id,
            ProcessInput {
                vehicle_number: Some("KA01 HIRE 12".into()),
                driver_name: Some("Manju".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        reprocessed.dispatch_request.status,
        DispatchStatus::AssignedTransport
    );
    let reassigned = reprocessed.transport_job.expect("job reassigned");
    assert_eq!(reassigned.id, job.id);
    assert_eq!(reassigned.status, TransportJobStatus::Assigned);
    assert_eq!(reassigned.vehicle_id, None);
    assert_eq!(reassigned.failure_reason, None);

    services.transport_jobs.start(job.id).await.unwrap();
    services.transport_jobs.deliver(job.id).await.unwrap();
    assert_eq!(
        services.sales.get(order.id).await.unwrap().order_status,
        OrderStatus::Delivered
    );
}

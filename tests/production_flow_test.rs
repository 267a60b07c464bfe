mod common;

use assert_matches::assert_matches;
use common::{material, passing_tests, TestApp};
use furniture_erp_api::{
    entities::{
        assembly_order::{AssemblyStatus, QualityTest},
        production_order::ProductionStatus,
        purchase_order::PurchaseStatus,
        showroom_product::ShowroomStatus,
    },
    errors::ServiceError,
    services::{assembly::ShowroomPromotion, production::NewProductionOrder},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn creating_a_batch_opens_purchase_and_assembly_orders() {
    let app = TestApp::new().await;
    let bundle = app
        .create_production(
            "Oak Dining Table",
            4,
            &[("Oak plank", 12, dec!(30)), ("Wood screw", 200, dec!(0.5))],
        )
        .await;

    assert_eq!(bundle.production_order.status, ProductionStatus::Created);
    assert_eq!(bundle.purchase_order.status, PurchaseStatus::Pending);
    assert_eq!(bundle.purchase_order.materials.len(), 2);
    assert!(bundle.purchase_order.original_requirements.is_none());
    assert_eq!(bundle.assembly_order.quantity, 4);
    assert_eq!(bundle.assembly_order.status, AssemblyStatus::Pending);

    let view = app
        .services()
        .production
        .get(bundle.production_order.id)
        .await
        .unwrap();
    assert_eq!(view.derived_status.text, "Stock Check Pending");
    assert_eq!(view.derived_status.department, "Store");
}

#[tokio::test]
async fn invalid_material_lists_are_rejected() {
    let app = TestApp::new().await;
    let production = &app.services().production;

    let empty = production
        .create(NewProductionOrder {
            product_name: "Bookshelf".into(),
            category: "Study".into(),
            quantity: 1,
            materials: vec![],
        })
        .await;
    assert_matches!(empty, Err(ServiceError::ValidationError(_)));

    let duplicate = production
        .create(NewProductionOrder {
            product_name: "Bookshelf".into(),
            category: "Study".into(),
            quantity: 1,
            materials: vec![material("Pine", 2, dec!(10)), material("Pine", 3, dec!(10))],
        })
        .await;
    assert_matches!(duplicate, Err(ServiceError::ValidationError(_)));

    let negative_cost = production
        .create(NewProductionOrder {
            product_name: "Bookshelf".into(),
            category: "Study".into(),
            quantity: 1,
            materials: vec![material("Pine", 2, dec!(-1))],
        })
        .await;
    assert_matches!(negative_cost, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn quantity_changes_only_before_stock_check() {
    let app = TestApp::new().await;
    app.seed_stock("Teak", 10).await;
    let bundle = app
        .create_production("Teak Bench", 2, &[("Teak", 6, dec!(40))])
        .await;
    let id = bundle.production_order.id;

    let view = app.services().production.update_quantity(id, 3).await.unwrap();
    assert_eq!(view.production_order.quantity, 3);
    assert_eq!(view.assembly_order.as_ref().map(|a| a.quantity), Some(3));

    app.services()
        .purchase
        .check_stock(bundle.purchase_order.id)
        .await
        .unwrap();
    let late = app.services().production.update_quantity(id, 5).await;
    assert_matches!(late, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn cancelled_batches_stop_the_purchase_flow() {
    let app = TestApp::new().await;
    let bundle = app
        .create_production("Walnut Desk", 1, &[("Walnut", 4, dec!(80))])
        .await;
    let services = app.services();

    let view = services.production.cancel(bundle.production_order.id).await.unwrap();
    assert_eq!(view.production_order.status, ProductionStatus::Cancelled);
    assert_eq!(view.derived_status.text, "Cancelled");
    assert_eq!(
        view.purchase_order.map(|p| p.status),
        Some(PurchaseStatus::Cancelled)
    );

    let check = services.purchase.check_stock(bundle.purchase_order.id).await;
    assert_matches!(check, Err(ServiceError::InvalidStatus(_)));
    let again = services.production.cancel(bundle.production_order.id).await;
    assert_matches!(again, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn assembly_needs_allocated_materials() {
    let app = TestApp::new().await;
    let bundle = app
        .create_production("Rosewood Chair", 2, &[("Rosewood", 5, dec!(60))])
        .await;

    let early = app
        .services()
        .assembly
        .update_progress(bundle.assembly_order.id, 10)
        .await;
    assert_matches!(early, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn assembly_progress_pause_and_resume() {
    let app = TestApp::new().await;
    app.seed_stock("Birch", 8).await;
    let bundle = app
        .create_production("Birch Stool", 4, &[("Birch", 8, dec!(25))])
        .await;
    let services = app.services();
    services.purchase.check_stock(bundle.purchase_order.id).await.unwrap();
    let assembly_id = bundle.assembly_order.id;

    let started = services.assembly.update_progress(assembly_id, 40).await.unwrap();
    assert_eq!(started.status, AssemblyStatus::InProgress);

    let paused = services.assembly.pause(assembly_id).await.unwrap();
    assert_eq!(paused.status, AssemblyStatus::Paused);
    assert_matches!(
        services.assembly.pause(assembly_id).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let view = services.production.get(bundle.production_order.id).await.unwrap();
    assert_eq!(view.derived_status.text, "Assembly Paused");

    let resumed = services.assembly.resume(assembly_id).await.unwrap();
    assert_eq!(resumed.status, AssemblyStatus::InProgress);

    let done = services.assembly.update_progress(assembly_id, 100).await.unwrap();
    assert_eq!(done.status, AssemblyStatus::Completed);

    assert_matches!(
        services.assembly.update_progress(assembly_id, 101).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn failed_quality_test_sends_batch_to_rework() {
    let app = TestApp::new().await;
    app.seed_stock("Ash", 6).await;
    let bundle = app
        .create_production("Ash Cabinet", 2, &[("Ash", 6, dec!(45))])
        .await;
    let services = app.services();
    services.purchase.check_stock(bundle.purchase_order.id).await.unwrap();
    let assembly_id = bundle.assembly_order.id;
    services.assembly.update_progress(assembly_id, 100).await.unwrap();

    let mut tests = passing_tests();
    tests.push(QualityTest {
        name: "Hinge alignment".into(),
        passed: false,
        notes: Some("Left door sags".into()),
    });
    let outcome = services
        .assembly
        .add_to_showroom(assembly_id, tests, None)
        .await
        .unwrap();
    let rework = assert_matches!(outcome, ShowroomPromotion::ReworkRequired(r) => r);
    assert_eq!(rework.failed_tests, vec!["Hinge alignment".to_string()]);
    assert_eq!(rework.assembly_order.status, AssemblyStatus::Rework);
    assert_eq!(rework.assembly_order.progress, 0);

    let view = services.production.get(bundle.production_order.id).await.unwrap();
    assert_eq!(view.derived_status.text, "Rework Required");

    let not_completed = services
        .assembly
        .add_to_showroom(assembly_id, passing_tests(), None)
        .await;
    assert_matches!(not_completed, Err(ServiceError::InvalidStatus(_)));

    services.assembly.update_progress(assembly_id, 100).await.unwrap();
    let promoted = services
        .assembly
        .add_to_showroom(assembly_id, passing_tests(), None)
        .await
        .unwrap();
    let promoted = assert_matches!(promoted, ShowroomPromotion::Promoted(p) => p);
    assert_eq!(promoted.assembly_order.status, AssemblyStatus::SentToShowroom);
    assert_eq!(promoted.assembly_order.test_results.0.len(), 7);
}

#[tokio::test]
async fn showroom_batch_is_priced_from_material_cost() {
    let app = TestApp::new().await;
    app.seed_stock("Mango wood", 10).await;
    let bundle = app
        .create_production("Mango Console", 3, &[("Mango wood", 10, dec!(50))])
        .await;
    let services = app.services();
    services.purchase.check_stock(bundle.purchase_order.id).await.unwrap();
    services
        .assembly
        .update_progress(bundle.assembly_order.id, 100)
        .await
        .unwrap();

    let outcome = services
        .assembly
        .add_to_showroom(bundle.assembly_order.id, passing_tests(), None)
        .await
        .unwrap();
    let promoted = assert_matches!(outcome, ShowroomPromotion::Promoted(p) => p);
    let product = promoted.showroom_product;
    assert_eq!(product.cost_price, dec!(166.67));
    assert_eq!(product.sale_price, product.cost_price);
    assert_eq!(product.showroom_status, ShowroomStatus::Available);

    let view = services.showroom.get(product.id).await.unwrap();
    assert_eq!(view.batch_quantity, 3);
    assert_eq!(view.remaining_quantity, 3);

    let frozen = services
        .assembly
        .update_progress(bundle.assembly_order.id, 50)
        .await;
    assert_matches!(frozen, Err(ServiceError::InvalidStatus(_)));

    let production = services.production.get(bundle.production_order.id).await.unwrap();
    assert_eq!(production.derived_status.text, "In Showroom");
    assert_matches!(
        services.production.cancel(bundle.production_order.id).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert!(product.sale_price > Decimal::ZERO);
}

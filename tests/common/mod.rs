#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use furniture_erp_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{
        assembly_order::QualityTest, purchase_order::MaterialLine, showroom_product,
        store_inventory,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        assembly::ShowroomPromotion,
        production::{NewProductionOrder, ProductionOrderBundle},
        sales::{CreatedSalesOrder, NewSalesOrder},
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Application state and router backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("erp_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::connect(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, Some(EventSender::new(event_tx)));
        let router = app_router(state.clone()).expect("router builds in development");

        Self {
            router,
            state,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Send a request against the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_stock(&self, name: &str, quantity: i32) -> store_inventory::Model {
        self.services()
            .inventory
            .add_stock(name, quantity, Some("raw material".to_string()))
            .await
            .expect("seed stock")
    }

    pub async fn stock_of(&self, name: &str) -> i32 {
        self.services()
            .inventory
            .get_item(name)
            .await
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    pub async fn create_production(
        &self,
        product_name: &str,
        quantity: i32,
        materials: &[(&str, i32, Decimal)],
    ) -> ProductionOrderBundle {
        self.services()
            .production
            .create(NewProductionOrder {
                product_name: product_name.to_string(),
                category: "Living Room".to_string(),
                quantity,
                materials: materials
                    .iter()
                    .map(|(name, quantity, unit_cost)| material(name, *quantity, *unit_cost))
                    .collect(),
            })
            .await
            .expect("create production order")
    }

    /// Runs a batch through stock allocation, assembly and the quality gate.
    pub async fn showroom_batch(
        &self,
        product_name: &str,
        quantity: i32,
        sale_price: Decimal,
    ) -> showroom_product::Model {
        let material_name = format!("{} board", product_name);
        self.seed_stock(&material_name, 10).await;
        let bundle = self
            .create_production(product_name, quantity, &[(&material_name, 10, Decimal::new(50, 0))])
            .await;
        let services = self.services();
        services
            .purchase
            .check_stock(bundle.purchase_order.id)
            .await
            .expect("stock check");
        services
            .assembly
            .update_progress(bundle.assembly_order.id, 100)
            .await
            .expect("complete assembly");
        match services
            .assembly
            .add_to_showroom(bundle.assembly_order.id, passing_tests(), Some(sale_price))
            .await
            .expect("promote to showroom")
        {
            ShowroomPromotion::Promoted(promoted) => promoted.showroom_product,
            ShowroomPromotion::ReworkRequired(rework) => {
                panic!("unexpected rework: {:?}", rework.failed_tests)
            }
        }
    }

    pub async fn sell(
        &self,
        showroom_product_id: i32,
        quantity: i32,
        delivery_type: &str,
        transport_cost: Decimal,
    ) -> CreatedSalesOrder {
        self.services()
            .sales
            .create(new_sale(showroom_product_id, quantity, delivery_type, transport_cost))
            .await
            .expect("create sales order")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn material(name: &str, quantity: i32, unit_cost: Decimal) -> MaterialLine {
    MaterialLine {
        name: name.to_string(),
        quantity,
        unit_cost,
    }
}

pub fn passing_tests() -> Vec<QualityTest> {
    ["Stability", "Finish", "Dimensions"]
        .into_iter()
        .map(|name| QualityTest {
            name: name.to_string(),
            passed: true,
            notes: None,
        })
        .collect()
}

pub fn new_sale(
    showroom_product_id: i32,
    quantity: i32,
    delivery_type: &str,
    transport_cost: Decimal,
) -> NewSalesOrder {
    NewSalesOrder {
        showroom_product_id,
        customer_name: "Meera Iyer".to_string(),
        customer_phone: Some("9876543210".to_string()),
        customer_email: Some("meera@example.com".to_string()),
        customer_address: Some("14 Lake Road, Pune".to_string()),
        quantity,
        unit_price: None,
        transport_cost,
        discount_amount: Decimal::ZERO,
        delivery_type: delivery_type.to_string(),
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

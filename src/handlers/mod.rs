pub mod assembly_orders;
pub mod common;
pub mod dispatch;
pub mod finance;
pub mod fleet;
pub mod inventory;
pub mod production_orders;
pub mod purchase_orders;
pub mod sales_orders;
pub mod showroom;
pub mod transport_requests;

use crate::config::AppConfig;
use crate::db::{DbPool, RowLocks};
use crate::events::EventSender;
use crate::services::{
    assembly::AssemblyService, dispatch::DispatchService, inventory::InventoryService,
    production::ProductionService, purchase::PurchaseService, sales::SalesService,
    showroom::ShowroomService, transport::TransportService,
    transport_jobs::TransportJobService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub production: Arc<ProductionService>,
    pub purchase: Arc<PurchaseService>,
    pub inventory: Arc<InventoryService>,
    pub assembly: Arc<AssemblyService>,
    pub showroom: Arc<ShowroomService>,
    pub sales: Arc<SalesService>,
    pub transport: Arc<TransportService>,
    pub dispatch: Arc<DispatchService>,
    pub transport_jobs: Arc<TransportJobService>,
}

impl AppServices {
    /// Builds every service over one pool and one shared row-lock table.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let locks = RowLocks::new();

        Self {
            production: Arc::new(ProductionService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            purchase: Arc::new(PurchaseService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            assembly: Arc::new(AssemblyService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            showroom: Arc::new(ShowroomService::new(db_pool.clone())),
            sales: Arc::new(
                SalesService::new(db_pool.clone(), event_sender.clone(), locks.clone())
                    .with_order_number_suffix_len(config.order_number_suffix_len),
            ),
            transport: Arc::new(TransportService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            dispatch: Arc::new(DispatchService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            transport_jobs: Arc::new(TransportJobService::new(db_pool, event_sender, locks)),
        }
    }
}

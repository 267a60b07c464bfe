//! Persistence models for the order-fulfillment workflow.
//!
//! Every table is integer keyed. Cross references are plain id columns used for lookups; status
//! columns are stored as text and mapped onto enums with `DeriveActiveEnum`.

pub mod approval_request;
pub mod assembly_order;
pub mod dispatch_request;
pub mod finance_transaction;
pub mod gate_pass;
pub mod production_order;
pub mod purchase_order;
pub mod sales_order;
pub mod sales_transaction;
pub mod showroom_product;
pub mod store_inventory;
pub mod transport_approval;
pub mod transport_job;
pub mod vehicle;

pub mod assembly;
pub mod dispatch;
pub mod inventory;
pub mod order_status;
pub mod pricing;
pub mod production;
pub mod purchase;
pub mod sales;
pub mod showroom;
pub mod transport;
pub mod transport_jobs;

use crate::errors::ServiceError;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

/// Opens a transaction, mapping failures onto `ServiceError`.
pub(crate) async fn begin(db: &DatabaseConnection) -> Result<DatabaseTransaction, ServiceError> {
    db.begin().await.map_err(ServiceError::db_error)
}

/// Commits a transaction, mapping failures onto `ServiceError`.
pub(crate) async fn commit(txn: DatabaseTransaction) -> Result<(), ServiceError> {
    txn.commit().await.map_err(ServiceError::db_error)
}

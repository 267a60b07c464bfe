use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    db::{for_update, lock_key, RowLocks},
    entities::{
        assembly_order::{self, AssemblyStatus, Entity as AssemblyOrderEntity, QualityTest},
        production_order::{Entity as ProductionOrderEntity, ProductionStatus},
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseStatus},
        showroom_product::{self, ShowroomStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
};

/// Outcome of the quality gate in front of the showroom
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShowroomPromotion {
    Promoted(Promoted),
    ReworkRequired(ReworkRequired),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promoted {
    pub showroom_product: showroom_product::Model,
    pub assembly_order: assembly_order::Model,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReworkRequired {
    pub rework_required: bool,
    pub failed_tests: Vec<String>,
    pub assembly_order: assembly_order::Model,
}

/// Status implied by a progress value. `None` when the value is out of range.
pub fn status_for_progress(current: AssemblyStatus, progress: i32) -> Option<AssemblyStatus> {
    match progress {
        100 => Some(AssemblyStatus::Completed),
        1..=99 => Some(AssemblyStatus::InProgress),
        0 if current == AssemblyStatus::Paused => Some(AssemblyStatus::Paused),
        0 => Some(AssemblyStatus::Pending),
        _ => None,
    }
}

/// Per-unit cost of a batch, rounded to two decimal places.
pub fn unit_cost(total_material_cost: Decimal, quantity: i32) -> Decimal {
    if quantity <= 0 {
        return total_material_cost.round_dp(2);
    }
    (total_material_cost / Decimal::from(quantity)).round_dp(2)
}

#[derive(Clone)]
pub struct AssemblyService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl AssemblyService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        locks: RowLocks,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
        }
    }

    pub async fn get(&self, id: i32) -> Result<assembly_order::Model, ServiceError> {
        AssemblyOrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Assembly order", id))
    }

    /// Records assembly progress; 100 completes the batch.
    #[instrument(skip(self))]
    pub async fn update_progress(
        &self,
        id: i32,
        progress: i32,
    ) -> Result<assembly_order::Model, ServiceError> {
        if !(0..=100).contains(&progress) {
            return Err(ServiceError::ValidationError(format!(
                "Progress must be between 0 and 100, got {}",
                progress
            )));
        }

        let _guard = self.locks.acquire_one(lock_key("assembly", id)).await;
        let txn = super::begin(&self.db).await?;
        let assembly = load_for_update(&txn, id).await?;

        if assembly.status == AssemblyStatus::SentToShowroom {
            return Err(ServiceError::InvalidStatus(format!(
                "Assembly order {} has already been sent to the showroom",
                id
            )));
        }
        ensure_materials_allocated(&txn, assembly.production_order_id).await?;

        let status = status_for_progress(assembly.status, progress).ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid progress {}", progress))
        })?;

        let mut active: assembly_order::ActiveModel = assembly.into();
        active.progress = Set(progress);
        active.status = Set(status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        if status == AssemblyStatus::Completed {
            metrics::increment_counter("assembly.completed");
        }
        self.emit_progress(&updated).await;
        info!(assembly_order_id = id, progress, status = ?status, "Assembly progress updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, id: i32) -> Result<assembly_order::Model, ServiceError> {
        self.transition(id, AssemblyStatus::InProgress, AssemblyStatus::Paused)
            .await
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, id: i32) -> Result<assembly_order::Model, ServiceError> {
        self.transition(id, AssemblyStatus::Paused, AssemblyStatus::InProgress)
            .await
    }

    async fn transition(
        &self,
        id: i32,
        from: AssemblyStatus,
        to: AssemblyStatus,
    ) -> Result<assembly_order::Model, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("assembly", id)).await;
        let txn = super::begin(&self.db).await?;
        let assembly = load_for_update(&txn, id).await?;

        if assembly.status != from {
            return Err(ServiceError::InvalidStatus(format!(
                "Assembly order {} is {:?}, expected {:?}",
                id, assembly.status, from
            )));
        }

        let mut active: assembly_order::ActiveModel = assembly.into();
        active.status = Set(to);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        self.emit_progress(&updated).await;
        info!(assembly_order_id = id, from = ?from, to = ?to, "Assembly status changed");
        Ok(updated)
    }

    /// Runs the quality gate and, when every test passes, puts the batch on display.
    #[instrument(skip(self, tests), fields(test_count = tests.len()))]
    pub async fn add_to_showroom(
        &self,
        id: i32,
        tests: Vec<QualityTest>,
        sale_price: Option<Decimal>,
    ) -> Result<ShowroomPromotion, ServiceError> {
        if let Some(price) = sale_price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Sale price cannot be negative".to_string(),
                ));
            }
        }

        let _guard = self.locks.acquire_one(lock_key("assembly", id)).await;
        let txn = super::begin(&self.db).await?;
        let assembly = load_for_update(&txn, id).await?;

        if assembly.status != AssemblyStatus::Completed {
            return Err(ServiceError::InvalidStatus(format!(
                "Assembly order {} must be completed before showroom promotion (status {:?})",
                id, assembly.status
            )));
        }

        let failed_tests: Vec<String> = tests
            .iter()
            .filter(|t| !t.passed)
            .map(|t| t.name.clone())
            .collect();
        let mut results = assembly.test_results.clone();
        results.0.extend(tests);

        if !failed_tests.is_empty() {
            let mut active: assembly_order::ActiveModel = assembly.into();
            active.status = Set(AssemblyStatus::Rework);
            active.progress = Set(0);
            active.test_results = Set(results);
            let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
            super::commit(txn).await?;

            metrics::increment_counter("assembly.rework");
            warn!(assembly_order_id = id, failed = ?failed_tests, "Quality tests failed; batch sent to rework");
            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::AssemblyReworkRequired {
                        assembly_order_id: id,
                        failed_tests: failed_tests.clone(),
                    })
                    .await;
            }
            return Ok(ShowroomPromotion::ReworkRequired(ReworkRequired {
                rework_required: true,
                failed_tests,
                assembly_order: updated,
            }));
        }

        let production = ProductionOrderEntity::find_by_id(assembly.production_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Production order", assembly.production_order_id))?;
        let purchase = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::ProductionOrderId.eq(assembly.production_order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::not_found(
                    "Purchase order for production order",
                    assembly.production_order_id,
                )
            })?;

        let material_cost = purchase.requirements().total_cost().ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Material cost of production order {} is too large",
                production.id
            ))
        })?;
        let cost_price = unit_cost(material_cost, assembly.quantity);
        let showroom_product = showroom_product::ActiveModel {
            production_order_id: Set(production.id),
            assembly_order_id: Set(assembly.id),
            name: Set(production.product_name.clone()),
            category: Set(production.category.clone()),
            cost_price: Set(cost_price),
            sale_price: Set(sale_price.unwrap_or(cost_price)),
            showroom_status: Set(ShowroomStatus::Available),
            sold_date: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut active: assembly_order::ActiveModel = assembly.into();
        active.status = Set(AssemblyStatus::SentToShowroom);
        active.test_results = Set(results);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("showroom.batches_added");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ShowroomProductAdded {
                    showroom_product_id: showroom_product.id,
                    production_order_id: production.id,
                })
                .await;
        }
        info!(
            assembly_order_id = id,
            showroom_product_id = showroom_product.id,
            cost_price = %cost_price,
            "Batch promoted to showroom"
        );

        Ok(ShowroomPromotion::Promoted(Promoted {
            showroom_product,
            assembly_order: updated,
        }))
    }

    async fn emit_progress(&self, assembly: &assembly_order::Model) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::AssemblyProgressUpdated {
                    assembly_order_id: assembly.id,
                    progress: assembly.progress,
                    status: assembly.status,
                })
                .await;
        }
    }
}

async fn load_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<assembly_order::Model, ServiceError> {
    for_update(AssemblyOrderEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Assembly order", id))
}

async fn ensure_materials_allocated(
    txn: &DatabaseTransaction,
    production_order_id: i32,
) -> Result<(), ServiceError> {
    let production = ProductionOrderEntity::find_by_id(production_order_id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Production order", production_order_id))?;
    if production.status == ProductionStatus::Cancelled {
        return Err(ServiceError::InvalidStatus(format!(
            "Production order {} is cancelled",
            production_order_id
        )));
    }

    let purchase = PurchaseOrderEntity::find()
        .filter(purchase_order::Column::ProductionOrderId.eq(production_order_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;
    match purchase {
        Some(p) if p.status == PurchaseStatus::StoreAllocated => Ok(()),
        Some(p) => Err(ServiceError::InvalidStatus(format!(
            "Materials are not allocated yet (purchase order {} is {:?})",
            p.id, p.status
        ))),
        None => Err(ServiceError::not_found(
            "Purchase order for production order",
            production_order_id,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn progress_maps_to_status() {
        use AssemblyStatus::*;
        assert_eq!(status_for_progress(Pending, 100), Some(Completed));
        assert_eq!(status_for_progress(Paused, 30), Some(InProgress));
        assert_eq!(status_for_progress(Rework, 10), Some(InProgress));
        assert_eq!(status_for_progress(Paused, 0), Some(Paused));
        assert_eq!(status_for_progress(InProgress, 0), Some(Pending));
        assert_eq!(status_for_progress(InProgress, 101), None);
        assert_eq!(status_for_progress(InProgress, -1), None);
    }

    #[test]
    fn unit_cost_is_rounded_to_cents() {
        assert_eq!(unit_cost(dec!(100), 3), dec!(33.33));
        assert_eq!(unit_cost(dec!(50), 10), dec!(5));
    }
}

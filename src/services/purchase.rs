use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    db::{for_update, lock_key, RowLocks},
    entities::{
        finance_transaction::{self, FinanceKind},
        production_order::{self, Entity as ProductionOrderEntity, ProductionStatus},
        purchase_order::{self, Entity as PurchaseOrderEntity, MaterialLine, MaterialLines, PurchaseStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::inventory::{self, AllocationPlan},
};

/// Result of a store stock check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckResult {
    pub all_available: bool,
    pub shortages: Vec<MaterialLine>,
    pub new_status: PurchaseStatus,
    pub purchase_order: purchase_order::Model,
}

/// Result of purchase verification and re-allocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub new_status: PurchaseStatus,
    pub purchased: Vec<MaterialLine>,
    pub purchase_order: purchase_order::Model,
}

/// Drives the stock-check, finance approval and store verification sequence.
#[derive(Clone)]
pub struct PurchaseService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl PurchaseService {
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

    pub async fn get(&self, id: i32) -> Result<purchase_order::Model, ServiceError> {
        PurchaseOrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Purchase order", id))
    }

    /// Compares outstanding materials against the store and allocates what it can.
    #[instrument(skip(self))]
    pub async fn check_stock(&self, id: i32) -> Result<StockCheckResult, ServiceError> {
        let mut guard = self.locks.acquire_one(lock_key("purchase", id)).await;
        let current = self.get(id).await?;
        guard.extend(
            self.locks
                .acquire(material_keys(current.requirements(), &current.materials))
                .await,
        );

        let txn = super::begin(&self.db).await?;
        let purchase = load_for_update(&txn, id).await?;

        if !matches!(
            purchase.status,
            PurchaseStatus::Pending
                | PurchaseStatus::PartiallyAllocated
                | PurchaseStatus::InsufficientStock
                | PurchaseStatus::FinanceRejected
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Purchase order {} cannot be stock-checked while {:?}",
                id, purchase.status
            )));
        }
        ensure_production_active(&txn, purchase.production_order_id).await?;

        let snapshot = purchase
            .original_requirements
            .clone()
            .unwrap_or_else(|| purchase.materials.clone());
        let plan = run_allocation(&txn, &purchase.materials, &snapshot).await?;
        let new_status = status_for(&plan);
        let shortages = plan.shortages.clone();

        let production_order_id = purchase.production_order_id;
        let mut active: purchase_order::ActiveModel = purchase.clone().into();
        if purchase.original_requirements.is_none() {
            active.original_requirements = Set(Some(snapshot));
        }
        if !plan.is_complete() {
            active.materials = Set(MaterialLines(plan.shortages.clone()));
        }
        active.status = Set(new_status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        if new_status == PurchaseStatus::StoreAllocated {
            mark_materials_allocated(&txn, production_order_id).await?;
        }

        super::commit(txn).await?;
        drop(guard);

        metrics::increment_counter("purchase.stock_checks");
        if !shortages.is_empty() {
            warn!(purchase_order_id = id, shortages = ?shortages, "Stock check found shortages");
        }
        self.emit_allocation_events(&updated, shortages.len()).await;
        info!(purchase_order_id = id, status = ?new_status, "Stock check completed");

        Ok(StockCheckResult {
            all_available: shortages.is_empty(),
            shortages,
            new_status,
            purchase_order: updated,
        })
    }

    /// Records finance's decision on buying the outstanding materials.
    #[instrument(skip(self))]
    pub async fn decide_finance(
        &self,
        id: i32,
        approved: bool,
        decided_by: Option<String>,
    ) -> Result<purchase_order::Model, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("purchase", id)).await;
        let txn = super::begin(&self.db).await?;
        let purchase = load_for_update(&txn, id).await?;

        if !purchase.status.is_shortage() {
            return Err(ServiceError::InvalidStatus(format!(
                "Purchase order {} is not awaiting finance (status {:?})",
                id, purchase.status
            )));
        }

        let mut active: purchase_order::ActiveModel = purchase.into();
        active.status = Set(if approved {
            PurchaseStatus::FinanceApproved
        } else {
            PurchaseStatus::FinanceRejected
        });
        active.finance_decided_by = Set(decided_by);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter(if approved {
            "purchase.finance_approved"
        } else {
            "purchase.finance_rejected"
        });
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseFinanceDecided {
                    purchase_order_id: id,
                    approved,
                })
                .await;
        }
        info!(purchase_order_id = id, approved, "Purchase finance decision recorded");
        Ok(updated)
    }

    /// Books the purchased materials into the store and re-allocates the original requirement.
    #[instrument(skip(self))]
    pub async fn verify_and_allocate(&self, id: i32) -> Result<VerificationResult, ServiceError> {
        let mut guard = self.locks.acquire_one(lock_key("purchase", id)).await;
        let current = self.get(id).await?;
        guard.extend(
            self.locks
                .acquire(material_keys(current.requirements(), &current.materials))
                .await,
        );

        let txn = super::begin(&self.db).await?;
        let purchase = load_for_update(&txn, id).await?;

        if purchase.status != PurchaseStatus::FinanceApproved {
            return Err(ServiceError::InvalidStatus(format!(
                "Purchase order {} must be finance approved before verification (status {:?})",
                id, purchase.status
            )));
        }
        ensure_production_active(&txn, purchase.production_order_id).await?;

        let requirements = match &purchase.original_requirements {
            Some(snapshot) if !snapshot.is_empty() => snapshot.clone(),
            _ => {
                warn!(
                    purchase_order_id = id,
                    "No requirement snapshot recorded; treating outstanding materials as the requirement"
                );
                purchase.materials.clone()
            }
        };

        let purchased = purchased_lines(&purchase.materials, &requirements);
        for line in &purchased {
            inventory::add_stock_in(&txn, &line.name, line.quantity, None).await?;
            let cost = line.line_cost().ok_or_else(|| {
                ServiceError::ValidationError(format!("Purchase cost of {} is too large", line.name))
            })?;
            finance_transaction::ActiveModel {
                kind: Set(FinanceKind::Expense),
                amount: Set(cost),
                description: Set(format!("Purchase of {} x {}", line.quantity, line.name)),
                reference_type: Set("purchase_order".to_string()),
                reference_id: Set(id),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        let plan = run_allocation(&txn, &purchase.materials, &requirements).await?;
        let new_status = status_for(&plan);
        let production_order_id = purchase.production_order_id;

        let mut active: purchase_order::ActiveModel = purchase.clone().into();
        if purchase.original_requirements.is_none() {
            active.original_requirements = Set(Some(requirements));
        }
        if !plan.is_complete() {
            active.materials = Set(MaterialLines(plan.shortages.clone()));
        }
        active.status = Set(new_status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        if new_status == PurchaseStatus::StoreAllocated {
            mark_materials_allocated(&txn, production_order_id).await?;
        }

        super::commit(txn).await?;
        drop(guard);

        metrics::increment_counter("purchase.verifications");
        self.emit_allocation_events(&updated, plan.shortages.len()).await;
        info!(purchase_order_id = id, status = ?new_status, "Purchase verified and allocated");

        Ok(VerificationResult {
            new_status,
            purchased,
            purchase_order: updated,
        })
    }

    async fn emit_allocation_events(&self, purchase: &purchase_order::Model, shortage_count: usize) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockChecked {
                    purchase_order_id: purchase.id,
                    status: purchase.status,
                    shortage_count,
                })
                .await;
            if purchase.status == PurchaseStatus::StoreAllocated {
                sender
                    .send_or_log(Event::MaterialsAllocated {
                        purchase_order_id: purchase.id,
                        production_order_id: purchase.production_order_id,
                    })
                    .await;
            }
        }
    }
}

fn material_keys(requirements: &MaterialLines, outstanding: &MaterialLines) -> Vec<String> {
    requirements
        .iter()
        .chain(outstanding.iter())
        .map(|line| lock_key("inventory", &line.name))
        .collect()
}

/// Status after an allocation run
pub fn status_for(plan: &AllocationPlan) -> PurchaseStatus {
    if plan.is_complete() {
        PurchaseStatus::StoreAllocated
    } else if plan.any_drawn {
        PurchaseStatus::PartiallyAllocated
    } else {
        PurchaseStatus::InsufficientStock
    }
}

/// Lines bought on verification: the full requirement of every outstanding material.
pub fn purchased_lines(outstanding: &MaterialLines, requirements: &MaterialLines) -> Vec<MaterialLine> {
    outstanding
        .iter()
        .map(|line| {
            let quantity = requirements
                .iter()
                .find(|r| r.name == line.name)
                .map(|r| r.quantity)
                .unwrap_or(line.quantity);
            MaterialLine {
                name: line.name.clone(),
                quantity,
                unit_cost: line.unit_cost,
            }
        })
        .collect()
}

async fn load_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<purchase_order::Model, ServiceError> {
    for_update(PurchaseOrderEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Purchase order", id))
}

async fn ensure_production_active(
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
    Ok(())
}

async fn run_allocation(
    txn: &DatabaseTransaction,
    outstanding: &MaterialLines,
    requirements: &MaterialLines,
) -> Result<AllocationPlan, ServiceError> {
    let names: Vec<String> = outstanding.iter().map(|l| l.name.clone()).collect();
    let stock = inventory::stock_levels(txn, &names).await?;
    let plan = inventory::plan_allocation(outstanding, Some(requirements), &stock);
    for draw in &plan.draws {
        inventory::allocate_in(txn, &draw.name, draw.quantity).await?;
    }
    Ok(plan)
}

async fn mark_materials_allocated(
    txn: &DatabaseTransaction,
    production_order_id: i32,
) -> Result<(), ServiceError> {
    let production = ProductionOrderEntity::find_by_id(production_order_id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Production order", production_order_id))?;
    let mut active: production_order::ActiveModel = production.into();
    active.status = Set(ProductionStatus::MaterialsAllocated);
    active.update(txn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(name: &str, quantity: i32) -> MaterialLine {
        MaterialLine {
            name: name.to_string(),
            quantity,
            unit_cost: Decimal::from(10),
        }
    }

    #[test]
    fn verification_buys_the_whole_requirement_not_the_gap() {
        let requirements = MaterialLines(vec![line("Steel", 5), line("Oak", 2)]);
        let outstanding = MaterialLines(vec![line("Steel", 2)]);
        assert_eq!(
            purchased_lines(&outstanding, &requirements),
            vec![line("Steel", 5)]
        );
    }

    #[test]
    fn status_follows_plan_shape() {
        let complete = AllocationPlan {
            draws: vec![line("Steel", 5)],
            shortages: vec![],
            any_drawn: true,
        };
        assert_eq!(status_for(&complete), PurchaseStatus::StoreAllocated);

        let partial = AllocationPlan {
            draws: vec![],
            shortages: vec![line("Oak", 1)],
            any_drawn: true,
        };
        assert_eq!(status_for(&partial), PurchaseStatus::PartiallyAllocated);

        let none = AllocationPlan {
            draws: vec![],
            shortages: vec![line("Oak", 1)],
            any_drawn: false,
        };
        assert_eq!(status_for(&none), PurchaseStatus::InsufficientStock);
    }
}

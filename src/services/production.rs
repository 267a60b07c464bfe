use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::{for_update, lock_key, RowLocks},
    entities::{
        assembly_order::{self, Entity as AssemblyOrderEntity},
        production_order::{self, Entity as ProductionOrderEntity, ProductionStatus},
        purchase_order::{self, Entity as PurchaseOrderEntity, MaterialLine, MaterialLines, PurchaseStatus},
        showroom_product::{self, Entity as ShowroomProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::order_status::{derive_status, DerivedStatus, StatusInputs},
};

/// Input for a new manufacturing batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductionOrder {
    pub product_name: String,
    pub category: String,
    pub quantity: i32,
    pub materials: Vec<MaterialLine>,
}

/// Rows created together for one production order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionOrderBundle {
    pub production_order: production_order::Model,
    pub purchase_order: purchase_order::Model,
    pub assembly_order: assembly_order::Model,
}

/// A production order with its children and the status derived from them
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionOrderView {
    pub production_order: production_order::Model,
    pub purchase_order: Option<purchase_order::Model>,
    pub assembly_order: Option<assembly_order::Model>,
    pub showroom_product: Option<showroom_product::Model>,
    pub derived_status: DerivedStatus,
}

impl ProductionOrderView {
    fn build(
        production_order: production_order::Model,
        purchase_order: Option<purchase_order::Model>,
        assembly_order: Option<assembly_order::Model>,
        showroom_product: Option<showroom_product::Model>,
    ) -> Self {
        let derived_status = derive_status(
            production_order.status,
            StatusInputs {
                purchase: purchase_order.as_ref().map(|p| p.status),
                assembly: assembly_order.as_ref().map(|a| (a.status, a.progress)),
                showroom: showroom_product.as_ref().map(|s| s.showroom_status),
            },
        );
        Self {
            production_order,
            purchase_order,
            assembly_order,
            showroom_product,
            derived_status,
        }
    }
}

pub fn validate_materials(materials: &[MaterialLine]) -> Result<(), ServiceError> {
    if materials.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one material is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for line in materials {
        let name = line.name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Material name is required".to_string(),
            ));
        }
        if !seen.insert(name.to_string()) {
            return Err(ServiceError::ValidationError(format!(
                "Material {} is listed more than once",
                name
            )));
        }
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Material {} quantity must be positive",
                name
            )));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Material {} unit cost cannot be negative",
                name
            )));
        }
    }
    let total = materials
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.line_cost()?));
    if total.is_none() {
        return Err(ServiceError::ValidationError(
            "Total material cost is too large".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductionService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl ProductionService {
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

    /// Creates a production order with its purchase and assembly orders
    #[instrument(skip(self, input), fields(product = %input.product_name, quantity = input.quantity))]
    pub async fn create(
        &self,
        input: NewProductionOrder,
    ) -> Result<ProductionOrderBundle, ServiceError> {
        if input.product_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Product name is required".to_string(),
            ));
        }
        if input.category.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Category is required".to_string(),
            ));
        }
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {}",
                input.quantity
            )));
        }
        validate_materials(&input.materials)?;

        let materials = MaterialLines(
            input
                .materials
                .into_iter()
                .map(|line| MaterialLine {
                    name: line.name.trim().to_string(),
                    ..line
                })
                .collect(),
        );

        let txn = super::begin(&self.db).await?;

        let production_order = production_order::ActiveModel {
            product_name: Set(input.product_name.trim().to_string()),
            category: Set(input.category.trim().to_string()),
            quantity: Set(input.quantity),
            status: Set(ProductionStatus::Created),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let purchase_order = purchase_order::ActiveModel {
            production_order_id: Set(production_order.id),
            materials: Set(materials),
            original_requirements: Set(None),
            status: Set(PurchaseStatus::Pending),
            finance_decided_by: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let assembly_order = assembly_order::ActiveModel {
            production_order_id: Set(production_order.id),
            quantity: Set(input.quantity),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        super::commit(txn).await?;

        metrics::increment_counter("production.orders.created");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ProductionOrderCreated {
                    production_order_id: production_order.id,
                    purchase_order_id: purchase_order.id,
                    assembly_order_id: assembly_order.id,
                })
                .await;
        }
        info!(
            production_order_id = production_order.id,
            purchase_order_id = purchase_order.id,
            assembly_order_id = assembly_order.id,
            "Production order created"
        );

        Ok(ProductionOrderBundle {
            production_order,
            purchase_order,
            assembly_order,
        })
    }

    pub async fn get(&self, id: i32) -> Result<ProductionOrderView, ServiceError> {
        let db = &*self.db;
        let production = ProductionOrderEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Production order", id))?;

        let purchase = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::ProductionOrderId.eq(id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;
        let assembly = AssemblyOrderEntity::find()
            .filter(assembly_order::Column::ProductionOrderId.eq(id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;
        let showroom = ShowroomProductEntity::find()
            .filter(showroom_product::Column::ProductionOrderId.eq(id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(ProductionOrderView::build(production, purchase, assembly, showroom))
    }

    /// Lists production orders newest first, with derived status
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductionOrderView>, u64), ServiceError> {
        let db = &*self.db;
        let paginator = ProductionOrderEntity::find()
            .order_by_desc(production_order::Column::Id)
            .paginate(db, per_page.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
        let mut purchases: HashMap<i32, purchase_order::Model> = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::ProductionOrderId.is_in(ids.clone()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|p| (p.production_order_id, p))
            .collect();
        let mut assemblies: HashMap<i32, assembly_order::Model> = AssemblyOrderEntity::find()
            .filter(assembly_order::Column::ProductionOrderId.is_in(ids.clone()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|a| (a.production_order_id, a))
            .collect();
        let mut showrooms: HashMap<i32, showroom_product::Model> = ShowroomProductEntity::find()
            .filter(showroom_product::Column::ProductionOrderId.is_in(ids))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|s| (s.production_order_id, s))
            .collect();

        let views = orders
            .into_iter()
            .map(|order| {
                let id = order.id;
                ProductionOrderView::build(
                    order,
                    purchases.remove(&id),
                    assemblies.remove(&id),
                    showrooms.remove(&id),
                )
            })
            .collect();
        Ok((views, total))
    }

    /// Cancels a batch that has not reached the showroom. Stock already drawn stays with the batch.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: i32) -> Result<ProductionOrderView, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("production", id)).await;
        let txn = super::begin(&self.db).await?;

        let production = for_update(
            ProductionOrderEntity::find_by_id(id),
            txn.get_database_backend(),
        )
        .one(&txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Production order", id))?;

        if production.status == ProductionStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "Production order {} is already cancelled",
                id
            )));
        }

        let showroom = ShowroomProductEntity::find()
            .filter(showroom_product::Column::ProductionOrderId.eq(id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if showroom.is_some() {
            return Err(ServiceError::InvalidStatus(format!(
                "Production order {} already has a showroom batch",
                id
            )));
        }

        if let Some(purchase) = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::ProductionOrderId.eq(id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
        {
            if !matches!(
                purchase.status,
                PurchaseStatus::StoreAllocated | PurchaseStatus::Cancelled
            ) {
                let mut active: purchase_order::ActiveModel = purchase.into();
                active.status = Set(PurchaseStatus::Cancelled);
                active.update(&txn).await.map_err(ServiceError::db_error)?;
            }
        }

        let mut active: production_order::ActiveModel = production.into();
        active.status = Set(ProductionStatus::Cancelled);
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        super::commit(txn).await?;

        metrics::increment_counter("production.orders.cancelled");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::ProductionOrderCancelled(id)).await;
        }
        info!(production_order_id = id, "Production order cancelled");
        self.get(id).await
    }

    /// Changes the batch size while the purchase has not been checked against stock.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        id: i32,
        quantity: i32,
    ) -> Result<ProductionOrderView, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {}",
                quantity
            )));
        }

        let _guard = self.locks.acquire_one(lock_key("production", id)).await;
        let txn = super::begin(&self.db).await?;

        let production = for_update(
            ProductionOrderEntity::find_by_id(id),
            txn.get_database_backend(),
        )
        .one(&txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Production order", id))?;

        if production.status == ProductionStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "Production order {} is cancelled",
                id
            )));
        }

        let purchase = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::ProductionOrderId.eq(id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Purchase order for production order", id))?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Quantity can only change before the stock check (purchase status {:?})",
                purchase.status
            )));
        }

        let old_quantity = production.quantity;
        let mut active: production_order::ActiveModel = production.into();
        active.quantity = Set(quantity);
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        if let Some(assembly) = AssemblyOrderEntity::find()
            .filter(assembly_order::Column::ProductionOrderId.eq(id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
        {
            let mut active: assembly_order::ActiveModel = assembly.into();
            active.quantity = Set(quantity);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        super::commit(txn).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ProductionQuantityChanged {
                    production_order_id: id,
                    old_quantity,
                    new_quantity: quantity,
                })
                .await;
        }
        info!(production_order_id = id, old_quantity, quantity, "Production quantity updated");
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(name: &str, quantity: i32) -> MaterialLine {
        MaterialLine {
            name: name.to_string(),
            quantity,
            unit_cost: dec!(12.5),
        }
    }

    #[test]
    fn materials_must_be_present_unique_and_positive() {
        assert_matches!(validate_materials(&[]), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            validate_materials(&[line("Oak", 2), line(" Oak ", 1)]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_materials(&[line("Oak", 0)]),
            Err(ServiceError::ValidationError(_))
        );
        assert!(validate_materials(&[line("Oak", 2), line("Steel", 5)]).is_ok());
    }
}

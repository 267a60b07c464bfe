use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    entities::{
        assembly_order::Entity as AssemblyOrderEntity,
        sales_order::{self, Entity as SalesOrderEntity, OrderStatus},
        showroom_product::{self, Entity as ShowroomProductEntity, ShowroomStatus},
    },
    errors::ServiceError,
};

/// A showroom batch with its freshly computed sellable quantity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowroomView {
    #[serde(flatten)]
    pub product: showroom_product::Model,
    pub batch_quantity: i32,
    pub remaining_quantity: i32,
}

/// Units of a batch committed to non-cancelled sales orders.
pub async fn sold_quantity<C: ConnectionTrait>(
    conn: &C,
    showroom_product_id: i32,
) -> Result<i32, ServiceError> {
    let orders = SalesOrderEntity::find()
        .filter(sales_order::Column::ShowroomProductId.eq(showroom_product_id))
        .filter(sales_order::Column::OrderStatus.ne(OrderStatus::Cancelled))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(orders.iter().map(|o| o.quantity).sum())
}

/// Size of the assembled batch behind a showroom product.
pub async fn batch_quantity<C: ConnectionTrait>(
    conn: &C,
    product: &showroom_product::Model,
) -> Result<i32, ServiceError> {
    let assembly = AssemblyOrderEntity::find_by_id(product.assembly_order_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Assembly order", product.assembly_order_id))?;
    Ok(assembly.quantity)
}

/// `batch quantity - Σ non-cancelled sales quantity`, recomputed on every call.
pub async fn remaining_quantity<C: ConnectionTrait>(
    conn: &C,
    product: &showroom_product::Model,
) -> Result<i32, ServiceError> {
    let batch = batch_quantity(conn, product).await?;
    let sold = sold_quantity(conn, product.id).await?;
    Ok(batch - sold)
}

pub async fn view<C: ConnectionTrait>(
    conn: &C,
    product: showroom_product::Model,
) -> Result<ShowroomView, ServiceError> {
    let batch = batch_quantity(conn, &product).await?;
    let sold = sold_quantity(conn, product.id).await?;
    Ok(ShowroomView {
        product,
        batch_quantity: batch,
        remaining_quantity: (batch - sold).max(0),
    })
}

#[derive(Clone)]
pub struct ShowroomService {
    db: Arc<DatabaseConnection>,
}

impl ShowroomService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i32) -> Result<ShowroomView, ServiceError> {
        let product = ShowroomProductEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Showroom product", id))?;
        view(&*self.db, product).await
    }

    /// Batches still on sale, each with at least one unit left
    pub async fn list_available(&self) -> Result<Vec<ShowroomView>, ServiceError> {
        let products = ShowroomProductEntity::find()
            .filter(showroom_product::Column::ShowroomStatus.eq(ShowroomStatus::Available))
            .order_by_asc(showroom_product::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut views = Vec::with_capacity(products.len());
        for product in products {
            let view = view(&*self.db, product).await?;
            if view.remaining_quantity > 0 {
                views.push(view);
            }
        }
        Ok(views)
    }
}

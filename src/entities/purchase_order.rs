use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait, FromJsonQueryResult};
use serde::{Deserialize, Serialize};

/// One material line of a purchase order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLine {
    pub name: String,
    pub quantity: i32,
    #[serde(default)]
    pub unit_cost: Decimal,
}

impl MaterialLine {
    /// `quantity × unit_cost`, or `None` past the decimal range.
    pub fn line_cost(&self) -> Option<Decimal> {
        self.unit_cost.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct MaterialLines(pub Vec<MaterialLine>);

impl MaterialLines {
    pub fn iter(&self) -> std::slice::Iter<'_, MaterialLine> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total cost of the lines, `Σ quantity × unit_cost`, or `None` past the decimal range.
    pub fn total_cost(&self) -> Option<Decimal> {
        self.0
            .iter()
            .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.line_cost()?))
    }
}

impl From<Vec<MaterialLine>> for MaterialLines {
    fn from(lines: Vec<MaterialLine>) -> Self {
        Self(lines)
    }
}

/// Material purchase tracked for a single production order.
///
/// `materials` holds what is still outstanding; after a short stock check it is overwritten
/// with the shortage lines. `original_requirements` is written once, at the first stock check,
/// and never touched again.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub production_order_id: i32,
    #[sea_orm(column_type = "Json")]
    pub materials: MaterialLines,
    #[sea_orm(column_type = "Json", nullable)]
    pub original_requirements: Option<MaterialLines>,
    pub status: PurchaseStatus,
    pub finance_decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Requirement lines used for allocation: the snapshot when present, else the
    /// outstanding materials.
    pub fn requirements(&self) -> &MaterialLines {
        self.original_requirements
            .as_ref()
            .unwrap_or(&self.materials)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "partially_allocated")]
    PartiallyAllocated,
    #[sea_orm(string_value = "insufficient_stock")]
    InsufficientStock,
    #[sea_orm(string_value = "finance_approved")]
    FinanceApproved,
    #[sea_orm(string_value = "finance_rejected")]
    FinanceRejected,
    #[sea_orm(string_value = "store_allocated")]
    StoreAllocated,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl PurchaseStatus {
    /// Statuses that leave material outstanding and wait on finance.
    pub fn is_shortage(self) -> bool {
        matches!(self, Self::PartiallyAllocated | Self::InsufficientStock)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_order::Entity",
        from = "Column::ProductionOrderId",
        to = "super::production_order::Column::Id"
    )]
    ProductionOrder,
}

impl Related<super::production_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionOrder.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(now);
            }
            if let ActiveValue::NotSet = self.status {
                self.status = ActiveValue::Set(PurchaseStatus::Pending);
            }
        }
        self.updated_at = ActiveValue::Set(now);
        Ok(self)
    }
}

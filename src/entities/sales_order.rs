use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_number: String,
    pub showroom_product_id: i32,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub transport_cost: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub delivery_type: DeliveryType,
    pub previous_delivery_type: Option<DeliveryType>,
    pub coupon_code: Option<String>,
    pub finance_bypass: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Whether payment allows the order to leave for dispatch.
    pub fn is_payment_cleared(&self) -> bool {
        self.payment_status == PaymentStatus::Completed || self.finance_bypass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "pending_finance_approval")]
    PendingFinanceApproval,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(40))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending_transport_approval")]
    PendingTransportApproval,
    #[sea_orm(string_value = "pending_free_delivery_approval")]
    PendingFreeDeliveryApproval,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Delivery literals exposed to the frontend exactly as written.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[strum(ascii_case_insensitive)]
pub enum DeliveryType {
    #[sea_orm(string_value = "self delivery")]
    #[serde(rename = "self delivery")]
    #[strum(serialize = "self delivery")]
    SelfDelivery,
    #[sea_orm(string_value = "company delivery")]
    #[serde(rename = "company delivery")]
    #[strum(serialize = "company delivery")]
    CompanyDelivery,
    #[sea_orm(string_value = "part load")]
    #[serde(rename = "part load")]
    #[strum(serialize = "part load")]
    PartLoad,
    #[sea_orm(string_value = "free delivery")]
    #[serde(rename = "free delivery")]
    #[strum(serialize = "free delivery")]
    FreeDelivery,
}

impl DeliveryType {
    /// Company delivery and part load go through transport cost negotiation.
    pub fn needs_transport_approval(self) -> bool {
        matches!(self, Self::CompanyDelivery | Self::PartLoad)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parses a literal as typed by a user: surrounding spaces and letter case are ignored.
    pub fn from_literal(raw: &str) -> Result<Self, String> {
        raw.trim()
            .parse()
            .map_err(|_| format!("unknown delivery type '{}'", raw.trim()))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::showroom_product::Entity",
        from = "Column::ShowroomProductId",
        to = "super::showroom_product::Column::Id"
    )]
    ShowroomProduct,
    #[sea_orm(has_many = "super::sales_transaction::Entity")]
    Payments,
}

impl Related<super::showroom_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowroomProduct.def()
    }
}

impl Related<super::sales_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
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
            if let ActiveValue::NotSet = self.finance_bypass {
                self.finance_bypass = ActiveValue::Set(false);
            }
        }
        self.updated_at = ActiveValue::Set(now);
        Ok(self)
    }
}

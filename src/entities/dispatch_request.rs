use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Dispatch of one confirmed sales order out of the showroom.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispatch_requests")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub sales_order_id: i32,
    pub showroom_product_id: i32,
    pub delivery_kind: DispatchKind,
    pub status: DispatchStatus,
    pub party_name: String,
    pub party_contact: Option<String>,
    pub party_address: Option<String>,
    pub vehicle_id: Option<i32>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Contact is always needed; an address only when the company transports the goods.
    pub fn has_required_details(&self) -> bool {
        details_complete(
            self.delivery_kind,
            self.party_contact.as_deref(),
            self.party_address.as_deref(),
        )
    }
}

pub fn details_complete(kind: DispatchKind, contact: Option<&str>, address: Option<&str>) -> bool {
    let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);
    match kind {
        DispatchKind::SelfPickup => present(contact),
        DispatchKind::Transport => present(contact) && present(address),
    }
}

/// Stored as its literal through strum; `self` cannot be an active-enum variant name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    DeriveValueType,
    ToSchema,
    strum::EnumString,
    strum::Display,
)]
#[sea_orm(value_type = "String")]
pub enum DispatchKind {
    #[serde(rename = "self")]
    #[strum(serialize = "self")]
    SelfPickup,
    #[serde(rename = "transport")]
    #[strum(serialize = "transport")]
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "customer_details_required")]
    CustomerDetailsRequired,
    #[sea_orm(string_value = "ready_for_load")]
    ReadyForLoad,
    #[sea_orm(string_value = "assigned_transport")]
    AssignedTransport,
    #[sea_orm(string_value = "loaded")]
    Loaded,
    #[sea_orm(string_value = "entered_for_pickup")]
    EnteredForPickup,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_order::Entity",
        from = "Column::SalesOrderId",
        to = "super::sales_order::Column::Id"
    )]
    SalesOrder,
}

impl Related<super::sales_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesOrder.def()
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
        }
        self.updated_at = ActiveValue::Set(now);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_pickup_needs_only_contact() {
        assert!(details_complete(DispatchKind::SelfPickup, Some("98450 11223"), None));
        assert!(!details_complete(DispatchKind::SelfPickup, Some("  "), None));
        assert!(!details_complete(DispatchKind::Transport, Some("98450 11223"), None));
        assert!(details_complete(
            DispatchKind::Transport,
            Some("98450 11223"),
            Some("12 MG Road")
        ));
    }

    #[test]
    fn pickup_is_stored_and_sent_as_self() {
        assert_eq!(DispatchKind::SelfPickup.to_string(), "self");
        assert_eq!("transport".parse::<DispatchKind>().unwrap(), DispatchKind::Transport);
        assert!("pickup".parse::<DispatchKind>().is_err());
        assert_eq!(
            sea_orm::Value::from(DispatchKind::SelfPickup),
            sea_orm::Value::from("self".to_string())
        );
        assert_eq!(
            serde_json::to_value(DispatchKind::SelfPickup).unwrap(),
            serde_json::json!("self")
        );
    }
}

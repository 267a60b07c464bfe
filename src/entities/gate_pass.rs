use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};

/// Physical release authorization for a self-pickup dispatch.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gate_passes")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub dispatch_request_id: i32,
    pub sales_order_id: i32,
    pub customer_name: String,
    pub vehicle_number: Option<String>,
    pub status: GatePassStatus,
    pub mismatch_attempts: i32,
    pub last_attempted_name: Option<String>,
    pub override_by: Option<String>,
    pub released_by: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum GatePassStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "entered_for_pickup")]
    EnteredForPickup,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl GatePassStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::EnteredForPickup)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dispatch_request::Entity",
        from = "Column::DispatchRequestId",
        to = "super::dispatch_request::Column::Id"
    )]
    DispatchRequest,
}

impl Related<super::dispatch_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DispatchRequest.def()
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
                self.status = ActiveValue::Set(GatePassStatus::Pending);
            }
            if let ActiveValue::NotSet = self.mismatch_attempts {
                self.mismatch_attempts = ActiveValue::Set(0);
            }
        }
        self.updated_at = ActiveValue::Set(now);
        Ok(self)
    }
}

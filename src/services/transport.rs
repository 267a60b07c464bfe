//! Transport cost negotiation between sales and the transport desk.
//!
//! A request moves `pending -> approved | rejected` and back from `rejected` to `pending` on a
//! counter-offer. Each step writes the request and its sales order in one transaction under the
//! order's row lock.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    db::{for_update, lock_key, RowLocks},
    entities::{
        sales_order::{self, DeliveryType, OrderStatus},
        transport_approval::{self, Entity as TransportApprovalEntity, TransportApprovalStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        pricing::{final_amount, settle_payment_status, validate_amounts},
        sales::{amount_paid, load_order_for_update},
    },
};

/// How sales answers a transport demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DemandAction {
    /// Take the demanded amount as the transport cost
    Accept,
    /// Drop company transport; the customer collects
    Decline,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationOutcome {
    pub transport_request: transport_approval::Model,
    pub sales_order: sales_order::Model,
}

/// Returns the pending request for an order, opening one when none exists.
/// The flag is `true` when a new row was inserted.
pub(crate) async fn open_request_in<C: ConnectionTrait>(
    conn: &C,
    order: &sales_order::Model,
) -> Result<(transport_approval::Model, bool), ServiceError> {
    let existing = TransportApprovalEntity::find()
        .filter(transport_approval::Column::SalesOrderId.eq(order.id))
        .filter(transport_approval::Column::Status.eq(TransportApprovalStatus::Pending))
        .order_by_desc(transport_approval::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if let Some(existing) = existing {
        return Ok((existing, false));
    }

    let request = transport_approval::ActiveModel {
        sales_order_id: Set(order.id),
        delivery_type: Set(order.delivery_type),
        original_transport_cost: Set(order.transport_cost),
        requested_transport_cost: Set(order.transport_cost),
        demand_amount: Set(None),
        status: Set(TransportApprovalStatus::Pending),
        negotiation_round: Set(0),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;
    metrics::increment_counter("transport.requests.created");
    Ok((request, true))
}

async fn load_request_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<transport_approval::Model, ServiceError> {
    for_update(
        TransportApprovalEntity::find_by_id(id),
        txn.get_database_backend(),
    )
    .one(txn)
    .await
    .map_err(ServiceError::db_error)?
    .ok_or_else(|| ServiceError::not_found("Transport request", id))
}

fn ensure_awaiting_transport(order: &sales_order::Model) -> Result<(), ServiceError> {
    if order.order_status != OrderStatus::PendingTransportApproval {
        return Err(ServiceError::InvalidStatus(format!(
            "Sales order {} is not awaiting transport approval (status {:?})",
            order.id, order.order_status
        )));
    }
    Ok(())
}

fn validate_cost(amount: Decimal, what: &str) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            what
        )));
    }
    Ok(())
}

/// Writes a new transport cost onto the order and re-derives its totals.
async fn reprice_transport(
    txn: &DatabaseTransaction,
    order: sales_order::Model,
    transport_cost: Decimal,
    delivery_type: DeliveryType,
    order_status: OrderStatus,
) -> Result<sales_order::Model, ServiceError> {
    validate_amounts(
        order.unit_price,
        order.quantity,
        transport_cost,
        order.discount_amount,
    )?;
    let total = final_amount(
        order.unit_price,
        order.quantity,
        transport_cost,
        order.discount_amount,
    )?;
    let paid = amount_paid(txn, order.id).await?;
    let payment_status = settle_payment_status(order.payment_status, paid, total);
    let previous_delivery = order.delivery_type;

    let mut active: sales_order::ActiveModel = order.into();
    if delivery_type != previous_delivery {
        active.previous_delivery_type = Set(Some(previous_delivery));
        active.delivery_type = Set(delivery_type);
    }
    active.transport_cost = Set(transport_cost);
    active.final_amount = Set(total);
    active.payment_status = Set(payment_status);
    active.order_status = Set(order_status);
    active.update(txn).await.map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct TransportService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl TransportService {
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

    pub async fn get(&self, id: i32) -> Result<transport_approval::Model, ServiceError> {
        TransportApprovalEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Transport request", id))
    }

    /// Requests waiting on the transport desk, oldest first
    pub async fn list_pending(&self) -> Result<Vec<transport_approval::Model>, ServiceError> {
        TransportApprovalEntity::find()
            .filter(transport_approval::Column::Status.eq(TransportApprovalStatus::Pending))
            .order_by_asc(transport_approval::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn list_for_order(
        &self,
        sales_order_id: i32,
    ) -> Result<Vec<transport_approval::Model>, ServiceError> {
        TransportApprovalEntity::find()
            .filter(transport_approval::Column::SalesOrderId.eq(sales_order_id))
            .order_by_asc(transport_approval::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Opens a negotiation for an order; returns the pending one if it already exists.
    #[instrument(skip(self))]
    pub async fn create_request(
        &self,
        sales_order_id: i32,
    ) -> Result<(transport_approval::Model, bool), ServiceError> {
        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, sales_order_id).await?;
        if !order.delivery_type.needs_transport_approval() {
            return Err(ServiceError::InvalidOperation(format!(
                "{} does not need transport approval",
                order.delivery_type.as_str()
            )));
        }
        ensure_awaiting_transport(&order)?;

        let (request, created) = open_request_in(&txn, &order).await?;
        super::commit(txn).await?;

        if created {
            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::TransportRequestCreated {
                        approval_id: request.id,
                        sales_order_id,
                    })
                    .await;
            }
            info!(approval_id = request.id, sales_order_id, "Transport request opened");
        }
        Ok((request, created))
    }

    /// Transport accepts the current cost; the order is confirmed.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        id: i32,
        approved_by: Option<String>,
    ) -> Result<NegotiationOutcome, ServiceError> {
        let sales_order_id = self.get(id).await?.sales_order_id;
        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let request = load_request_for_update(&txn, id).await?;
        if request.status != TransportApprovalStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Transport request {} is already {:?}",
                id, request.status
            )));
        }
        let order = load_order_for_update(&txn, sales_order_id).await?;
        ensure_awaiting_transport(&order)?;

        let delivery_type = order.delivery_type;
        let order = reprice_transport(
            &txn,
            order,
            request.original_transport_cost,
            delivery_type,
            OrderStatus::Confirmed,
        )
        .await?;

        let mut active: transport_approval::ActiveModel = request.into();
        active.status = Set(TransportApprovalStatus::Approved);
        active.approved_by = Set(approved_by);
        let request = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport.requests.approved");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::TransportRequestApproved(id)).await;
        }
        info!(approval_id = id, sales_order_id, transport_cost = %order.transport_cost, "Transport request approved");
        Ok(NegotiationOutcome {
            transport_request: request,
            sales_order: order,
        })
    }

    /// Transport refuses the current cost and names its price. The order keeps its visible
    /// transport cost until sales answers.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        id: i32,
        demand_amount: Decimal,
        rejected_by: Option<String>,
        notes: Option<String>,
    ) -> Result<NegotiationOutcome, ServiceError> {
        validate_cost(demand_amount, "Demand amount")?;
        let sales_order_id = self.get(id).await?.sales_order_id;
        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let request = load_request_for_update(&txn, id).await?;
        if request.status != TransportApprovalStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Transport request {} is already {:?}",
                id, request.status
            )));
        }
        let order = load_order_for_update(&txn, sales_order_id).await?;
        ensure_awaiting_transport(&order)?;

        let mut active: transport_approval::ActiveModel = request.into();
        active.status = Set(TransportApprovalStatus::Rejected);
        active.demand_amount = Set(Some(demand_amount));
        active.rejected_by = Set(rejected_by);
        if notes.is_some() {
            active.notes = Set(notes);
        }
        let request = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport.requests.rejected");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::TransportRequestRejected {
                    approval_id: id,
                    demand_amount,
                })
                .await;
        }
        info!(approval_id = id, sales_order_id, demand = %demand_amount, "Transport request rejected with demand");
        Ok(NegotiationOutcome {
            transport_request: request,
            sales_order: order,
        })
    }

    /// Sales answers a transport demand.
    #[instrument(skip(self))]
    pub async fn confirm_demand(
        &self,
        id: i32,
        action: DemandAction,
        confirmed_by: Option<String>,
    ) -> Result<NegotiationOutcome, ServiceError> {
        let sales_order_id = self.get(id).await?.sales_order_id;
        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let request = load_request_for_update(&txn, id).await?;
        let demand = match (request.status, request.demand_amount) {
            (TransportApprovalStatus::Rejected, Some(demand)) => demand,
            _ => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Transport request {} has no open demand",
                    id
                )))
            }
        };
        let order = load_order_for_update(&txn, sales_order_id).await?;
        ensure_awaiting_transport(&order)?;

        let (request, order) = match action {
            DemandAction::Accept => {
                let delivery_type = order.delivery_type;
                let order =
                    reprice_transport(&txn, order, demand, delivery_type, OrderStatus::Confirmed)
                        .await?;
                let mut active: transport_approval::ActiveModel = request.into();
                active.status = Set(TransportApprovalStatus::Approved);
                active.approved_by = Set(confirmed_by);
                let request = active.update(&txn).await.map_err(ServiceError::db_error)?;
                (request, order)
            }
            DemandAction::Decline => {
                let order = reprice_transport(
                    &txn,
                    order,
                    Decimal::ZERO,
                    DeliveryType::SelfDelivery,
                    OrderStatus::Confirmed,
                )
                .await?;
                let mut active: transport_approval::ActiveModel = request.into();
                active.notes = Set(Some(
                    "Demand declined; customer collects".to_string(),
                ));
                let request = active.update(&txn).await.map_err(ServiceError::db_error)?;
                (request, order)
            }
        };
        super::commit(txn).await?;

        if let Some(sender) = &self.event_sender {
            let event = match action {
                DemandAction::Accept => Event::TransportDemandAccepted {
                    approval_id: id,
                    transport_cost: demand,
                },
                DemandAction::Decline => Event::TransportDemandDeclined(id),
            };
            sender.send_or_log(event).await;
        }
        info!(approval_id = id, sales_order_id, action = ?action, "Transport demand answered");
        Ok(NegotiationOutcome {
            transport_request: request,
            sales_order: order,
        })
    }

    /// Sales counters a rejected request. The counter becomes the new baseline, the request
    /// goes back to pending, and the order shows the counter value until transport reviews it.
    #[instrument(skip(self))]
    pub async fn renegotiate(
        &self,
        id: i32,
        negotiated_amount: Decimal,
        notes: Option<String>,
    ) -> Result<NegotiationOutcome, ServiceError> {
        validate_cost(negotiated_amount, "Negotiated amount")?;
        let sales_order_id = self.get(id).await?.sales_order_id;
        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let request = load_request_for_update(&txn, id).await?;
        if request.status != TransportApprovalStatus::Rejected {
            return Err(ServiceError::InvalidStatus(format!(
                "Only rejected transport requests can be renegotiated; request {} is {:?}",
                id, request.status
            )));
        }
        let order = load_order_for_update(&txn, sales_order_id).await?;
        ensure_awaiting_transport(&order)?;
        if !order.delivery_type.needs_transport_approval() {
            return Err(ServiceError::InvalidOperation(format!(
                "{} does not need transport approval",
                order.delivery_type.as_str()
            )));
        }

        let other_pending = TransportApprovalEntity::find()
            .filter(transport_approval::Column::SalesOrderId.eq(sales_order_id))
            .filter(transport_approval::Column::Status.eq(TransportApprovalStatus::Pending))
            .filter(transport_approval::Column::Id.ne(id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if other_pending > 0 {
            warn!(approval_id = id, sales_order_id, "Renegotiation refused, another request is pending");
            return Err(ServiceError::Conflict(format!(
                "Sales order {} already has a pending transport request",
                sales_order_id
            )));
        }

        let delivery_type = order.delivery_type;
        let order = reprice_transport(
            &txn,
            order,
            negotiated_amount,
            delivery_type,
            OrderStatus::PendingTransportApproval,
        )
        .await?;

        let round = request.negotiation_round + 1;
        let mut active: transport_approval::ActiveModel = request.into();
        active.original_transport_cost = Set(negotiated_amount);
        active.requested_transport_cost = Set(negotiated_amount);
        active.status = Set(TransportApprovalStatus::Pending);
        active.approved_by = Set(None);
        active.demand_amount = Set(None);
        active.negotiation_round = Set(round);
        if notes.is_some() {
            active.notes = Set(notes);
        }
        let request = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport.renegotiations");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::TransportRenegotiated {
                    approval_id: id,
                    amount: negotiated_amount,
                    round,
                })
                .await;
        }
        info!(approval_id = id, sales_order_id, amount = %negotiated_amount, round, "Transport cost renegotiated");
        Ok(NegotiationOutcome {
            transport_request: request,
            sales_order: order,
        })
    }
}

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    db::{for_update, lock_key, RowGuard, RowLocks},
    entities::{
        dispatch_request::{
            self, details_complete, DispatchKind, DispatchStatus, Entity as DispatchRequestEntity,
        },
        gate_pass::{self, Entity as GatePassEntity, GatePassStatus},
        sales_order::{self, DeliveryType, Entity as SalesOrderEntity, OrderStatus},
        transport_job::{self, Entity as TransportJobEntity, TransportJobStatus},
        vehicle::{self, Entity as VehicleEntity, VehicleStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{sales::load_order_for_update, transport_jobs::allowed_from},
};

/// Details supplied when an order is handed to dispatch
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchInput {
    /// Must agree with the order's delivery type when given
    pub delivery_type: Option<String>,
    pub party_contact: Option<String>,
    pub party_address: Option<String>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
}

/// Vehicle and driver for a dispatch being processed
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInput {
    /// Fleet vehicle to assign; omit for hired transport
    pub vehicle_id: Option<i32>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Enter,
    Release,
    Reject,
}

/// Input for a gate desk verification
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GateVerification {
    pub action: GateAction,
    pub customer_name: Option<String>,
    pub vehicle_number: Option<String>,
    pub verified_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub dispatch_request: dispatch_request::Model,
    pub sales_order: sales_order::Model,
    pub gate_pass: Option<gate_pass::Model>,
    pub transport_job: Option<transport_job::Model>,
}

/// Result of a gate desk action
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum GateOutcome {
    #[serde(rename_all = "camelCase")]
    Released {
        gate_pass: gate_pass::Model,
        dispatch_request: dispatch_request::Model,
        sales_order: sales_order::Model,
    },
    #[serde(rename_all = "camelCase")]
    EnteredForPickup {
        gate_pass: gate_pass::Model,
        dispatch_request: dispatch_request::Model,
    },
    /// The presented identity did not match; a manager override is needed to release
    #[serde(rename_all = "camelCase")]
    IdentityMismatch {
        gate_pass: gate_pass::Model,
        presented_name: String,
        requires_override: bool,
    },
    #[serde(rename_all = "camelCase")]
    Rejected { gate_pass: gate_pass::Model },
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

static VEHICLE_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("vehicle separator pattern"));

fn normalize_vehicle(number: &str) -> String {
    VEHICLE_SEPARATORS
        .replace_all(number, "")
        .to_ascii_uppercase()
}

/// Case and whitespace insensitive name check; the vehicle number is compared only when both
/// sides have one.
pub fn identity_matches(
    expected_name: &str,
    presented_name: &str,
    expected_vehicle: Option<&str>,
    presented_vehicle: Option<&str>,
) -> bool {
    if normalize_name(expected_name) != normalize_name(presented_name) {
        return false;
    }
    match (expected_vehicle, presented_vehicle) {
        (Some(expected), Some(presented))
            if !expected.trim().is_empty() && !presented.trim().is_empty() =>
        {
            normalize_vehicle(expected) == normalize_vehicle(presented)
        }
        _ => true,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn load_dispatch_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<dispatch_request::Model, ServiceError> {
    for_update(
        DispatchRequestEntity::find_by_id(id),
        txn.get_database_backend(),
    )
    .one(txn)
    .await
    .map_err(ServiceError::db_error)?
    .ok_or_else(|| ServiceError::not_found("Dispatch request", id))
}

pub(crate) async fn set_dispatch_status(
    txn: &DatabaseTransaction,
    dispatch: dispatch_request::Model,
    status: DispatchStatus,
) -> Result<dispatch_request::Model, ServiceError> {
    let mut active: dispatch_request::ActiveModel = dispatch.into();
    active.status = Set(status);
    active.update(txn).await.map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct DispatchService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl DispatchService {
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

    pub async fn get(&self, id: i32) -> Result<dispatch_request::Model, ServiceError> {
        DispatchRequestEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Dispatch request", id))
    }

    pub async fn list(
        &self,
        status: Option<DispatchStatus>,
    ) -> Result<Vec<dispatch_request::Model>, ServiceError> {
        let mut query = DispatchRequestEntity::find();
        if let Some(status) = status {
            query = query.filter(dispatch_request::Column::Status.eq(status));
        }
        query
            .order_by_asc(dispatch_request::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_gate_pass(&self, id: i32) -> Result<gate_pass::Model, ServiceError> {
        GatePassEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Gate pass", id))
    }

    /// Hands a confirmed, paid (or finance-bypassed) order to dispatch. Self pickups get a gate
    /// pass; company deliveries get a transport job.
    #[instrument(skip(self, input))]
    pub async fn send(
        &self,
        sales_order_id: i32,
        input: DispatchInput,
    ) -> Result<DispatchOutcome, ServiceError> {
        let requested_type = match input.delivery_type.as_deref() {
            Some(raw) => Some(
                DeliveryType::from_literal(raw).map_err(ServiceError::ValidationError)?,
            ),
            None => None,
        };

        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, sales_order_id).await?;

        if order.order_status != OrderStatus::Confirmed {
            return Err(ServiceError::InvalidStatus(format!(
                "Sales order {} must be confirmed before dispatch (status {:?})",
                sales_order_id, order.order_status
            )));
        }
        if !order.is_payment_cleared() {
            return Err(ServiceError::InvalidStatus(format!(
                "Sales order {} has outstanding payment ({:?})",
                sales_order_id, order.payment_status
            )));
        }
        if let Some(requested) = requested_type {
            if requested != order.delivery_type {
                return Err(ServiceError::InvalidOperation(format!(
                    "Sales order {} uses {}, not {}",
                    sales_order_id,
                    order.delivery_type.as_str(),
                    requested.as_str()
                )));
            }
        }
        let existing = DispatchRequestEntity::find()
            .filter(dispatch_request::Column::SalesOrderId.eq(sales_order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(existing) = existing {
            return Err(ServiceError::Conflict(format!(
                "Sales order {} already has dispatch request {}",
                sales_order_id, existing.id
            )));
        }

        let kind = match order.delivery_type {
            DeliveryType::SelfDelivery => DispatchKind::SelfPickup,
            _ => DispatchKind::Transport,
        };
        let contact = non_empty(input.party_contact).or_else(|| order.customer_phone.clone());
        let address = non_empty(input.party_address).or_else(|| order.customer_address.clone());
        let status = if details_complete(kind, contact.as_deref(), address.as_deref()) {
            DispatchStatus::Pending
        } else {
            DispatchStatus::CustomerDetailsRequired
        };
        let vehicle_number = non_empty(input.vehicle_number);

        let dispatch = dispatch_request::ActiveModel {
            sales_order_id: Set(sales_order_id),
            showroom_product_id: Set(order.showroom_product_id),
            delivery_kind: Set(kind),
            status: Set(status),
            party_name: Set(order.customer_name.clone()),
            party_contact: Set(contact),
            party_address: Set(address.clone()),
            vehicle_id: Set(None),
            vehicle_number: Set(vehicle_number.clone()),
            driver_name: Set(non_empty(input.driver_name.clone())),
            driver_contact: Set(non_empty(input.driver_contact.clone())),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let (gate_pass, transport_job) = match kind {
            DispatchKind::SelfPickup => {
                let pass = gate_pass::ActiveModel {
                    dispatch_request_id: Set(dispatch.id),
                    sales_order_id: Set(sales_order_id),
                    customer_name: Set(order.customer_name.clone()),
                    vehicle_number: Set(vehicle_number),
                    status: Set(GatePassStatus::Pending),
                    mismatch_attempts: Set(0),
                    ..Default::default()
                }
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?;
                (Some(pass), None)
            }
            DispatchKind::Transport => {
                let job = transport_job::ActiveModel {
                    dispatch_request_id: Set(dispatch.id),
                    sales_order_id: Set(sales_order_id),
                    vehicle_id: Set(None),
                    driver_name: Set(non_empty(input.driver_name)),
                    driver_contact: Set(non_empty(input.driver_contact)),
                    destination: Set(address),
                    status: Set(TransportJobStatus::Pending),
                    ..Default::default()
                }
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?;
                (None, Some(job))
            }
        };

        let mut active: sales_order::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Dispatched);
        let sales_order = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("dispatch.requests.created");
        self.emit_status(&dispatch).await;
        if status == DispatchStatus::CustomerDetailsRequired {
            warn!(dispatch_request_id = dispatch.id, "Customer details missing for dispatch");
        }
        info!(
            dispatch_request_id = dispatch.id,
            sales_order_id,
            kind = ?kind,
            status = ?status,
            "Order sent to dispatch"
        );

        Ok(DispatchOutcome {
            dispatch_request: dispatch,
            sales_order,
            gate_pass,
            transport_job,
        })
    }

    /// Fills in missing contact or address details for a dispatch.
    #[instrument(skip(self))]
    pub async fn update_customer_details(
        &self,
        id: i32,
        party_contact: Option<String>,
        party_address: Option<String>,
    ) -> Result<dispatch_request::Model, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("dispatch", id)).await;
        let txn = super::begin(&self.db).await?;
        let dispatch = load_dispatch_for_update(&txn, id).await?;
        if !matches!(
            dispatch.status,
            DispatchStatus::Pending | DispatchStatus::CustomerDetailsRequired
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Dispatch request {} is already {:?}",
                id, dispatch.status
            )));
        }

        let contact = non_empty(party_contact).or_else(|| dispatch.party_contact.clone());
        let address = non_empty(party_address).or_else(|| dispatch.party_address.clone());
        let status = if details_complete(dispatch.delivery_kind, contact.as_deref(), address.as_deref()) {
            DispatchStatus::Pending
        } else {
            DispatchStatus::CustomerDetailsRequired
        };

        let job = if dispatch.delivery_kind == DispatchKind::Transport {
            TransportJobEntity::find()
                .filter(transport_job::Column::DispatchRequestId.eq(id))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
        } else {
            None
        };
        if let Some(job) = job {
            let mut active: transport_job::ActiveModel = job.into();
            active.destination = Set(address.clone());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let mut active: dispatch_request::ActiveModel = dispatch.into();
        active.party_contact = Set(contact);
        active.party_address = Set(address);
        active.status = Set(status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        self.emit_status(&updated).await;
        info!(dispatch_request_id = id, status = ?status, "Dispatch customer details updated");
        Ok(updated)
    }

    /// Moves a pending dispatch on: self pickups become ready for loading, company deliveries
    /// get a vehicle and driver.
    #[instrument(skip(self, input))]
    pub async fn process(
        &self,
        id: i32,
        input: ProcessInput,
    ) -> Result<DispatchOutcome, ServiceError> {
        let mut keys = vec![lock_key("dispatch", id)];
        if let Some(vehicle_id) = input.vehicle_id {
            keys.push(lock_key("vehicle", vehicle_id));
        }
        let _guard = self.locks.acquire(keys).await;
        let txn = super::begin(&self.db).await?;
        let dispatch = load_dispatch_for_update(&txn, id).await?;

        match dispatch.status {
            DispatchStatus::Pending => {}
            DispatchStatus::CustomerDetailsRequired => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Dispatch request {} is missing customer details",
                    id
                )))
            }
            other => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Dispatch request {} is already {:?}",
                    id, other
                )))
            }
        }

        let sales_order = SalesOrderEntity::find_by_id(dispatch.sales_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Sales order", dispatch.sales_order_id))?;

        let (dispatch, transport_job, vehicle_event) = match dispatch.delivery_kind {
            DispatchKind::SelfPickup => {
                let dispatch = set_dispatch_status(&txn, dispatch, DispatchStatus::ReadyForLoad).await?;
                (dispatch, None, None)
            }
            DispatchKind::Transport => {
                let vehicle = match input.vehicle_id {
                    Some(vehicle_id) => {
                        let vehicle = for_update(
                            VehicleEntity::find_by_id(vehicle_id),
                            txn.get_database_backend(),
                        )
                        .one(&txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| ServiceError::not_found("Vehicle", vehicle_id))?;
                        if vehicle.status != VehicleStatus::Available {
                            return Err(ServiceError::InvalidStatus(format!(
                                "Vehicle {} is {:?}",
                                vehicle.registration_number, vehicle.status
                            )));
                        }
                        Some(vehicle)
                    }
                    None => None,
                };

                let vehicle_number = non_empty(input.vehicle_number)
                    .or_else(|| vehicle.as_ref().map(|v| v.registration_number.clone()))
                    .or_else(|| dispatch.vehicle_number.clone());
                if vehicle_number.is_none() {
                    return Err(ServiceError::ValidationError(
                        "A fleet vehicle or a vehicle number is required for transport".to_string(),
                    ));
                }
                let driver_name = non_empty(input.driver_name)
                    .or_else(|| vehicle.as_ref().and_then(|v| v.driver_name.clone()))
                    .or_else(|| dispatch.driver_name.clone());
                let driver_contact = non_empty(input.driver_contact)
                    .or_else(|| vehicle.as_ref().and_then(|v| v.driver_contact.clone()))
                    .or_else(|| dispatch.driver_contact.clone());
                let vehicle_id = vehicle.as_ref().map(|v| v.id);

                let job = TransportJobEntity::find()
                    .filter(transport_job::Column::DispatchRequestId.eq(id))
                    .one(&txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| ServiceError::not_found("Transport job for dispatch", id))?;
                if !allowed_from(TransportJobStatus::Assigned).contains(&job.status) {
                    return Err(ServiceError::InvalidStatus(format!(
                        "Transport job {} is already {:?}",
                        job.id, job.status
                    )));
                }
                let mut active: transport_job::ActiveModel = job.into();
                active.failure_reason = Set(None);
                active.vehicle_id = Set(vehicle_id);
                active.driver_name = Set(driver_name.clone());
                active.driver_contact = Set(driver_contact.clone());
                active.status = Set(TransportJobStatus::Assigned);
                let job = active.update(&txn).await.map_err(ServiceError::db_error)?;

                let vehicle_event = match vehicle {
                    Some(vehicle) => {
                        let mut active: vehicle::ActiveModel = vehicle.into();
                        active.status = Set(VehicleStatus::Assigned);
                        let vehicle = active.update(&txn).await.map_err(ServiceError::db_error)?;
                        Some(vehicle.id)
                    }
                    None => None,
                };

                let mut active: dispatch_request::ActiveModel = dispatch.into();
                active.vehicle_id = Set(vehicle_id);
                active.vehicle_number = Set(vehicle_number);
                active.driver_name = Set(driver_name);
                active.driver_contact = Set(driver_contact);
                active.status = Set(DispatchStatus::AssignedTransport);
                let dispatch = active.update(&txn).await.map_err(ServiceError::db_error)?;
                (dispatch, Some(job), vehicle_event)
            }
        };
        super::commit(txn).await?;

        self.emit_status(&dispatch).await;
        if let Some(sender) = &self.event_sender {
            if let Some(job) = &transport_job {
                sender
                    .send_or_log(Event::TransportJobStatusChanged {
                        transport_job_id: job.id,
                        status: job.status,
                    })
                    .await;
            }
            if let Some(vehicle_id) = vehicle_event {
                sender
                    .send_or_log(Event::VehicleStatusChanged {
                        vehicle_id,
                        status: VehicleStatus::Assigned,
                    })
                    .await;
            }
        }
        info!(dispatch_request_id = id, status = ?dispatch.status, "Dispatch processed");

        Ok(DispatchOutcome {
            dispatch_request: dispatch,
            sales_order,
            gate_pass: None,
            transport_job,
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_loaded(&self, id: i32) -> Result<dispatch_request::Model, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("dispatch", id)).await;
        let txn = super::begin(&self.db).await?;
        let dispatch = load_dispatch_for_update(&txn, id).await?;
        if !matches!(
            dispatch.status,
            DispatchStatus::ReadyForLoad | DispatchStatus::AssignedTransport
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Dispatch request {} cannot be loaded from {:?}",
                id, dispatch.status
            )));
        }
        let updated = set_dispatch_status(&txn, dispatch, DispatchStatus::Loaded).await?;
        super::commit(txn).await?;

        self.emit_status(&updated).await;
        info!(dispatch_request_id = id, "Dispatch loaded");
        Ok(updated)
    }

    /// Gate desk action on a self-pickup pass.
    #[instrument(skip(self, verification), fields(action = ?verification.action))]
    pub async fn verify_gate_pass(
        &self,
        id: i32,
        verification: GateVerification,
    ) -> Result<GateOutcome, ServiceError> {
        match verification.action {
            GateAction::Enter => self.enter(id).await,
            GateAction::Reject => self.reject(id).await,
            GateAction::Release => {
                let presented = non_empty(verification.customer_name).ok_or_else(|| {
                    ServiceError::ValidationError(
                        "Customer name is required to release goods".to_string(),
                    )
                })?;
                self.release(
                    id,
                    Some(presented),
                    non_empty(verification.vehicle_number),
                    verification.verified_by,
                    None,
                )
                .await
            }
        }
    }

    /// Releases a pass that failed identity verification on a manager's authority.
    #[instrument(skip(self))]
    pub async fn manager_override_release(
        &self,
        id: i32,
        manager: String,
    ) -> Result<GateOutcome, ServiceError> {
        let manager = manager.trim().to_string();
        if manager.is_empty() {
            return Err(ServiceError::ValidationError(
                "Manager name is required for an override".to_string(),
            ));
        }
        self.release(id, None, None, Some(manager.clone()), Some(manager))
            .await
    }

    async fn lock_gate_pass(&self, id: i32) -> Result<RowGuard, ServiceError> {
        let pass = self.get_gate_pass(id).await?;
        Ok(self
            .locks
            .acquire([
                lock_key("dispatch", pass.dispatch_request_id),
                lock_key("sales", pass.sales_order_id),
            ])
            .await)
    }

    async fn enter(&self, id: i32) -> Result<GateOutcome, ServiceError> {
        let _guard = self.lock_gate_pass(id).await?;
        let txn = super::begin(&self.db).await?;
        let pass = load_gate_pass_for_update(&txn, id).await?;
        if pass.status != GatePassStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Gate pass {} is {:?}",
                id, pass.status
            )));
        }
        let dispatch = load_dispatch_for_update(&txn, pass.dispatch_request_id).await?;
        if dispatch.status == DispatchStatus::Completed {
            return Err(ServiceError::InvalidStatus(format!(
                "Dispatch request {} is already completed",
                dispatch.id
            )));
        }

        let mut active: gate_pass::ActiveModel = pass.into();
        active.status = Set(GatePassStatus::EnteredForPickup);
        let pass = active.update(&txn).await.map_err(ServiceError::db_error)?;
        let dispatch = set_dispatch_status(&txn, dispatch, DispatchStatus::EnteredForPickup).await?;
        super::commit(txn).await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::GatePassEntered(id)).await;
        }
        self.emit_status(&dispatch).await;
        info!(gate_pass_id = id, "Customer entered for pickup");
        Ok(GateOutcome::EnteredForPickup {
            gate_pass: pass,
            dispatch_request: dispatch,
        })
    }

    async fn reject(&self, id: i32) -> Result<GateOutcome, ServiceError> {
        let _guard = self.lock_gate_pass(id).await?;
        let txn = super::begin(&self.db).await?;
        let pass = load_gate_pass_for_update(&txn, id).await?;
        if !pass.status.is_open() {
            return Err(ServiceError::InvalidStatus(format!(
                "Gate pass {} is {:?}",
                id, pass.status
            )));
        }
        let mut active: gate_pass::ActiveModel = pass.into();
        active.status = Set(GatePassStatus::Rejected);
        let pass = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("gate.rejected");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::GatePassRejected(id)).await;
        }
        warn!(gate_pass_id = id, "Gate pass rejected");
        Ok(GateOutcome::Rejected { gate_pass: pass })
    }

    /// Shared release path. `presented` is `None` only for a manager override.
    async fn release(
        &self,
        id: i32,
        presented: Option<String>,
        presented_vehicle: Option<String>,
        released_by: Option<String>,
        override_by: Option<String>,
    ) -> Result<GateOutcome, ServiceError> {
        let _guard = self.lock_gate_pass(id).await?;
        let txn = super::begin(&self.db).await?;
        let pass = load_gate_pass_for_update(&txn, id).await?;
        if !pass.status.is_open() {
            return Err(ServiceError::InvalidStatus(format!(
                "Gate pass {} is {:?}",
                id, pass.status
            )));
        }

        match &presented {
            Some(name) => {
                if !identity_matches(
                    &pass.customer_name,
                    name,
                    pass.vehicle_number.as_deref(),
                    presented_vehicle.as_deref(),
                ) {
                    let attempts = pass.mismatch_attempts + 1;
                    let mut active: gate_pass::ActiveModel = pass.into();
                    active.mismatch_attempts = Set(attempts);
                    active.last_attempted_name = Set(Some(name.clone()));
                    let pass = active.update(&txn).await.map_err(ServiceError::db_error)?;
                    super::commit(txn).await?;

                    metrics::increment_counter("gate.identity_mismatch");
                    if let Some(sender) = &self.event_sender {
                        sender
                            .send_or_log(Event::GateIdentityMismatch {
                                gate_pass_id: id,
                                presented_name: name.clone(),
                            })
                            .await;
                    }
                    warn!(gate_pass_id = id, attempts, "Identity mismatch at gate");
                    return Ok(GateOutcome::IdentityMismatch {
                        gate_pass: pass,
                        presented_name: name.clone(),
                        requires_override: true,
                    });
                }
            }
            None => {
                if pass.mismatch_attempts == 0 {
                    return Err(ServiceError::InvalidStatus(format!(
                        "Gate pass {} has no failed verification to override",
                        id
                    )));
                }
            }
        }

        let dispatch = load_dispatch_for_update(&txn, pass.dispatch_request_id).await?;
        let order = load_order_for_update(&txn, pass.sales_order_id).await?;
        let overridden = override_by.is_some();

        let mut active: gate_pass::ActiveModel = pass.into();
        active.status = Set(GatePassStatus::Verified);
        active.released_by = Set(released_by);
        active.released_at = Set(Some(Utc::now()));
        if overridden {
            active.override_by = Set(override_by);
        }
        let pass = active.update(&txn).await.map_err(ServiceError::db_error)?;
        let dispatch = set_dispatch_status(&txn, dispatch, DispatchStatus::Completed).await?;
        let mut active: sales_order::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Delivered);
        let sales_order = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter(if overridden {
            "gate.override_released"
        } else {
            "gate.released"
        });
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::GatePassReleased {
                    gate_pass_id: id,
                    sales_order_id: sales_order.id,
                    overridden,
                })
                .await;
        }
        self.emit_status(&dispatch).await;
        info!(gate_pass_id = id, sales_order_id = sales_order.id, overridden, "Goods released at gate");

        Ok(GateOutcome::Released {
            gate_pass: pass,
            dispatch_request: dispatch,
            sales_order,
        })
    }

    async fn emit_status(&self, dispatch: &dispatch_request::Model) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::DispatchStatusChanged {
                    dispatch_request_id: dispatch.id,
                    status: dispatch.status,
                })
                .await;
        }
    }
}

async fn load_gate_pass_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<gate_pass::Model, ServiceError> {
    for_update(GatePassEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Gate pass", id))
}

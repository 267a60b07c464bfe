use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::{for_update, lock_key, RowGuard, RowLocks},
    entities::{
        dispatch_request::{self, DispatchStatus, Entity as DispatchRequestEntity},
        sales_order::{self, OrderStatus},
        transport_job::{self, Entity as TransportJobEntity, TransportJobStatus},
        vehicle::{self, Entity as VehicleEntity, VehicleStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{dispatch::set_dispatch_status, sales::load_order_for_update},
};

/// A fleet vehicle to register
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    #[validate(length(min = 1, max = 32, message = "Registration number is required"))]
    pub registration_number: String,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
}

/// Statuses a job may leave for `to`.
pub fn allowed_from(to: TransportJobStatus) -> &'static [TransportJobStatus] {
    use TransportJobStatus::*;
    match to {
        // A cancelled job is picked up again when its dispatch is re-processed.
        Assigned => &[Pending, Cancelled],
        InTransit => &[Assigned],
        Delivered => &[InTransit],
        Cancelled => &[Pending, Assigned],
        Failed => &[InTransit],
        Pending => &[],
    }
}

async fn load_job_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<transport_job::Model, ServiceError> {
    for_update(TransportJobEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Transport job", id))
}

async fn load_vehicle_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<vehicle::Model, ServiceError> {
    for_update(VehicleEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Vehicle", id))
}

async fn set_vehicle_status(
    txn: &DatabaseTransaction,
    vehicle: vehicle::Model,
    status: VehicleStatus,
) -> Result<vehicle::Model, ServiceError> {
    let mut active: vehicle::ActiveModel = vehicle.into();
    active.status = Set(status);
    active.update(txn).await.map_err(ServiceError::db_error)
}

/// Fleet vehicles and the company-delivery jobs they run.
#[derive(Clone)]
pub struct TransportJobService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
}

impl TransportJobService {
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

    pub async fn get(&self, id: i32) -> Result<transport_job::Model, ServiceError> {
        TransportJobEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Transport job", id))
    }

    pub async fn find_by_dispatch(
        &self,
        dispatch_request_id: i32,
    ) -> Result<Option<transport_job::Model>, ServiceError> {
        TransportJobEntity::find()
            .filter(transport_job::Column::DispatchRequestId.eq(dispatch_request_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input), fields(registration = %input.registration_number))]
    pub async fn register_vehicle(&self, input: NewVehicle) -> Result<vehicle::Model, ServiceError> {
        input.validate()?;
        let registration = input.registration_number.trim().to_uppercase();
        let existing = VehicleEntity::find()
            .filter(vehicle::Column::RegistrationNumber.eq(registration.as_str()))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing > 0 {
            return Err(ServiceError::Conflict(format!(
                "Vehicle {} is already registered",
                registration
            )));
        }

        let vehicle = vehicle::ActiveModel {
            registration_number: Set(registration),
            driver_name: Set(input.driver_name),
            driver_contact: Set(input.driver_contact),
            status: Set(VehicleStatus::Available),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        metrics::increment_counter("fleet.vehicles.registered");
        info!(vehicle_id = vehicle.id, registration = %vehicle.registration_number, "Vehicle registered");
        Ok(vehicle)
    }

    pub async fn get_vehicle(&self, id: i32) -> Result<vehicle::Model, ServiceError> {
        VehicleEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Vehicle", id))
    }

    pub async fn list_vehicles(
        &self,
        status: Option<VehicleStatus>,
    ) -> Result<Vec<vehicle::Model>, ServiceError> {
        let mut query = VehicleEntity::find();
        if let Some(status) = status {
            query = query.filter(vehicle::Column::Status.eq(status));
        }
        query
            .order_by_asc(vehicle::Column::RegistrationNumber)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Row locks for a job: its dispatch, its sales order and its vehicle, taken in one batch.
    async fn lock_job(&self, id: i32) -> Result<RowGuard, ServiceError> {
        let job = self.get(id).await?;
        let mut keys = vec![
            lock_key("dispatch", job.dispatch_request_id),
            lock_key("sales", job.sales_order_id),
        ];
        if let Some(vehicle_id) = job.vehicle_id {
            keys.push(lock_key("vehicle", vehicle_id));
        }
        Ok(self.locks.acquire(keys).await)
    }

    fn check_transition(
        job: &transport_job::Model,
        to: TransportJobStatus,
    ) -> Result<(), ServiceError> {
        if !allowed_from(to).contains(&job.status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Transport job {} cannot move from {:?} to {:?}",
                job.id, job.status, to
            )));
        }
        Ok(())
    }

    /// Goods leave the yard; the dispatch is complete and the vehicle is on the road.
    #[instrument(skip(self))]
    pub async fn start(&self, id: i32) -> Result<transport_job::Model, ServiceError> {
        let _guard = self.lock_job(id).await?;
        let txn = super::begin(&self.db).await?;
        let job = load_job_for_update(&txn, id).await?;
        Self::check_transition(&job, TransportJobStatus::InTransit)?;

        let dispatch = DispatchRequestEntity::find_by_id(job.dispatch_request_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Dispatch request", job.dispatch_request_id))?;
        if !matches!(
            dispatch.status,
            DispatchStatus::AssignedTransport | DispatchStatus::Loaded
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Dispatch request {} is {:?}; goods must be assigned or loaded first",
                dispatch.id, dispatch.status
            )));
        }
        set_dispatch_status(&txn, dispatch, DispatchStatus::Completed).await?;

        let vehicle = match job.vehicle_id {
            Some(vehicle_id) => {
                let vehicle = load_vehicle_for_update(&txn, vehicle_id).await?;
                Some(set_vehicle_status(&txn, vehicle, VehicleStatus::InTransit).await?)
            }
            None => None,
        };

        let mut active: transport_job::ActiveModel = job.into();
        active.status = Set(TransportJobStatus::InTransit);
        active.started_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        self.emit(&updated, vehicle.as_ref()).await;
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::DispatchStatusChanged {
                    dispatch_request_id: updated.dispatch_request_id,
                    status: DispatchStatus::Completed,
                })
                .await;
        }
        info!(transport_job_id = id, "Transport job in transit");
        Ok(updated)
    }

    /// Delivery completes the sales order. The vehicle heads back and only becomes available
    /// once the driver reports in.
    #[instrument(skip(self))]
    pub async fn deliver(&self, id: i32) -> Result<transport_job::Model, ServiceError> {
        let _guard = self.lock_job(id).await?;
        let txn = super::begin(&self.db).await?;
        let job = load_job_for_update(&txn, id).await?;
        Self::check_transition(&job, TransportJobStatus::Delivered)?;

        let order = load_order_for_update(&txn, job.sales_order_id).await?;
        let mut active: sales_order::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Delivered);
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        let vehicle = match job.vehicle_id {
            Some(vehicle_id) => {
                let vehicle = load_vehicle_for_update(&txn, vehicle_id).await?;
                Some(set_vehicle_status(&txn, vehicle, VehicleStatus::Returning).await?)
            }
            None => None,
        };

        let mut active: transport_job::ActiveModel = job.into();
        active.status = Set(TransportJobStatus::Delivered);
        active.delivered_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport_jobs.delivered");
        self.emit(&updated, vehicle.as_ref()).await;
        info!(transport_job_id = id, sales_order_id = updated.sales_order_id, "Transport job delivered");
        Ok(updated)
    }

    /// Cancels a job that has not left; a fleet vehicle goes straight back to available and the
    /// dispatch returns to the queue without its vehicle, ready to be processed again.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: i32,
        reason: Option<String>,
    ) -> Result<transport_job::Model, ServiceError> {
        let _guard = self.lock_job(id).await?;
        let txn = super::begin(&self.db).await?;
        let job = load_job_for_update(&txn, id).await?;
        Self::check_transition(&job, TransportJobStatus::Cancelled)?;

        let vehicle = match job.vehicle_id {
            Some(vehicle_id) => {
                let vehicle = load_vehicle_for_update(&txn, vehicle_id).await?;
                Some(set_vehicle_status(&txn, vehicle, VehicleStatus::Available).await?)
            }
            None => None,
        };

        let dispatch = for_update(
            DispatchRequestEntity::find_by_id(job.dispatch_request_id),
            txn.get_database_backend(),
        )
        .one(&txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Dispatch request", job.dispatch_request_id))?;
        let dispatch_status = if dispatch.has_required_details() {
            DispatchStatus::Pending
        } else {
            DispatchStatus::CustomerDetailsRequired
        };
        let mut active: dispatch_request::ActiveModel = dispatch.into();
        active.status = Set(dispatch_status);
        active.vehicle_id = Set(None);
        active.vehicle_number = Set(None);
        active.driver_name = Set(None);
        active.driver_contact = Set(None);
        let dispatch = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let mut active: transport_job::ActiveModel = job.into();
        active.status = Set(TransportJobStatus::Cancelled);
        active.failure_reason = Set(reason);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport_jobs.cancelled");
        self.emit(&updated, vehicle.as_ref()).await;
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::DispatchStatusChanged {
                    dispatch_request_id: dispatch.id,
                    status: dispatch.status,
                })
                .await;
        }
        info!(
            transport_job_id = id,
            dispatch_request_id = dispatch.id,
            "Transport job cancelled, dispatch requeued"
        );
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn fail(
        &self,
        id: i32,
        reason: String,
    ) -> Result<transport_job::Model, ServiceError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A failure reason is required".to_string(),
            ));
        }

        let _guard = self.lock_job(id).await?;
        let txn = super::begin(&self.db).await?;
        let job = load_job_for_update(&txn, id).await?;
        Self::check_transition(&job, TransportJobStatus::Failed)?;

        let vehicle = match job.vehicle_id {
            Some(vehicle_id) => {
                let vehicle = load_vehicle_for_update(&txn, vehicle_id).await?;
                Some(set_vehicle_status(&txn, vehicle, VehicleStatus::Returning).await?)
            }
            None => None,
        };

        let mut active: transport_job::ActiveModel = job.into();
        active.status = Set(TransportJobStatus::Failed);
        active.failure_reason = Set(Some(reason.clone()));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("transport_jobs.failed");
        self.emit(&updated, vehicle.as_ref()).await;
        warn!(transport_job_id = id, reason = %reason, "Transport job failed");
        Ok(updated)
    }

    /// The driver is back at the yard; the vehicle can take new jobs.
    #[instrument(skip(self))]
    pub async fn driver_reached(&self, vehicle_id: i32) -> Result<vehicle::Model, ServiceError> {
        let _guard = self
            .locks
            .acquire_one(lock_key("vehicle", vehicle_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let vehicle = load_vehicle_for_update(&txn, vehicle_id).await?;
        if vehicle.status != VehicleStatus::Returning {
            return Err(ServiceError::InvalidStatus(format!(
                "Vehicle {} is {:?}, not returning",
                vehicle.registration_number, vehicle.status
            )));
        }
        let updated = set_vehicle_status(&txn, vehicle, VehicleStatus::Available).await?;
        super::commit(txn).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::VehicleStatusChanged {
                    vehicle_id,
                    status: VehicleStatus::Available,
                })
                .await;
        }
        info!(vehicle_id, "Driver reached base, vehicle available");
        Ok(updated)
    }

    async fn emit(&self, job: &transport_job::Model, vehicle: Option<&vehicle::Model>) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::TransportJobStatusChanged {
                    transport_job_id: job.id,
                    status: job.status,
                })
                .await;
            if let Some(vehicle) = vehicle {
                sender
                    .send_or_log(Event::VehicleStatusChanged {
                        vehicle_id: vehicle.id,
                        status: vehicle.status,
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransportJobStatus::*;

    #[test]
    fn job_transitions_follow_the_delivery_path() {
        assert!(allowed_from(Assigned).contains(&Pending));
        assert!(allowed_from(InTransit).contains(&Assigned));
        assert!(!allowed_from(InTransit).contains(&Pending));
        assert!(allowed_from(Delivered).contains(&InTransit));
        assert!(allowed_from(Cancelled).contains(&Assigned));
        assert!(allowed_from(Assigned).contains(&Cancelled));
        assert!(!allowed_from(Assigned).contains(&Failed));
        assert!(!allowed_from(Cancelled).contains(&InTransit));
        assert!(allowed_from(Failed).contains(&InTransit));
        assert!(allowed_from(Pending).is_empty());
    }
}

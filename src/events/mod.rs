use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::{
    approval_request::ApprovalKind, assembly_order::AssemblyStatus,
    dispatch_request::DispatchStatus, purchase_order::PurchaseStatus,
    sales_order::PaymentStatus, transport_job::TransportJobStatus, vehicle::VehicleStatus,
};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// True once the processor has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Events are emitted after commit, so delivery problems never undo business writes.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events raised by the fulfillment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ProductionOrderCreated {
        production_order_id: i32,
        purchase_order_id: i32,
        assembly_order_id: i32,
    },
    ProductionOrderCancelled(i32),
    ProductionQuantityChanged {
        production_order_id: i32,
        old_quantity: i32,
        new_quantity: i32,
    },

    InventoryAdjusted {
        name: String,
        old_quantity: i32,
        new_quantity: i32,
        reason: String,
    },
    StockChecked {
        purchase_order_id: i32,
        status: PurchaseStatus,
        shortage_count: usize,
    },
    PurchaseFinanceDecided {
        purchase_order_id: i32,
        approved: bool,
    },
    MaterialsAllocated {
        purchase_order_id: i32,
        production_order_id: i32,
    },

    AssemblyProgressUpdated {
        assembly_order_id: i32,
        progress: i32,
        status: AssemblyStatus,
    },
    AssemblyReworkRequired {
        assembly_order_id: i32,
        failed_tests: Vec<String>,
    },
    ShowroomProductAdded {
        showroom_product_id: i32,
        production_order_id: i32,
    },
    ShowroomBatchSoldOut(i32),
    ShowroomBatchReopened(i32),

    SalesOrderCreated {
        sales_order_id: i32,
        order_number: String,
        final_amount: Decimal,
    },
    SalesOrderCancelled(i32),
    SalesOrderRepriced {
        sales_order_id: i32,
        final_amount: Decimal,
    },
    PaymentRecorded {
        sales_order_id: i32,
        transaction_id: i32,
        amount: Decimal,
    },
    PaymentReviewed {
        sales_order_id: i32,
        approved: bool,
        payment_status: PaymentStatus,
    },
    ApprovalRequested {
        approval_request_id: i32,
        sales_order_id: i32,
        kind: ApprovalKind,
    },
    ApprovalDecided {
        approval_request_id: i32,
        kind: ApprovalKind,
        approved: bool,
    },

    TransportRequestCreated {
        approval_id: i32,
        sales_order_id: i32,
    },
    TransportRequestApproved(i32),
    TransportRequestRejected {
        approval_id: i32,
        demand_amount: Decimal,
    },
    TransportDemandAccepted {
        approval_id: i32,
        transport_cost: Decimal,
    },
    TransportDemandDeclined(i32),
    TransportRenegotiated {
        approval_id: i32,
        amount: Decimal,
        round: i32,
    },

    DispatchStatusChanged {
        dispatch_request_id: i32,
        status: DispatchStatus,
    },
    GatePassEntered(i32),
    GatePassReleased {
        gate_pass_id: i32,
        sales_order_id: i32,
        overridden: bool,
    },
    GatePassRejected(i32),
    GateIdentityMismatch {
        gate_pass_id: i32,
        presented_name: String,
    },
    TransportJobStatusChanged {
        transport_job_id: i32,
        status: TransportJobStatus,
    },
    VehicleStatusChanged {
        vehicle_id: i32,
        status: VehicleStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ProductionOrderCreated { .. } => "production_order.created",
            Event::ProductionOrderCancelled(_) => "production_order.cancelled",
            Event::ProductionQuantityChanged { .. } => "production_order.quantity_changed",
            Event::InventoryAdjusted { .. } => "inventory.adjusted",
            Event::StockChecked { .. } => "purchase_order.stock_checked",
            Event::PurchaseFinanceDecided { .. } => "purchase_order.finance_decided",
            Event::MaterialsAllocated { .. } => "purchase_order.materials_allocated",
            Event::AssemblyProgressUpdated { .. } => "assembly.progress_updated",
            Event::AssemblyReworkRequired { .. } => "assembly.rework_required",
            Event::ShowroomProductAdded { .. } => "showroom.product_added",
            Event::ShowroomBatchSoldOut(_) => "showroom.sold_out",
            Event::ShowroomBatchReopened(_) => "showroom.reopened",
            Event::SalesOrderCreated { .. } => "sales_order.created",
            Event::SalesOrderCancelled(_) => "sales_order.cancelled",
            Event::SalesOrderRepriced { .. } => "sales_order.repriced",
            Event::PaymentRecorded { .. } => "payment.recorded",
            Event::PaymentReviewed { .. } => "payment.reviewed",
            Event::ApprovalRequested { .. } => "approval.requested",
            Event::ApprovalDecided { .. } => "approval.decided",
            Event::TransportRequestCreated { .. } => "transport.request_created",
            Event::TransportRequestApproved(_) => "transport.approved",
            Event::TransportRequestRejected { .. } => "transport.rejected",
            Event::TransportDemandAccepted { .. } => "transport.demand_accepted",
            Event::TransportDemandDeclined(_) => "transport.demand_declined",
            Event::TransportRenegotiated { .. } => "transport.renegotiated",
            Event::DispatchStatusChanged { .. } => "dispatch.status_changed",
            Event::GatePassEntered(_) => "gate.entered",
            Event::GatePassReleased { .. } => "gate.released",
            Event::GatePassRejected(_) => "gate.rejected",
            Event::GateIdentityMismatch { .. } => "gate.identity_mismatch",
            Event::TransportJobStatusChanged { .. } => "transport_job.status_changed",
            Event::VehicleStatusChanged { .. } => "vehicle.status_changed",
        }
    }
}

/// Drains the event channel, logging each event. Returns when every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(event = event.name(), payload = %payload, "domain event");
        crate::metrics::increment_counter(&format!("events.{}", event.name()));
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::ProductionOrderCancelled(1))
            .await;
        assert!(sender.send(Event::ProductionOrderCancelled(1)).await.is_err());
    }

    #[tokio::test]
    async fn processor_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let handle = tokio::spawn(process_events(rx));
        sender.send_or_log(Event::ShowroomBatchSoldOut(3)).await;
        drop(sender);
        handle.await.unwrap();
        assert_eq!(Event::ShowroomBatchSoldOut(3).name(), "showroom.sold_out");
    }
}

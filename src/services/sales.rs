use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::{for_update, lock_key, RowLocks},
    entities::{
        approval_request::{self, ApprovalKind, ApprovalStatus, Entity as ApprovalRequestEntity},
        finance_transaction::{self, Entity as FinanceTransactionEntity, FinanceKind},
        sales_order::{
            self, DeliveryType, Entity as SalesOrderEntity, OrderStatus, PaymentStatus,
        },
        sales_transaction::{self, Entity as SalesTransactionEntity},
        showroom_product::{self, Entity as ShowroomProductEntity, ShowroomStatus},
        transport_approval::{self, Entity as TransportApprovalEntity, TransportApprovalStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        pricing::{
            final_amount, order_number, payment_status_for, random_suffix,
            settle_payment_status, validate_amounts,
        },
        showroom::remaining_quantity,
        transport::open_request_in,
    },
};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Input for a showroom sale
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSalesOrder {
    pub showroom_product_id: i32,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub customer_phone: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    /// Defaults to the showroom sale price
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub transport_cost: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    /// One of `self delivery`, `company delivery`, `part load`, `free delivery`
    pub delivery_type: String,
}

/// Partial price update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricingUpdate {
    pub unit_price: Option<Decimal>,
    pub quantity: Option<i32>,
    pub transport_cost: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSalesOrder {
    pub sales_order: sales_order::Model,
    pub transport_request: Option<transport_approval::Model>,
    pub approval_request: Option<approval_request::Model>,
    pub showroom_sold_out: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderDetail {
    pub sales_order: sales_order::Model,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub payments: Vec<sales_transaction::Model>,
    pub transport_requests: Vec<transport_approval::Model>,
    pub approval_requests: Vec<approval_request::Model>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub sales_order: sales_order::Model,
    pub approval_request: approval_request::Model,
}

/// Sum of the payment transactions currently on file for an order.
pub async fn amount_paid<C: ConnectionTrait>(
    conn: &C,
    sales_order_id: i32,
) -> Result<Decimal, ServiceError> {
    let payments = SalesTransactionEntity::find()
        .filter(sales_transaction::Column::SalesOrderId.eq(sales_order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(payments.iter().map(|p| p.amount).sum())
}

pub(crate) async fn load_order_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<sales_order::Model, ServiceError> {
    for_update(SalesOrderEntity::find_by_id(id), txn.get_database_backend())
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Sales order", id))
}

pub(crate) async fn record_finance<C: ConnectionTrait>(
    conn: &C,
    kind: FinanceKind,
    amount: Decimal,
    description: String,
    reference_type: &str,
    reference_id: i32,
) -> Result<finance_transaction::Model, ServiceError> {
    finance_transaction::ActiveModel {
        kind: Set(kind),
        amount: Set(amount),
        description: Set(description),
        reference_type: Set(reference_type.to_string()),
        reference_id: Set(reference_id),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

fn ensure_open(order: &sales_order::Model) -> Result<(), ServiceError> {
    match order.order_status {
        OrderStatus::Dispatched | OrderStatus::Delivered | OrderStatus::Cancelled => {
            Err(ServiceError::InvalidStatus(format!(
                "Sales order {} is {:?}",
                order.id, order.order_status
            )))
        }
        _ => Ok(()),
    }
}

fn initial_order_status(delivery_type: DeliveryType) -> OrderStatus {
    match delivery_type {
        DeliveryType::SelfDelivery => OrderStatus::Confirmed,
        DeliveryType::CompanyDelivery | DeliveryType::PartLoad => {
            OrderStatus::PendingTransportApproval
        }
        DeliveryType::FreeDelivery => OrderStatus::PendingFreeDeliveryApproval,
    }
}

#[derive(Clone)]
pub struct SalesService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    locks: RowLocks,
    suffix_len: usize,
}

impl SalesService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        locks: RowLocks,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
            suffix_len: 4,
        }
    }

    /// Number of random digits appended to generated order numbers.
    pub fn with_order_number_suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len;
        self
    }

    /// Sells units from a showroom batch. Remaining quantity is recomputed inside the inserting
    /// transaction while the batch lock is held, so concurrent sales cannot oversell.
    #[instrument(skip(self, input), fields(showroom_product_id = input.showroom_product_id, quantity = input.quantity))]
    pub async fn create(&self, input: NewSalesOrder) -> Result<CreatedSalesOrder, ServiceError> {
        input.validate()?;
        let customer_name = input.customer_name.trim().to_string();
        if customer_name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name is required".to_string(),
            ));
        }
        let delivery_type = DeliveryType::from_literal(&input.delivery_type)
            .map_err(ServiceError::ValidationError)?;
        let transport_cost = match delivery_type {
            DeliveryType::SelfDelivery | DeliveryType::FreeDelivery => Decimal::ZERO,
            DeliveryType::CompanyDelivery | DeliveryType::PartLoad => input.transport_cost,
        };

        let showroom_id = input.showroom_product_id;
        let _guard = self
            .locks
            .acquire_one(lock_key("showroom", showroom_id))
            .await;
        let txn = super::begin(&self.db).await?;

        let product = for_update(
            ShowroomProductEntity::find_by_id(showroom_id),
            txn.get_database_backend(),
        )
        .one(&txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Showroom product", showroom_id))?;

        if product.showroom_status != ShowroomStatus::Available {
            return Err(ServiceError::InvalidStatus(format!(
                "Showroom product {} is sold out",
                showroom_id
            )));
        }
        let remaining = remaining_quantity(&txn, &product).await?;
        if remaining < input.quantity {
            metrics::increment_counter("sales.orders.oversell_rejected");
            return Err(ServiceError::InsufficientStock(format!(
                "Showroom product {} has {} units left, {} requested",
                showroom_id, remaining, input.quantity
            )));
        }

        let unit_price = input.unit_price.unwrap_or(product.sale_price);
        validate_amounts(unit_price, input.quantity, transport_cost, input.discount_amount)?;
        let total = final_amount(
            unit_price,
            input.quantity,
            transport_cost,
            input.discount_amount,
        )?;

        let number = self
            .unique_order_number(&txn, &customer_name, &product.name)
            .await?;

        let order = sales_order::ActiveModel {
            order_number: Set(number),
            showroom_product_id: Set(showroom_id),
            customer_name: Set(customer_name),
            customer_phone: Set(input.customer_phone),
            customer_email: Set(input.customer_email),
            customer_address: Set(input.customer_address),
            quantity: Set(input.quantity),
            unit_price: Set(unit_price),
            transport_cost: Set(transport_cost),
            discount_amount: Set(input.discount_amount),
            final_amount: Set(total),
            payment_status: Set(PaymentStatus::Pending),
            order_status: Set(initial_order_status(delivery_type)),
            delivery_type: Set(delivery_type),
            previous_delivery_type: Set(None),
            coupon_code: Set(None),
            finance_bypass: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let transport_request = if delivery_type.needs_transport_approval() {
            Some(open_request_in(&txn, &order).await?.0)
        } else {
            None
        };
        // Free delivery at checkout still needs an admin decision.
        let approval_request = if delivery_type == DeliveryType::FreeDelivery {
            let approval = approval_request::ActiveModel {
                sales_order_id: Set(order.id),
                kind: Set(ApprovalKind::FreeDelivery),
                status: Set(ApprovalStatus::Pending),
                previous_discount: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            Some(approval)
        } else {
            None
        };

        record_finance(
            &txn,
            FinanceKind::Revenue,
            total,
            format!("Sales order {}", order.order_number),
            "sales_order",
            order.id,
        )
        .await?;

        let sold_out = remaining - input.quantity <= 0;
        if sold_out {
            let mut active: showroom_product::ActiveModel = product.into();
            active.showroom_status = Set(ShowroomStatus::Sold);
            active.sold_date = Set(Some(Utc::now()));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        super::commit(txn).await?;

        metrics::increment_counter("sales.orders.created");
        metrics::increment_counter_by("sales.units_sold", order.quantity.max(0) as u64);
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::SalesOrderCreated {
                    sales_order_id: order.id,
                    order_number: order.order_number.clone(),
                    final_amount: order.final_amount,
                })
                .await;
            if let Some(request) = &transport_request {
                sender
                    .send_or_log(Event::TransportRequestCreated {
                        approval_id: request.id,
                        sales_order_id: order.id,
                    })
                    .await;
            }
            if sold_out {
                sender.send_or_log(Event::ShowroomBatchSoldOut(showroom_id)).await;
            }
        }
        if let Some(approval) = &approval_request {
            self.emit_approval_requested(approval).await;
        }
        info!(
            sales_order_id = order.id,
            order_number = %order.order_number,
            final_amount = %order.final_amount,
            delivery_type = delivery_type.as_str(),
            "Sales order created"
        );

        Ok(CreatedSalesOrder {
            sales_order: order,
            transport_request,
            approval_request,
            showroom_sold_out: sold_out,
        })
    }

    async fn unique_order_number(
        &self,
        txn: &DatabaseTransaction,
        customer: &str,
        product: &str,
    ) -> Result<String, ServiceError> {
        let today = Utc::now().date_naive();
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let suffix = {
                let mut rng = rand::thread_rng();
                random_suffix(&mut rng, self.suffix_len)
            };
            let candidate = order_number(customer, product, today, &suffix);
            let taken = SalesOrderEntity::find()
                .filter(sales_order::Column::OrderNumber.eq(candidate.as_str()))
                .count(txn)
                .await
                .map_err(ServiceError::db_error)?;
            if taken == 0 {
                return Ok(candidate);
            }
            warn!(order_number = %candidate, "Order number collision, retrying");
        }
        Err(ServiceError::Conflict(
            "Could not generate a unique order number".to_string(),
        ))
    }

    pub async fn get(&self, id: i32) -> Result<sales_order::Model, ServiceError> {
        SalesOrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Sales order", id))
    }

    /// An order with its payments, negotiation history and approval requests.
    pub async fn get_details(&self, id: i32) -> Result<SalesOrderDetail, ServiceError> {
        let sales_order = self.get(id).await?;
        let payments = self.list_payments(id).await?;
        let amount_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let transport_requests = TransportApprovalEntity::find()
            .filter(transport_approval::Column::SalesOrderId.eq(id))
            .order_by_asc(transport_approval::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let approval_requests = ApprovalRequestEntity::find()
            .filter(approval_request::Column::SalesOrderId.eq(id))
            .order_by_asc(approval_request::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(SalesOrderDetail {
            balance_due: (sales_order.final_amount - amount_paid).max(Decimal::ZERO),
            sales_order,
            amount_paid,
            payments,
            transport_requests,
            approval_requests,
        })
    }

    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sales_order::Model>, u64), ServiceError> {
        let mut query = SalesOrderEntity::find();
        if let Some(status) = status {
            query = query.filter(sales_order::Column::OrderStatus.eq(status));
        }
        let paginator = query
            .order_by_desc(sales_order::Column::CreatedAt)
            .order_by_desc(sales_order::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    /// Stores a payment. Every payment waits for finance review before it counts.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        id: i32,
        amount: Decimal,
        payment_method: String,
        reference: Option<String>,
    ) -> Result<sales_transaction::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }
        if payment_method.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment method is required".to_string(),
            ));
        }

        let _guard = self.locks.acquire_one(lock_key("sales", id)).await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;
        if order.order_status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "Sales order {} is cancelled",
                id
            )));
        }

        let transaction = sales_transaction::ActiveModel {
            sales_order_id: Set(id),
            amount: Set(amount),
            payment_method: Set(payment_method.trim().to_string()),
            reference: Set(reference),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut active: sales_order::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::PendingFinanceApproval);
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter("sales.payments.recorded");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PaymentRecorded {
                    sales_order_id: id,
                    transaction_id: transaction.id,
                    amount,
                })
                .await;
        }
        info!(sales_order_id = id, transaction_id = transaction.id, amount = %amount, "Payment recorded, awaiting finance review");
        Ok(transaction)
    }

    /// Finance review of staged payments. Approval recomputes the status from the sum of all
    /// payments; rejection removes only the most recent payment and then recomputes.
    #[instrument(skip(self))]
    pub async fn review_payment(
        &self,
        id: i32,
        approved: bool,
    ) -> Result<sales_order::Model, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("sales", id)).await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;

        if order.payment_status != PaymentStatus::PendingFinanceApproval {
            return Err(ServiceError::InvalidStatus(format!(
                "Sales order {} has no payment awaiting finance approval",
                id
            )));
        }

        if !approved {
            let latest = SalesTransactionEntity::find()
                .filter(sales_transaction::Column::SalesOrderId.eq(id))
                .order_by_desc(sales_transaction::Column::Id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if let Some(latest) = latest {
                SalesTransactionEntity::delete_by_id(latest.id)
                    .exec(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                warn!(sales_order_id = id, transaction_id = latest.id, amount = %latest.amount, "Payment rejected and removed");
            }
        }

        let paid = amount_paid(&txn, id).await?;
        let status = payment_status_for(paid, order.final_amount);
        let mut active: sales_order::ActiveModel = order.into();
        active.payment_status = Set(status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter(if approved {
            "sales.payments.approved"
        } else {
            "sales.payments.rejected"
        });
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PaymentReviewed {
                    sales_order_id: id,
                    approved,
                    payment_status: status,
                })
                .await;
        }
        info!(sales_order_id = id, approved, payment_status = ?status, paid = %paid, "Payment reviewed");
        Ok(updated)
    }

    /// Changes price, quantity or discount before dispatch. Transport cost on negotiated
    /// deliveries only moves through the transport negotiation.
    #[instrument(skip(self))]
    pub async fn update_pricing(
        &self,
        id: i32,
        update: PricingUpdate,
    ) -> Result<sales_order::Model, ServiceError> {
        let showroom_id = self.get(id).await?.showroom_product_id;
        let _guard = self
            .locks
            .acquire([lock_key("sales", id), lock_key("showroom", showroom_id)])
            .await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;
        ensure_open(&order)?;

        let transport_cost = match update.transport_cost {
            Some(cost) if cost != order.transport_cost => {
                if order.delivery_type.needs_transport_approval() {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Transport cost for {} is set through transport negotiation",
                        order.delivery_type.as_str()
                    )));
                }
                if cost != Decimal::ZERO {
                    return Err(ServiceError::ValidationError(format!(
                        "{} carries no transport cost",
                        order.delivery_type.as_str()
                    )));
                }
                cost
            }
            _ => order.transport_cost,
        };
        let unit_price = update.unit_price.unwrap_or(order.unit_price);
        let quantity = update.quantity.unwrap_or(order.quantity);
        let discount = update.discount_amount.unwrap_or(order.discount_amount);
        validate_amounts(unit_price, quantity, transport_cost, discount)?;

        let mut sold_out_change = None;
        if quantity != order.quantity {
            let product = for_update(
                ShowroomProductEntity::find_by_id(showroom_id),
                txn.get_database_backend(),
            )
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Showroom product", showroom_id))?;
            let available = remaining_quantity(&txn, &product).await? + order.quantity;
            if quantity > available {
                return Err(ServiceError::InsufficientStock(format!(
                    "Showroom product {} has {} units available for this order, {} requested",
                    showroom_id, available, quantity
                )));
            }
            let sold_out = available - quantity <= 0;
            if sold_out != (product.showroom_status == ShowroomStatus::Sold) {
                let mut active: showroom_product::ActiveModel = product.into();
                active.showroom_status = Set(if sold_out {
                    ShowroomStatus::Sold
                } else {
                    ShowroomStatus::Available
                });
                active.sold_date = Set(sold_out.then(Utc::now));
                active.update(&txn).await.map_err(ServiceError::db_error)?;
                sold_out_change = Some(sold_out);
            }
        }

        let total = final_amount(unit_price, quantity, transport_cost, discount)?;
        let delta = total - order.final_amount;
        let paid = amount_paid(&txn, id).await?;
        let payment_status = settle_payment_status(order.payment_status, paid, total);

        let mut active: sales_order::ActiveModel = order.into();
        active.unit_price = Set(unit_price);
        active.quantity = Set(quantity);
        active.transport_cost = Set(transport_cost);
        active.discount_amount = Set(discount);
        active.final_amount = Set(total);
        active.payment_status = Set(payment_status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        if delta != Decimal::ZERO {
            let kind = if delta > Decimal::ZERO {
                FinanceKind::Revenue
            } else {
                FinanceKind::Reversal
            };
            record_finance(
                &txn,
                kind,
                delta.abs(),
                format!("Repricing of sales order {}", updated.order_number),
                "sales_order",
                id,
            )
            .await?;
        }
        super::commit(txn).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::SalesOrderRepriced {
                    sales_order_id: id,
                    final_amount: total,
                })
                .await;
            match sold_out_change {
                Some(true) => sender.send_or_log(Event::ShowroomBatchSoldOut(showroom_id)).await,
                Some(false) => sender.send_or_log(Event::ShowroomBatchReopened(showroom_id)).await,
                None => {}
            }
        }
        info!(sales_order_id = id, final_amount = %total, "Sales order repriced");
        Ok(updated)
    }

    /// Applies a coupon discount immediately and opens an approval request for it.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        id: i32,
        coupon_code: String,
        discount_amount: Decimal,
        requested_by: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let coupon_code = coupon_code.trim().to_string();
        if coupon_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }

        let _guard = self.locks.acquire_one(lock_key("sales", id)).await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;
        ensure_open(&order)?;
        ensure_no_pending_approval(&txn, id, ApprovalKind::Coupon).await?;

        validate_amounts(
            order.unit_price,
            order.quantity,
            order.transport_cost,
            discount_amount,
        )?;
        let total = final_amount(
            order.unit_price,
            order.quantity,
            order.transport_cost,
            discount_amount,
        )?;
        let paid = amount_paid(&txn, id).await?;
        let previous_discount = order.discount_amount;
        let payment_status = settle_payment_status(order.payment_status, paid, total);

        let mut active: sales_order::ActiveModel = order.into();
        active.coupon_code = Set(Some(coupon_code.clone()));
        active.discount_amount = Set(discount_amount);
        active.final_amount = Set(total);
        active.payment_status = Set(payment_status);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let approval = approval_request::ActiveModel {
            sales_order_id: Set(id),
            kind: Set(ApprovalKind::Coupon),
            status: Set(ApprovalStatus::Pending),
            previous_discount: Set(Some(previous_discount)),
            requested_by: Set(requested_by),
            notes: Set(Some(format!("Coupon {}", coupon_code))),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        self.emit_approval_requested(&approval).await;
        info!(sales_order_id = id, approval_request_id = approval.id, coupon = %coupon_code, "Coupon staged for approval");
        Ok(ApprovalOutcome {
            sales_order: updated,
            approval_request: approval,
        })
    }

    /// Switches the order to free delivery pending admin approval.
    #[instrument(skip(self))]
    pub async fn request_free_delivery(
        &self,
        id: i32,
        requested_by: Option<String>,
        notes: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let _guard = self.locks.acquire_one(lock_key("sales", id)).await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;
        ensure_open(&order)?;
        if order.delivery_type == DeliveryType::FreeDelivery {
            return Err(ServiceError::InvalidOperation(format!(
                "Sales order {} already uses free delivery",
                id
            )));
        }
        ensure_no_pending_approval(&txn, id, ApprovalKind::FreeDelivery).await?;

        let previous = order.delivery_type;
        let mut active: sales_order::ActiveModel = order.into();
        active.previous_delivery_type = Set(Some(previous));
        active.delivery_type = Set(DeliveryType::FreeDelivery);
        active.order_status = Set(OrderStatus::PendingFreeDeliveryApproval);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let approval = approval_request::ActiveModel {
            sales_order_id: Set(id),
            kind: Set(ApprovalKind::FreeDelivery),
            status: Set(ApprovalStatus::Pending),
            previous_discount: Set(None),
            requested_by: Set(requested_by),
            notes: Set(notes),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        self.emit_approval_requested(&approval).await;
        info!(sales_order_id = id, approval_request_id = approval.id, previous = previous.as_str(), "Free delivery requested");
        Ok(ApprovalOutcome {
            sales_order: updated,
            approval_request: approval,
        })
    }

    /// Admin decision on a coupon or free-delivery request.
    #[instrument(skip(self))]
    pub async fn decide_approval(
        &self,
        approval_id: i32,
        approved: bool,
        decided_by: Option<String>,
        notes: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let sales_order_id = ApprovalRequestEntity::find_by_id(approval_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Approval request", approval_id))?
            .sales_order_id;

        let _guard = self
            .locks
            .acquire_one(lock_key("sales", sales_order_id))
            .await;
        let txn = super::begin(&self.db).await?;
        let approval = for_update(
            ApprovalRequestEntity::find_by_id(approval_id),
            txn.get_database_backend(),
        )
        .one(&txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Approval request", approval_id))?;
        if approval.status != ApprovalStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Approval request {} is already {:?}",
                approval_id, approval.status
            )));
        }
        let order = load_order_for_update(&txn, sales_order_id).await?;
        ensure_open(&order)?;

        let kind = approval.kind;
        let mut opened_request = None;
        let updated_order = match (kind, approved) {
            (ApprovalKind::Coupon, true) => {
                let mut active: sales_order::ActiveModel = order.into();
                active.finance_bypass = Set(true);
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            (ApprovalKind::Coupon, false) => {
                let discount = approval.previous_discount.unwrap_or(Decimal::ZERO);
                let total = final_amount(
                    order.unit_price,
                    order.quantity,
                    order.transport_cost,
                    discount,
                )?;
                let paid = amount_paid(&txn, sales_order_id).await?;
                let payment_status = settle_payment_status(order.payment_status, paid, total);
                let mut active: sales_order::ActiveModel = order.into();
                active.coupon_code = Set(None);
                active.discount_amount = Set(discount);
                active.final_amount = Set(total);
                active.payment_status = Set(payment_status);
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            (ApprovalKind::FreeDelivery, true) => {
                supersede_transport_requests(&txn, sales_order_id, decided_by.clone()).await?;
                let total = final_amount(
                    order.unit_price,
                    order.quantity,
                    Decimal::ZERO,
                    order.discount_amount,
                )?;
                let paid = amount_paid(&txn, sales_order_id).await?;
                let payment_status = settle_payment_status(order.payment_status, paid, total);
                let mut active: sales_order::ActiveModel = order.into();
                active.delivery_type = Set(DeliveryType::FreeDelivery);
                active.transport_cost = Set(Decimal::ZERO);
                active.final_amount = Set(total);
                active.payment_status = Set(payment_status);
                active.finance_bypass = Set(true);
                active.order_status = Set(OrderStatus::Confirmed);
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            (ApprovalKind::FreeDelivery, false) => {
                let restored = order
                    .previous_delivery_type
                    .unwrap_or(DeliveryType::SelfDelivery);
                let transport_cost = if restored == DeliveryType::SelfDelivery {
                    Decimal::ZERO
                } else {
                    order.transport_cost
                };
                let total = final_amount(
                    order.unit_price,
                    order.quantity,
                    transport_cost,
                    order.discount_amount,
                )?;
                let paid = amount_paid(&txn, sales_order_id).await?;
                let payment_status = settle_payment_status(order.payment_status, paid, total);
                let mut active: sales_order::ActiveModel = order.into();
                active.delivery_type = Set(restored);
                active.previous_delivery_type = Set(None);
                active.transport_cost = Set(transport_cost);
                active.final_amount = Set(total);
                active.payment_status = Set(payment_status);
                active.order_status = Set(if restored.needs_transport_approval() {
                    OrderStatus::PendingTransportApproval
                } else {
                    OrderStatus::Confirmed
                });
                let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
                if restored.needs_transport_approval() {
                    let (request, created) = open_request_in(&txn, &updated).await?;
                    if created {
                        opened_request = Some(request);
                    }
                }
                updated
            }
        };

        let mut active: approval_request::ActiveModel = approval.into();
        active.status = Set(if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        });
        active.decided_by = Set(decided_by);
        if notes.is_some() {
            active.notes = Set(notes);
        }
        let decided = active.update(&txn).await.map_err(ServiceError::db_error)?;
        super::commit(txn).await?;

        metrics::increment_counter(if approved {
            "approvals.approved"
        } else {
            "approvals.rejected"
        });
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ApprovalDecided {
                    approval_request_id: approval_id,
                    kind,
                    approved,
                })
                .await;
            if let Some(request) = &opened_request {
                sender
                    .send_or_log(Event::TransportRequestCreated {
                        approval_id: request.id,
                        sales_order_id,
                    })
                    .await;
            }
        }
        info!(approval_request_id = approval_id, sales_order_id, kind = ?kind, approved, "Approval request decided");

        Ok(ApprovalOutcome {
            sales_order: updated_order,
            approval_request: decided,
        })
    }

    /// Cancels an order that has not left for dispatch and returns its units to the batch.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: i32,
        reason: Option<String>,
    ) -> Result<sales_order::Model, ServiceError> {
        let showroom_id = self.get(id).await?.showroom_product_id;
        let _guard = self
            .locks
            .acquire([lock_key("sales", id), lock_key("showroom", showroom_id)])
            .await;
        let txn = super::begin(&self.db).await?;
        let order = load_order_for_update(&txn, id).await?;
        ensure_open(&order)?;

        supersede_transport_requests(&txn, id, Some("system".to_string())).await?;
        let pending_approvals = ApprovalRequestEntity::find()
            .filter(approval_request::Column::SalesOrderId.eq(id))
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        for approval in pending_approvals {
            let mut active: approval_request::ActiveModel = approval.into();
            active.status = Set(ApprovalStatus::Rejected);
            active.decided_by = Set(Some("system".to_string()));
            active.notes = Set(Some("Sales order cancelled".to_string()));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let order_number = order.order_number.clone();
        let reversal = order.final_amount;
        let mut active: sales_order::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Cancelled);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        record_finance(
            &txn,
            FinanceKind::Reversal,
            reversal,
            match &reason {
                Some(reason) => format!("Cancellation of sales order {}: {}", order_number, reason),
                None => format!("Cancellation of sales order {}", order_number),
            },
            "sales_order",
            id,
        )
        .await?;

        let product = ShowroomProductEntity::find_by_id(showroom_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Showroom product", showroom_id))?;
        let mut reopened = false;
        if product.showroom_status == ShowroomStatus::Sold
            && remaining_quantity(&txn, &product).await? > 0
        {
            let mut active: showroom_product::ActiveModel = product.into();
            active.showroom_status = Set(ShowroomStatus::Available);
            active.sold_date = Set(None);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            reopened = true;
        }
        super::commit(txn).await?;

        metrics::increment_counter("sales.orders.cancelled");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::SalesOrderCancelled(id)).await;
            if reopened {
                sender
                    .send_or_log(Event::ShowroomBatchReopened(showroom_id))
                    .await;
            }
        }
        info!(sales_order_id = id, reopened, "Sales order cancelled");
        Ok(updated)
    }

    pub async fn list_payments(
        &self,
        id: i32,
    ) -> Result<Vec<sales_transaction::Model>, ServiceError> {
        self.get(id).await?;
        SalesTransactionEntity::find()
            .filter(sales_transaction::Column::SalesOrderId.eq(id))
            .order_by_asc(sales_transaction::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Finance ledger, optionally narrowed to one reference such as `sales_order`.
    pub async fn list_finance_transactions(
        &self,
        reference_type: Option<String>,
        reference_id: Option<i32>,
    ) -> Result<Vec<finance_transaction::Model>, ServiceError> {
        let mut query = FinanceTransactionEntity::find();
        if let Some(reference_type) = reference_type {
            query = query.filter(finance_transaction::Column::ReferenceType.eq(reference_type));
        }
        if let Some(reference_id) = reference_id {
            query = query.filter(finance_transaction::Column::ReferenceId.eq(reference_id));
        }
        query
            .order_by_asc(finance_transaction::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn emit_approval_requested(&self, approval: &approval_request::Model) {
        metrics::increment_counter("approvals.requested");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ApprovalRequested {
                    approval_request_id: approval.id,
                    sales_order_id: approval.sales_order_id,
                    kind: approval.kind,
                })
                .await;
        }
    }
}

async fn ensure_no_pending_approval(
    txn: &DatabaseTransaction,
    sales_order_id: i32,
    kind: ApprovalKind,
) -> Result<(), ServiceError> {
    let pending = ApprovalRequestEntity::find()
        .filter(approval_request::Column::SalesOrderId.eq(sales_order_id))
        .filter(approval_request::Column::Kind.eq(kind))
        .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
        .count(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if pending > 0 {
        return Err(ServiceError::Conflict(format!(
            "Sales order {} already has a pending {:?} approval",
            sales_order_id, kind
        )));
    }
    Ok(())
}

/// Closes any open transport negotiation for an order that no longer needs one.
async fn supersede_transport_requests(
    txn: &DatabaseTransaction,
    sales_order_id: i32,
    decided_by: Option<String>,
) -> Result<(), ServiceError> {
    let pending = TransportApprovalEntity::find()
        .filter(transport_approval::Column::SalesOrderId.eq(sales_order_id))
        .filter(transport_approval::Column::Status.eq(TransportApprovalStatus::Pending))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;
    for request in pending {
        let mut active: transport_approval::ActiveModel = request.into();
        active.status = Set(TransportApprovalStatus::Rejected);
        active.rejected_by = Set(decided_by.clone());
        active.notes = Set(Some("Superseded".to_string()));
        active.update(txn).await.map_err(ServiceError::db_error)?;
    }
    Ok(())
}

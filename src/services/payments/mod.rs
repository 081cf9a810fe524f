pub mod paypal;
pub mod stripe;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{order, order_item, payment_detail, variant, PaymentMethod};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// External status value stored when a payment has been captured.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Payment workflow state of an order, derived from its payment detail
/// row. UNINITIALIZED carries no external id; CREATED holds the provider's
/// session/order id; COMPLETED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Uninitialized,
    Created,
    Completed,
}

impl PaymentState {
    pub fn of(detail: &payment_detail::Model) -> Self {
        if detail.payment_method_status.as_deref() == Some(STATUS_COMPLETED) {
            PaymentState::Completed
        } else if detail.payment_method_id.is_some() || detail.payment_method_status.is_some() {
            PaymentState::Created
        } else {
            PaymentState::Uninitialized
        }
    }
}

fn order_not_found(order_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", order_id))
}

async fn owned_order<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    let order = order::Entity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| order_not_found(order_id))?;
    if order.user_id != user_id {
        return Err(order_not_found(order_id));
    }
    Ok(order)
}

async fn payment_detail_of<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<payment_detail::Model, ServiceError> {
    payment_detail::Entity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| order_not_found(order_id))
}

/// Checks that an order is eligible for a new payment session: owned by
/// the caller, unpaid, intended for `method`, and UNINITIALIZED. Any
/// failed condition is NOT_FOUND without saying which.
pub(crate) async fn ensure_uninitialized<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    order_id: Uuid,
    method: PaymentMethod,
) -> Result<order::Model, ServiceError> {
    let order = owned_order(db, user_id, order_id).await?;
    let detail = payment_detail_of(db, order_id).await?;
    if order.paid_at.is_some()
        || detail.payment_method != method
        || PaymentState::of(&detail) != PaymentState::Uninitialized
    {
        return Err(order_not_found(order_id));
    }
    Ok(order)
}

/// Stores a freshly created provider session/order, moving the workflow to
/// CREATED. The eligibility guard is re-evaluated inside the transaction;
/// a concurrent session creation loses with NOT_FOUND.
#[instrument(skip(db))]
pub(crate) async fn store_external_session(
    db: &DatabaseConnection,
    user_id: Uuid,
    order_id: Uuid,
    method: PaymentMethod,
    external_id: &str,
    external_status: &str,
) -> Result<(), ServiceError> {
    let txn = db.begin().await?;
    ensure_uninitialized(&txn, user_id, order_id, method).await?;

    let detail = payment_detail::ActiveModel {
        order_id: Set(order_id),
        payment_method: Set(method),
        payment_method_id: Set(Some(external_id.to_string())),
        payment_method_status: Set(Some(external_status.to_string())),
    };
    payment_detail::Entity::update(detail).exec(&txn).await?;
    txn.commit().await?;
    Ok(())
}

/// Resets a CREATED payment back to UNINITIALIZED so checkout can be
/// retried. The order must be unpaid and the stored external id must match
/// `external_id`; otherwise NOT_FOUND.
#[instrument(skip(db, event_sender))]
pub(crate) async fn reset_payment(
    db: &DatabaseConnection,
    event_sender: &EventSender,
    user_id: Uuid,
    order_id: Uuid,
    method: PaymentMethod,
    external_id: &str,
) -> Result<(), ServiceError> {
    let txn = db.begin().await?;

    let order = owned_order(&txn, user_id, order_id).await?;
    let detail = payment_detail_of(&txn, order_id).await?;
    if order.paid_at.is_some()
        || detail.payment_method != method
        || detail.payment_method_id.as_deref() != Some(external_id)
        || PaymentState::of(&detail) == PaymentState::Completed
    {
        return Err(order_not_found(order_id));
    }

    let detail = payment_detail::ActiveModel {
        order_id: Set(order_id),
        payment_method: Set(method),
        payment_method_id: Set(None),
        payment_method_status: Set(None),
    };
    payment_detail::Entity::update(detail).exec(&txn).await?;
    txn.commit().await?;

    event_sender
        .send_or_log(Event::PaymentCanceled { order_id })
        .await;
    info!("Reset payment state for order {}", order_id);
    Ok(())
}

/// Marks an order paid and commits its stock, the single atomic capture
/// transaction both providers converge on.
///
/// Guard, evaluated inside the transaction: order owned and unpaid,
/// payment detail in state CREATED for exactly `external_id` and `method`.
/// An already-COMPLETED order fails the guard with NOT_FOUND, so a second
/// capture never decrements stock twice.
///
/// The per-item stock decrement is unconditional; two captures racing over
/// the last unit of a variant can drive stock negative. Known limitation.
#[instrument(skip(db, event_sender))]
pub(crate) async fn complete_payment(
    db: &DatabaseConnection,
    event_sender: &EventSender,
    user_id: Uuid,
    order_id: Uuid,
    method: PaymentMethod,
    external_id: &str,
) -> Result<(), ServiceError> {
    let txn = db.begin().await?;

    let order = owned_order(&txn, user_id, order_id).await?;
    let detail = payment_detail_of(&txn, order_id).await?;
    if order.paid_at.is_some()
        || detail.payment_method != method
        || detail.payment_method_id.as_deref() != Some(external_id)
        || PaymentState::of(&detail) != PaymentState::Created
    {
        return Err(order_not_found(order_id));
    }

    let now = Utc::now();
    let mut order: order::ActiveModel = order.into();
    order.paid_at = Set(Some(now));
    order.updated_at = Set(now);
    order.update(&txn).await?;

    let detail = payment_detail::ActiveModel {
        order_id: Set(order_id),
        payment_method: Set(method),
        payment_method_id: Set(Some(external_id.to_string())),
        payment_method_status: Set(Some(STATUS_COMPLETED.to_string())),
    };
    payment_detail::Entity::update(detail).exec(&txn).await?;

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&txn)
        .await?;
    for item in items {
        let v = variant::Entity::find_by_id(item.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Variant {} referenced by order {} is gone",
                    item.variant_id, order_id
                ))
            })?;
        let stock = v.quantity_in_stock;
        let sold = v.sold_amount;
        let mut v: variant::ActiveModel = v.into();
        v.quantity_in_stock = Set(stock - item.quantity);
        v.sold_amount = Set(sold + item.quantity);
        v.updated_at = Set(now);
        v.update(&txn).await?;
    }

    txn.commit().await?;

    event_sender.send_or_log(Event::OrderPaid(order_id)).await;
    info!("Order {} paid and stock committed", order_id);
    Ok(())
}

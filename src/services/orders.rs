use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{
    cart, cart_item, order, order_item, payment_detail, shipping_address, variant,
    PaymentMethod,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::cart::{db_cart_raw_lines, has_invalid_lines, lines_subtotal, load_cart_lines};
use crate::services::catalog::{load_variant_details, VariantDetail};
use crate::services::pricing::{shipping_cost, ShippingRates};

/// Destination address supplied at placement or when editing an order.
#[derive(Debug, Clone)]
pub struct ShippingAddressInput {
    pub country: String,
    pub state: String,
    pub city: String,
    pub postal_code: String,
    pub street_address: String,
    pub complement: String,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub shipping_address: ShippingAddressInput,
    pub payment_method: PaymentMethod,
}

/// A placed order joined with its lines, payment state and destination.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub status: &'static str,
    pub items: Vec<OrderLineDetail>,
    pub payment_detail: payment_detail::Model,
    pub shipping_address: shipping_address::Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLineDetail {
    pub id: Uuid,
    pub quantity: i32,
    pub variant: Option<VariantDetail>,
}

/// Human-readable order progress used by the storefront's order list.
pub fn order_status(order: &order::Model) -> &'static str {
    if order.shipped_at.is_some() {
        "Shipped"
    } else if order.paid_at.is_some() {
        "Waiting shipping"
    } else {
        "Waiting payment"
    }
}

/// Order placement and post-placement reads/edits.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Places an order from the user's cart.
    ///
    /// The cart must be non-empty with every line valid (variant present,
    /// available for sale, quantity within stock). Totals are computed once
    /// here and frozen: the order snapshot never changes when catalog
    /// prices or discounts change later. Order, items, payment detail and
    /// shipping address are inserted and the cart deleted in one
    /// transaction.
    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let raw = db_cart_raw_lines(&txn, user_id).await?;
        let lines = load_cart_lines(&txn, raw).await?;
        if lines.is_empty() || has_invalid_lines(&lines) {
            return Err(ServiceError::BadRequest(
                "Your cart is empty or has invalid items.".to_string(),
            ));
        }

        let items_subtotal = lines_subtotal(&lines);
        let rates = ShippingRates::from(self.config.as_ref());
        let shipping = shipping_cost(
            &rates,
            &self.config.domestic_country,
            &input.shipping_address.country,
            items_subtotal,
        );
        let total_price = items_subtotal + shipping;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let new_order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            items_subtotal: Set(items_subtotal),
            shipping_cost: Set(shipping),
            total_price: Set(total_price),
            currency_code: Set(self.config.default_currency.clone()),
            paid_at: Set(None),
            shipped_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let placed = new_order.insert(&txn).await?;

        for line in &lines {
            let variant = line
                .variant
                .as_ref()
                .ok_or_else(|| {
                    // Unreachable: invalid lines were rejected above
                    ServiceError::InternalError("Cart line lost its variant".to_string())
                })?;
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(variant.id),
                quantity: Set(line.quantity),
            };
            item.insert(&txn).await?;
        }

        let detail = payment_detail::ActiveModel {
            order_id: Set(order_id),
            payment_method: Set(input.payment_method),
            payment_method_id: Set(None),
            payment_method_status: Set(None),
        };
        detail.insert(&txn).await?;

        let addr = &input.shipping_address;
        let address = shipping_address::ActiveModel {
            order_id: Set(order_id),
            country: Set(addr.country.clone()),
            state: Set(addr.state.clone()),
            city: Set(addr.city.clone()),
            postal_code: Set(addr.postal_code.clone()),
            street_address: Set(addr.street_address.clone()),
            complement: Set(addr.complement.clone()),
        };
        address.insert(&txn).await?;

        self.delete_user_cart(&txn, user_id).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderPlaced(order_id))
            .await;
        info!(
            "Placed order {} for user {}: subtotal {} + shipping {} = {}",
            order_id, user_id, items_subtotal, shipping, total_price
        );
        Ok(placed)
    }

    async fn delete_user_cart<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        if let Some(user_cart) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(db)
            .await?
        {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::CartId.eq(user_cart.id))
                .exec(db)
                .await?;
            cart::Entity::delete_by_id(user_cart.id).exec(db).await?;
        }
        Ok(())
    }

    /// Full order detail. Missing orders and orders owned by someone else
    /// are both NOT_FOUND.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let variant_ids: Vec<Uuid> = items.iter().map(|i| i.variant_id).collect();
        let variants = variant::Entity::find()
            .filter(variant::Column::Id.is_in(variant_ids))
            .all(&*self.db)
            .await?;
        let mut details: std::collections::HashMap<Uuid, VariantDetail> =
            load_variant_details(&*self.db, variants)
                .await?
                .into_iter()
                .map(|vd| (vd.variant.id, vd))
                .collect();

        let detail = payment_detail::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let address = shipping_address::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok(OrderDetail {
            status: order_status(&order),
            items: items
                .into_iter()
                .map(|i| OrderLineDetail {
                    id: i.id,
                    quantity: i.quantity,
                    variant: details.remove(&i.variant_id),
                })
                .collect(),
            payment_detail: detail,
            shipping_address: address,
            order,
        })
    }

    /// The user's orders, newest first.
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Replaces the shipping address and recomputes shipping cost and total
    /// from the frozen items subtotal. Only allowed while the order is
    /// still editable.
    #[instrument(skip(self, input))]
    pub async fn update_shipping_address(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: ShippingAddressInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = self.editable_order(&txn, user_id, order_id).await?;

        let rates = ShippingRates::from(self.config.as_ref());
        let shipping = shipping_cost(
            &rates,
            &self.config.domestic_country,
            &input.country,
            order.items_subtotal,
        );
        let total = order.items_subtotal + shipping;

        let address = shipping_address::ActiveModel {
            order_id: Set(order_id),
            country: Set(input.country),
            state: Set(input.state),
            city: Set(input.city),
            postal_code: Set(input.postal_code),
            street_address: Set(input.street_address),
            complement: Set(input.complement),
        };
        shipping_address::Entity::update(address).exec(&txn).await?;

        let mut order: order::ActiveModel = order.into();
        order.shipping_cost = Set(shipping);
        order.total_price = Set(total);
        order.updated_at = Set(Utc::now());
        let updated = order.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderUpdated(order_id))
            .await;
        Ok(updated)
    }

    /// Switches the intended payment provider. Only allowed while the order
    /// is still editable.
    #[instrument(skip(self))]
    pub async fn update_payment_method(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        self.editable_order(&txn, user_id, order_id).await?;

        let detail = payment_detail::ActiveModel {
            order_id: Set(order_id),
            payment_method: Set(method),
            payment_method_id: Set(None),
            payment_method_status: Set(None),
        };
        payment_detail::Entity::update(detail).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderUpdated(order_id))
            .await;
        Ok(())
    }

    async fn owned_order<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Order {} not found", order_id));
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;
        if order.user_id != user_id {
            return Err(not_found());
        }
        Ok(order)
    }

    /// An order is editable only while unpaid and before any external
    /// payment session exists. Ineligible orders are NOT_FOUND, same as
    /// missing ones.
    async fn editable_order<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = self.owned_order(db, user_id, order_id).await?;
        let detail = payment_detail::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.paid_at.is_some() || detail.payment_method_id.is_some() {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        Ok(order)
    }
}

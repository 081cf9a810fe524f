pub mod cookie;
pub mod merge;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    attribute, cart, cart_item, discount, product, variant, variant_image,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog::load_variant_details;
use crate::services::pricing;

pub use cookie::{CartCookieCodec, GuestCart, GuestCartItem, CART_COOKIE_NAME};

/// A cart line joined with live catalog data. The variant is `None` when it
/// was deleted from the catalog after the line was added; such lines are
/// invalid and price at zero.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineDetail {
    pub item_id: Uuid,
    pub quantity: i32,
    pub variant: Option<variant::Model>,
    pub product: Option<product::Model>,
    pub discount: Option<discount::Model>,
    pub attributes: Vec<attribute::Model>,
    pub images: Vec<variant_image::Model>,
    /// Effective unit price in minor units: discounted, zero when the
    /// variant is missing or unavailable.
    pub unit_price: i64,
}

impl CartLineDetail {
    pub fn is_invalid(&self) -> bool {
        match &self.variant {
            None => true,
            Some(v) => !v.available_for_sale || self.quantity > v.quantity_in_stock,
        }
    }

    /// Quantity that actually counts toward totals: zero when the line
    /// requests more than is in stock.
    pub fn effective_quantity(&self) -> i64 {
        match &self.variant {
            None => 0,
            Some(v) if self.quantity > v.quantity_in_stock => 0,
            _ => i64::from(self.quantity),
        }
    }

    pub fn line_total(&self) -> i64 {
        self.unit_price * self.effective_quantity()
    }
}

/// Subtotal over joined lines, with the defensive zeroing rules applied
/// per line.
pub fn lines_subtotal(lines: &[CartLineDetail]) -> i64 {
    lines.iter().map(CartLineDetail::line_total).sum()
}

pub fn has_invalid_lines(lines: &[CartLineDetail]) -> bool {
    lines.iter().any(CartLineDetail::is_invalid)
}

/// Capability interface over the caller's cart. Selected once per request:
/// authenticated shoppers get [`DbCartRepository`], guests get
/// [`GuestCartRepository`] over the deserialized cookie cart.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Lines joined with live variant/product/discount data. Expired
    /// discounts are already nulled out.
    async fn items(&self) -> Result<Vec<CartLineDetail>, ServiceError>;

    /// Upsert: an existing (cart, variant) line gains `quantity`, otherwise
    /// a new line is created. The variant must exist.
    async fn add_item(&mut self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError>;

    /// Sets a line's quantity. The line must belong to this cart and the
    /// quantity must not exceed live stock.
    async fn update_quantity(&mut self, item_id: Uuid, quantity: i32) -> Result<(), ServiceError>;

    async fn remove_item(&mut self, item_id: Uuid) -> Result<(), ServiceError>;

    /// Total quantity across all lines (cart badge).
    async fn sum_quantities(&self) -> Result<i64, ServiceError>;

    /// Total quantity across lines belonging to one product (product-page
    /// badge).
    async fn count_items_by_product(&self, product_id: Uuid) -> Result<i64, ServiceError>;

    /// The mutated guest cart, for handlers to re-serialize into the
    /// cookie. `None` for DB-backed carts.
    fn guest_snapshot(&self) -> Option<&GuestCart>;
}

fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Joins raw (item, variant, quantity) lines with live catalog data.
pub(crate) async fn load_cart_lines<C: ConnectionTrait>(
    db: &C,
    raw: Vec<(Uuid, Uuid, i32)>,
) -> Result<Vec<CartLineDetail>, ServiceError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let now = Utc::now();

    let variant_ids: Vec<Uuid> = raw.iter().map(|(_, vid, _)| *vid).collect();
    let variants = variant::Entity::find()
        .filter(variant::Column::Id.is_in(variant_ids))
        .all(db)
        .await?;
    let product_ids: Vec<Uuid> = variants.iter().map(|v| v.product_id).collect();
    let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let discount_ids: Vec<Uuid> = products.values().filter_map(|p| p.discount_id).collect();
    let discounts: HashMap<Uuid, discount::Model> = if discount_ids.is_empty() {
        HashMap::new()
    } else {
        discount::Entity::find()
            .filter(discount::Column::Id.is_in(discount_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect()
    };

    let mut details: HashMap<Uuid, crate::services::catalog::VariantDetail> =
        load_variant_details(db, variants)
            .await?
            .into_iter()
            .map(|vd| (vd.variant.id, vd))
            .collect();

    Ok(raw
        .into_iter()
        .map(|(item_id, variant_id, quantity)| match details.remove(&variant_id) {
            Some(vd) => {
                let product = products.get(&vd.variant.product_id).cloned();
                let discount = product
                    .as_ref()
                    .and_then(|p| p.discount_id)
                    .and_then(|id| discounts.get(&id).cloned())
                    .filter(|d| d.is_active_at(now));
                let line = pricing::CartLine {
                    variant: &vd.variant,
                    discount: discount.as_ref(),
                    quantity,
                };
                let unit_price = pricing::line_unit_price(&line, now);
                CartLineDetail {
                    item_id,
                    quantity,
                    variant: Some(vd.variant),
                    product,
                    discount,
                    attributes: vd.attributes,
                    images: vd.images,
                    unit_price,
                }
            }
            None => CartLineDetail {
                item_id,
                quantity,
                variant: None,
                product: None,
                discount: None,
                attributes: Vec::new(),
                images: Vec::new(),
                unit_price: 0,
            },
        })
        .collect())
}

/// Raw (item, variant, quantity) lines of a user's DB cart; empty when the
/// user has no cart yet.
pub(crate) async fn db_cart_raw_lines<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> Result<Vec<(Uuid, Uuid, i32)>, ServiceError> {
    let Some(cart) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(db)
        .await?
    else {
        return Ok(Vec::new());
    };
    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(db)
        .await?;
    Ok(items
        .into_iter()
        .map(|i| (i.id, i.variant_id, i.quantity))
        .collect())
}

/// Constructs the per-request cart repository from the caller's identity.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub fn for_user(&self, user_id: Uuid) -> DbCartRepository {
        DbCartRepository {
            db: self.db.clone(),
            event_sender: self.event_sender.clone(),
            user_id,
        }
    }

    pub fn for_guest(&self, cart: GuestCart) -> GuestCartRepository {
        GuestCartRepository {
            db: self.db.clone(),
            cart,
        }
    }
}

/// Cart rows owned by an authenticated user.
pub struct DbCartRepository {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    user_id: Uuid,
}

impl DbCartRepository {
    async fn find_or_create_cart<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(self.user_id))
            .one(db)
            .await?
        {
            return Ok(existing);
        }
        let now = Utc::now();
        let new_cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(new_cart.insert(db).await?)
    }

    /// Loads an item and proves it belongs to this user's cart. A foreign
    /// or missing item is NOT_FOUND either way.
    async fn owned_item<C: ConnectionTrait>(
        &self,
        db: &C,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));
        let item = cart_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;
        let cart = cart::Entity::find_by_id(item.cart_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;
        if cart.user_id != self.user_id {
            return Err(not_found());
        }
        Ok(item)
    }
}

#[async_trait]
impl CartRepository for DbCartRepository {
    async fn items(&self) -> Result<Vec<CartLineDetail>, ServiceError> {
        let raw = db_cart_raw_lines(&*self.db, self.user_id).await?;
        load_cart_lines(&*self.db, raw).await
    }

    #[instrument(skip(self))]
    async fn add_item(&mut self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        check_quantity(quantity)?;
        let txn = self.db.begin().await?;

        variant::Entity::find_by_id(variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        let cart = self.find_or_create_cart(&txn).await?;

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let current = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current + quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                variant_id: Set(variant_id),
                quantity: Set(quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                variant_id,
            })
            .await;
        info!("Added variant {} x{} to cart {}", variant_id, quantity, cart.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_quantity(&mut self, item_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        check_quantity(quantity)?;
        let txn = self.db.begin().await?;

        let item = self.owned_item(&txn, item_id).await?;
        let variant = variant::Entity::find_by_id(item.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", item.variant_id))
            })?;
        if quantity > variant.quantity_in_stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} left in stock",
                variant.quantity_in_stock
            )));
        }

        let cart_id = item.cart_id;
        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_item(&mut self, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.owned_item(&*self.db, item_id).await?;
        let cart_id = item.cart_id;
        item.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;
        Ok(())
    }

    async fn sum_quantities(&self) -> Result<i64, ServiceError> {
        let raw = db_cart_raw_lines(&*self.db, self.user_id).await?;
        Ok(raw.iter().map(|(_, _, q)| i64::from(*q)).sum())
    }

    async fn count_items_by_product(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        let raw = db_cart_raw_lines(&*self.db, self.user_id).await?;
        if raw.is_empty() {
            return Ok(0);
        }
        let variant_ids: Vec<Uuid> = raw.iter().map(|(_, vid, _)| *vid).collect();
        let matching: Vec<Uuid> = variant::Entity::find()
            .filter(variant::Column::Id.is_in(variant_ids))
            .filter(variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        Ok(raw
            .iter()
            .filter(|(_, vid, _)| matching.contains(vid))
            .map(|(_, _, q)| i64::from(*q))
            .sum())
    }

    fn guest_snapshot(&self) -> Option<&GuestCart> {
        None
    }
}

/// Cookie-backed cart for anonymous sessions. Mutations happen on the
/// in-memory [`GuestCart`]; the handler re-serializes the snapshot into
/// the `Set-Cookie` header.
pub struct GuestCartRepository {
    db: Arc<DatabaseConnection>,
    cart: GuestCart,
}

impl GuestCartRepository {
    pub fn into_cart(self) -> GuestCart {
        self.cart
    }
}

#[async_trait]
impl CartRepository for GuestCartRepository {
    async fn items(&self) -> Result<Vec<CartLineDetail>, ServiceError> {
        let raw: Vec<(Uuid, Uuid, i32)> = self
            .cart
            .items
            .iter()
            .map(|i| (i.id, i.variant_id, i.quantity))
            .collect();
        load_cart_lines(&*self.db, raw).await
    }

    async fn add_item(&mut self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        check_quantity(quantity)?;
        variant::Entity::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
        self.cart.add_item(variant_id, quantity);
        Ok(())
    }

    async fn update_quantity(&mut self, item_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        check_quantity(quantity)?;
        let variant_id = self
            .cart
            .item_mut(item_id)
            .map(|i| i.variant_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;
        let variant = variant::Entity::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
        if quantity > variant.quantity_in_stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} left in stock",
                variant.quantity_in_stock
            )));
        }
        if let Some(item) = self.cart.item_mut(item_id) {
            item.quantity = quantity;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_item(&mut self, item_id: Uuid) -> Result<(), ServiceError> {
        if !self.cart.remove_item(item_id) {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }
        Ok(())
    }

    async fn sum_quantities(&self) -> Result<i64, ServiceError> {
        Ok(self.cart.items.iter().map(|i| i64::from(i.quantity)).sum())
    }

    async fn count_items_by_product(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        let variant_ids: Vec<Uuid> = self.cart.items.iter().map(|i| i.variant_id).collect();
        if variant_ids.is_empty() {
            return Ok(0);
        }
        let matching: Vec<Uuid> = variant::Entity::find()
            .filter(variant::Column::Id.is_in(variant_ids))
            .filter(variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        Ok(self
            .cart
            .items
            .iter()
            .filter(|i| matching.contains(&i.variant_id))
            .map(|i| i64::from(i.quantity))
            .sum())
    }

    fn guest_snapshot(&self) -> Option<&GuestCart> {
        Some(&self.cart)
    }
}

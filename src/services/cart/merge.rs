use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{cart, cart_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::cart::cookie::GuestCart;

/// The update/insert/delete triplet that reconciles a guest cart into a
/// user's cart. Computed purely so the reconciliation rule is testable
/// without a database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergePlan {
    /// (user cart item id, new quantity) — variant present in both carts,
    /// guest quantity wins.
    pub updates: Vec<(Uuid, i32)>,
    /// (variant id, quantity) — variant only in the guest cart.
    pub inserts: Vec<(Uuid, i32)>,
    /// User cart item ids for variants absent from the guest cart.
    pub delete_ids: Vec<Uuid>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.delete_ids.is_empty()
    }
}

/// Plans the merge. The guest cart is authoritative: its quantities
/// overwrite conflicts, its missing variants are removed from the user
/// cart.
pub fn plan_merge(guest: &[(Uuid, i32)], user: &[(Uuid, Uuid, i32)]) -> MergePlan {
    let mut plan = MergePlan::default();

    for (variant_id, quantity) in guest {
        match user.iter().find(|(_, vid, _)| vid == variant_id) {
            Some((item_id, _, user_qty)) => {
                if user_qty != quantity {
                    plan.updates.push((*item_id, *quantity));
                }
            }
            None => plan.inserts.push((*variant_id, *quantity)),
        }
    }

    for (item_id, variant_id, _) in user {
        if !guest.iter().any(|(vid, _)| vid == variant_id) {
            plan.delete_ids.push(*item_id);
        }
    }

    plan
}

/// Login/logout cart continuity.
#[derive(Clone)]
pub struct CartMergeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartMergeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Reconciles a guest cart into the user's cart on login. The whole
    /// triplet runs in one transaction; a user with no cart yet gets one
    /// created from the guest lines.
    ///
    /// The guest cart is authoritative even when it carries no lines: a
    /// shopper who emptied their anonymous cart logs in to an empty cart,
    /// not a resurrected one. Callers invoke this only when a guest cart
    /// cookie is actually present.
    #[instrument(skip(self, guest))]
    pub async fn merge_on_login(
        &self,
        user_id: Uuid,
        guest: &GuestCart,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let user_cart = match cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(existing) => existing,
            None => {
                let new_cart = cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                new_cart.insert(&txn).await?
            }
        };

        let user_items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(user_cart.id))
            .all(&txn)
            .await?;

        let guest_lines: Vec<(Uuid, i32)> = guest
            .items
            .iter()
            .map(|i| (i.variant_id, i.quantity))
            .collect();
        let user_lines: Vec<(Uuid, Uuid, i32)> = user_items
            .iter()
            .map(|i| (i.id, i.variant_id, i.quantity))
            .collect();
        let plan = plan_merge(&guest_lines, &user_lines);

        for (item_id, quantity) in &plan.updates {
            let item = cart_item::ActiveModel {
                id: Set(*item_id),
                quantity: Set(*quantity),
                updated_at: Set(now),
                ..Default::default()
            };
            cart_item::Entity::update(item).exec(&txn).await?;
        }
        for (variant_id, quantity) in &plan.inserts {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(user_cart.id),
                variant_id: Set(*variant_id),
                quantity: Set(*quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }
        if !plan.delete_ids.is_empty() {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::Id.is_in(plan.delete_ids.clone()))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartMerged { user_id })
            .await;
        info!(
            "Merged guest cart into user {}: {} updated, {} inserted, {} deleted",
            user_id,
            plan.updates.len(),
            plan.inserts.len(),
            plan.delete_ids.len()
        );
        Ok(())
    }

    /// Serializes the user's cart into a guest cart on logout, so the
    /// session keeps its contents anonymously.
    #[instrument(skip(self))]
    pub async fn user_cart_as_guest(&self, user_id: Uuid) -> Result<GuestCart, ServiceError> {
        let mut guest = GuestCart::new();
        let Some(user_cart) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(guest);
        };
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(user_cart.id))
            .all(&*self.db)
            .await?;
        for item in items {
            guest.add_item(item.variant_id, item.quantity);
        }
        Ok(guest)
    }
}

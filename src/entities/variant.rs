use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purchasable SKU of a product. Prices are integer minor units (cents).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: i64,
    pub quantity_in_stock: i32,
    pub sold_amount: i32,
    pub available_for_sale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// A variant is sellable only while flagged for sale with stock on hand.
    pub fn is_sellable(&self) -> bool {
        self.available_for_sale && self.quantity_in_stock > 0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::variant_attribute::Entity")]
    VariantAttributes,
    #[sea_orm(has_many = "super::variant_image::Entity")]
    Images,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::variant_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

// many-to-many with attributes through the join table
impl Related<super::attribute::Entity> for Entity {
    fn to() -> RelationDef {
        super::variant_attribute::Relation::Attribute.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::variant_attribute::Relation::Variant.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

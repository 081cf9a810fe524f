use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed variant attribute (e.g. Size "M", Color "Navy"), many-to-many with variants.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attributes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: AttributeKind,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum AttributeKind {
    #[sea_orm(string_value = "Size")]
    Size,
    #[sea_orm(string_value = "Color")]
    Color,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::variant_attribute::Entity")]
    VariantAttributes,
}

impl Related<super::variant::Entity> for Entity {
    fn to() -> RelationDef {
        super::variant_attribute::Relation::Variant.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::variant_attribute::Relation::Attribute.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

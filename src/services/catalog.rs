use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{
    attribute, category, discount, product, variant, variant_attribute, variant_image,
};
use crate::errors::ServiceError;
use crate::services::pricing;

/// Read-side catalog queries: product listings with filters, product detail
/// by slug, and the small lookups the storefront needs (categories,
/// attributes, live stock).
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

/// Listing filters. All fields are optional and combine conjunctively.
/// Price bounds apply to the discounted price of the cheapest sellable
/// variant, in minor units.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub category: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<ProductSort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
}

/// A variant joined with its attributes and images.
#[derive(Debug, Clone, Serialize)]
pub struct VariantDetail {
    #[serde(flatten)]
    pub variant: variant::Model,
    pub attributes: Vec<attribute::Model>,
    pub images: Vec<variant_image::Model>,
}

/// A product joined with its category, live (non-expired) discount and
/// variants.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub category: Option<category::Model>,
    pub discount: Option<discount::Model>,
    pub variants: Vec<VariantDetail>,
}

impl ProductDetail {
    /// Discounted price of the cheapest sellable variant; used for listing
    /// price filters and ordering. `None` when nothing is sellable.
    fn display_price(&self) -> Option<i64> {
        let percent = self.discount.as_ref().map(|d| d.percent);
        self.variants
            .iter()
            .filter(|v| v.variant.is_sellable())
            .map(|v| match percent {
                Some(p) => pricing::discounted_unit_price(v.variant.price, p),
                None => v.variant.price,
            })
            .min()
    }

    fn has_stock(&self) -> bool {
        self.variants.iter().any(|v| v.variant.is_sellable())
    }

    fn has_attribute(&self, kind: attribute::AttributeKind, value: &str) -> bool {
        self.variants.iter().any(|v| {
            v.attributes
                .iter()
                .any(|a| a.kind == kind && a.value.eq_ignore_ascii_case(value))
        })
    }
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists products matching the filters, joined with category, discount,
    /// variants, attributes and images.
    ///
    /// Price sorts push products with no sellable variant to the end,
    /// whatever their nominal price.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filters: ProductFilters,
    ) -> Result<Vec<ProductDetail>, ServiceError> {
        let mut query = product::Entity::find();

        if let Some(slug) = &filters.category {
            let cat = category::Entity::find()
                .filter(category::Column::Slug.eq(slug.clone()))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", slug)))?;
            query = query.filter(product::Column::CategoryId.eq(cat.id));
        }
        if let Some(term) = &filters.search {
            query = query.filter(product::Column::Name.contains(term.clone()));
        }

        let products = query
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;

        let mut details = self.assemble(products).await?;

        if let Some(color) = &filters.color {
            details.retain(|p| p.has_attribute(attribute::AttributeKind::Color, color));
        }
        if let Some(size) = &filters.size {
            details.retain(|p| p.has_attribute(attribute::AttributeKind::Size, size));
        }
        if filters.min_price.is_some() || filters.max_price.is_some() {
            details.retain(|p| match p.display_price() {
                Some(price) => {
                    filters.min_price.map_or(true, |min| price >= min)
                        && filters.max_price.map_or(true, |max| price <= max)
                }
                None => false,
            });
        }

        match filters.sort {
            Some(ProductSort::PriceAsc) => details.sort_by_key(|p| {
                (!p.has_stock(), p.display_price().unwrap_or(i64::MAX))
            }),
            Some(ProductSort::PriceDesc) => details.sort_by_key(|p| {
                (!p.has_stock(), p.display_price().map(|v| -v).unwrap_or(i64::MAX))
            }),
            Some(ProductSort::NameAsc) => {
                details.sort_by(|a, b| a.product.name.cmp(&b.product.name))
            }
            Some(ProductSort::NameDesc) => {
                details.sort_by(|a, b| b.product.name.cmp(&a.product.name))
            }
            None => {}
        }

        Ok(details)
    }

    /// Full product detail by slug.
    #[instrument(skip(self))]
    pub async fn product_by_slug(&self, slug: &str) -> Result<ProductDetail, ServiceError> {
        let product = product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", slug)))?;

        let mut details = self.assemble(vec![product]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", slug)))
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn attributes_by_kind(
        &self,
        kind: attribute::AttributeKind,
    ) -> Result<Vec<attribute::Model>, ServiceError> {
        Ok(attribute::Entity::find()
            .filter(attribute::Column::Kind.eq(kind))
            .order_by_asc(attribute::Column::Value)
            .all(&*self.db)
            .await?)
    }

    /// Live stock point lookup for a variant.
    pub async fn variant_stock(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        let variant = variant::Entity::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
        Ok(variant.quantity_in_stock)
    }

    /// Joins products with their categories, non-expired discounts, variants,
    /// attributes and images using batched lookups.
    async fn assemble(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductDetail>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();

        let category_ids: Vec<Uuid> = products.iter().map(|p| p.category_id).collect();
        let categories: HashMap<Uuid, category::Model> = category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let discount_ids: Vec<Uuid> = products.iter().filter_map(|p| p.discount_id).collect();
        let discounts: HashMap<Uuid, discount::Model> = if discount_ids.is_empty() {
            HashMap::new()
        } else {
            discount::Entity::find()
                .filter(discount::Column::Id.is_in(discount_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|d| (d.id, d))
                .collect()
        };

        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let variants = variant::Entity::find()
            .filter(variant::Column::ProductId.is_in(product_ids))
            .all(&*self.db)
            .await?;
        let variant_details = load_variant_details(&*self.db, variants).await?;

        let mut by_product: HashMap<Uuid, Vec<VariantDetail>> = HashMap::new();
        for vd in variant_details {
            by_product.entry(vd.variant.product_id).or_default().push(vd);
        }

        Ok(products
            .into_iter()
            .map(|p| {
                let discount = p
                    .discount_id
                    .and_then(|id| discounts.get(&id).cloned())
                    .filter(|d| d.is_active_at(now));
                ProductDetail {
                    category: categories.get(&p.category_id).cloned(),
                    discount,
                    variants: by_product.remove(&p.id).unwrap_or_default(),
                    product: p,
                }
            })
            .collect())
    }
}

/// Batch-loads attributes and images for a set of variants.
pub(crate) async fn load_variant_details<C: ConnectionTrait>(
    db: &C,
    variants: Vec<variant::Model>,
) -> Result<Vec<VariantDetail>, ServiceError> {
    if variants.is_empty() {
        return Ok(Vec::new());
    }
    let variant_ids: Vec<Uuid> = variants.iter().map(|v| v.id).collect();

    let links = variant_attribute::Entity::find()
        .filter(variant_attribute::Column::VariantId.is_in(variant_ids.clone()))
        .all(db)
        .await?;
    let attribute_ids: Vec<Uuid> = links.iter().map(|l| l.attribute_id).collect();
    let attributes: HashMap<Uuid, attribute::Model> = if attribute_ids.is_empty() {
        HashMap::new()
    } else {
        attribute::Entity::find()
            .filter(attribute::Column::Id.is_in(attribute_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect()
    };
    let mut attrs_by_variant: HashMap<Uuid, Vec<attribute::Model>> = HashMap::new();
    for link in links {
        if let Some(attr) = attributes.get(&link.attribute_id) {
            attrs_by_variant
                .entry(link.variant_id)
                .or_default()
                .push(attr.clone());
        }
    }

    let images = variant_image::Entity::find()
        .filter(variant_image::Column::VariantId.is_in(variant_ids))
        .all(db)
        .await?;
    let mut images_by_variant: HashMap<Uuid, Vec<variant_image::Model>> = HashMap::new();
    for image in images {
        images_by_variant
            .entry(image.variant_id)
            .or_default()
            .push(image);
    }

    Ok(variants
        .into_iter()
        .map(|v| VariantDetail {
            attributes: attrs_by_variant.remove(&v.id).unwrap_or_default(),
            images: images_by_variant.remove(&v.id).unwrap_or_default(),
            variant: v,
        })
        .collect())
}

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::attribute::AttributeKind;
use crate::errors::ApiError;
use crate::handlers::common::{map_service_error, success_response};
use crate::services::catalog::ProductFilters;
use crate::AppState;

pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:slug", get(get_product))
        .route("/categories", get(list_categories))
        .route("/attributes", get(list_attributes))
        .route("/variants/:id/stock", get(variant_stock))
}

/// List products with optional filters and sorting
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ProductFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_products(filters)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

/// Product detail by slug
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .product_by_slug(&slug)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .services
        .catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(categories))
}

#[derive(Debug, Deserialize)]
struct AttributesQuery {
    kind: AttributeKind,
}

async fn list_attributes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttributesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let attributes = state
        .services
        .catalog
        .attributes_by_kind(query.kind)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(attributes))
}

#[derive(Debug, Serialize)]
struct StockResponse {
    variant_id: Uuid,
    quantity_in_stock: i32,
}

async fn variant_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let quantity_in_stock = state
        .services
        .catalog
        .variant_stock(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(StockResponse {
        variant_id: id,
        quantity_in_stock,
    }))
}

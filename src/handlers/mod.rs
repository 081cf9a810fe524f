pub mod auth;
pub mod carts;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Full API router.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::health_routes())
        .merge(auth::auth_routes())
        .merge(products::products_routes())
        .merge(carts::carts_routes())
        .merge(orders::orders_routes())
        .merge(payments::payments_routes())
}

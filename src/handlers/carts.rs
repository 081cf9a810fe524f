use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::RequestIdentity;
use crate::errors::ApiError;
use crate::handlers::common::{
    map_service_error, read_guest_cart, success_response, validate_input, with_guest_cart_cookie,
};
use crate::services::cart::{lines_subtotal, CartLineDetail, CartRepository};
use crate::AppState;

pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart/items", get(list_items))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:id", put(update_item))
        .route("/cart/items/:id", delete(remove_item))
        .route("/cart/summary", get(cart_summary))
        .route("/cart/count", get(count_by_product))
}

/// Picks the cart backing for this request: the user's DB cart, or the
/// cookie cart (possibly brand new) for guests.
fn repository_for(
    state: &Arc<AppState>,
    identity: &RequestIdentity,
    headers: &HeaderMap,
) -> Box<dyn CartRepository> {
    match identity {
        RequestIdentity::User(user) => Box::new(state.services.cart.for_user(user.user_id)),
        RequestIdentity::Guest => {
            let guest = read_guest_cart(headers, &state.services.cookie_codec).unwrap_or_default();
            Box::new(state.services.cart.for_guest(guest))
        }
    }
}

/// For guest carts, persists the mutated snapshot back into the cookie.
fn respond_with_cart(
    state: &Arc<AppState>,
    repo: &dyn CartRepository,
    response: Response,
) -> Result<Response, ApiError> {
    match repo.guest_snapshot() {
        Some(cart) => {
            with_guest_cart_cookie(response, &state.services.cookie_codec, cart, &state.config)
        }
        None => Ok(response),
    }
}

#[derive(Debug, Serialize)]
struct CartView {
    items: Vec<CartLineDetail>,
    subtotal: i64,
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let repo = repository_for(&state, &identity, &headers);
    let items = repo.items().await.map_err(map_service_error)?;
    let subtotal = lines_subtotal(&items);
    Ok(success_response(CartView { items, subtotal }))
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    variant_id: Uuid,
    #[validate(range(min = 1))]
    quantity: i32,
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let mut repo = repository_for(&state, &identity, &headers);
    repo.add_item(payload.variant_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    let items = repo.items().await.map_err(map_service_error)?;
    let subtotal = lines_subtotal(&items);
    respond_with_cart(
        &state,
        repo.as_ref(),
        success_response(CartView { items, subtotal }),
    )
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    quantity: i32,
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let mut repo = repository_for(&state, &identity, &headers);
    repo.update_quantity(item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    let items = repo.items().await.map_err(map_service_error)?;
    let subtotal = lines_subtotal(&items);
    respond_with_cart(
        &state,
        repo.as_ref(),
        success_response(CartView { items, subtotal }),
    )
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let mut repo = repository_for(&state, &identity, &headers);
    repo.remove_item(item_id).await.map_err(map_service_error)?;
    let items = repo.items().await.map_err(map_service_error)?;
    let subtotal = lines_subtotal(&items);
    respond_with_cart(
        &state,
        repo.as_ref(),
        success_response(CartView { items, subtotal }),
    )
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: i64,
}

async fn cart_summary(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let repo = repository_for(&state, &identity, &headers);
    let count = repo.sum_quantities().await.map_err(map_service_error)?;
    Ok(success_response(CountResponse { count }))
}

#[derive(Debug, Deserialize)]
struct CountQuery {
    product_id: Uuid,
}

async fn count_by_product(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    Query(query): Query<CountQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = repository_for(&state, &identity, &headers);
    let count = repo
        .count_items_by_product(query.product_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(CountResponse { count }))
}

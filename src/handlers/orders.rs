use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::PaymentMethod;
use crate::errors::ApiError;
use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input,
    with_cleared_cart_cookie,
};
use crate::services::orders::{PlaceOrderInput, ShippingAddressInput};
use crate::AppState;

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/shipping-address", put(update_shipping_address))
        .route("/orders/:id/payment-method", put(update_payment_method))
}

#[derive(Debug, Deserialize, Validate)]
struct AddressRequest {
    #[validate(length(min = 2, max = 2))]
    country: String,
    #[validate(length(min = 1))]
    state: String,
    #[validate(length(min = 1))]
    city: String,
    #[validate(length(min = 1))]
    postal_code: String,
    #[validate(length(min = 1))]
    street_address: String,
    #[serde(default)]
    complement: String,
}

impl From<AddressRequest> for ShippingAddressInput {
    fn from(req: AddressRequest) -> Self {
        Self {
            country: req.country,
            state: req.state,
            city: req.city,
            postal_code: req.postal_code,
            street_address: req.street_address,
            complement: req.complement,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct PlaceOrderRequest {
    #[validate]
    shipping_address: AddressRequest,
    payment_method: PaymentMethod,
}

/// Place an order from the caller's cart; clears any lingering guest
/// cookie alongside.
async fn place_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .orders
        .place_order(
            user.user_id,
            PlaceOrderInput {
                shipping_address: payload.shipping_address.into(),
                payment_method: payload.payment_method,
            },
        )
        .await
        .map_err(map_service_error)?;
    with_cleared_cart_cookie(created_response(order), &state.config)
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .list_orders(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

async fn update_shipping_address(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .orders
        .update_shipping_address(user.user_id, id, payload.into())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct UpdatePaymentMethodRequest {
    payment_method: PaymentMethod,
}

async fn update_payment_method(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .orders
        .update_payment_method(user.user_id, id, payload.payment_method)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({ "updated": true })))
}

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::handlers::common::{map_service_error, success_response};
use crate::services::payments::stripe::SuccessOutcome;
use crate::AppState;

pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/stripe/session", post(create_stripe_session))
        .route("/payments/stripe/success", get(stripe_success))
        .route("/payments/stripe/cancel", get(stripe_cancel))
        .route("/payments/paypal/orders", post(create_paypal_order))
        .route(
            "/payments/paypal/orders/:provider_id/capture",
            post(capture_paypal_order),
        )
        .route(
            "/payments/paypal/orders/:provider_id/cancel",
            post(cancel_paypal_order),
        )
}

#[derive(Debug, Deserialize)]
struct OrderRef {
    order_id: Uuid,
}

#[derive(Debug, Serialize)]
struct CheckoutUrlResponse {
    url: String,
}

/// Create a checkout session for an order and return the provider-hosted
/// redirect URL.
async fn create_stripe_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<OrderRef>,
) -> Result<impl IntoResponse, ApiError> {
    let url = state
        .services
        .stripe
        .create_session(user.user_id, payload.order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(CheckoutUrlResponse { url }))
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Success redirect: verify the session server-side, capture, and send
/// the shopper to the order page. Unverifiable sessions bounce to the
/// cancel route instead.
async fn stripe_success(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<SessionQuery>,
) -> Result<Redirect, ApiError> {
    let outcome = state
        .services
        .stripe
        .handle_success(user.user_id, &query.session_id)
        .await
        .map_err(map_service_error)?;
    Ok(match outcome {
        SuccessOutcome::Paid(order_id) => {
            Redirect::to(&format!("{}/orders/{}", state.config.base_url, order_id))
        }
        SuccessOutcome::RedirectToCancel => Redirect::to(&format!(
            "{}/payments/stripe/cancel?session_id={}",
            state.config.base_url, query.session_id
        )),
    })
}

/// Cancel redirect: reset the payment (when eligible) and send the
/// shopper back to the storefront.
async fn stripe_cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<SessionQuery>,
) -> Result<Redirect, ApiError> {
    state
        .services
        .stripe
        .handle_cancel(user.user_id, &query.session_id)
        .await
        .map_err(map_service_error)?;
    Ok(Redirect::to(&state.config.base_url))
}

async fn create_paypal_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<OrderRef>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_order = state
        .services
        .paypal
        .create_order(user.user_id, payload.order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({
        "id": provider_order.id,
        "status": provider_order.status,
    })))
}

async fn capture_paypal_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(provider_id): Path<String>,
    Json(payload): Json<OrderRef>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .paypal
        .fulfill_order(user.user_id, payload.order_id, &provider_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({ "captured": true })))
}

async fn cancel_paypal_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(provider_id): Path<String>,
    Json(payload): Json<OrderRef>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .paypal
        .cancel_order(user.user_id, payload.order_id, &provider_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(serde_json::json!({ "canceled": true })))
}

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::handlers::common::{
    created_response, map_service_error, read_guest_cart, success_response, validate_input,
    with_cleared_cart_cookie, with_guest_cart_cookie,
};
use crate::AppState;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user_id: Uuid,
    email: String,
    name: String,
    token: String,
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8))]
    password: String,
    #[validate(length(min = 1))]
    name: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state
        .services
        .users
        .register(&payload.email, &payload.password, &payload.name)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(SessionResponse {
        user_id: session.user_id,
        email: session.email,
        name: session.name,
        token: session.token,
    }))
}

#[derive(Debug, Deserialize, Validate)]
struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

/// Login: verifies credentials, merges any guest cart into the user's
/// cart (guest quantities win), and clears the guest cookie.
async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let session = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await
        .map_err(map_service_error)?;

    if let Some(guest) = read_guest_cart(&headers, &state.services.cookie_codec) {
        state
            .services
            .cart_merge
            .merge_on_login(session.user_id, &guest)
            .await
            .map_err(map_service_error)?;
    }

    let response = success_response(SessionResponse {
        user_id: session.user_id,
        email: session.email,
        name: session.name,
        token: session.token,
    });
    with_cleared_cart_cookie(response, &state.config)
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    logged_out: bool,
}

/// Logout: serializes the user's cart into the guest cookie so the
/// session keeps its contents anonymously. Token invalidation is the
/// client's job (short-lived JWTs).
async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let guest = state
        .services
        .cart_merge
        .user_cart_as_guest(user.user_id)
        .await
        .map_err(map_service_error)?;

    let response = success_response(LogoutResponse { logged_out: true });
    if guest.is_empty() {
        with_cleared_cart_cookie(response, &state.config)
    } else {
        with_guest_cart_cookie(response, &state.services.cookie_codec, &guest, &state.config)
    }
}

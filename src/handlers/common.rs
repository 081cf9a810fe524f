use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::{ApiError, ServiceError};
use crate::services::cart::{
    cookie::{clear_cookie_header, set_cookie_header},
    CartCookieCodec, GuestCart, CART_COOKIE_NAME,
};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Reads the guest cart out of the request's `Cookie` header. A missing,
/// malformed or tampered cookie yields `None`.
pub fn read_guest_cart(headers: &HeaderMap, codec: &CartCookieCodec) -> Option<GuestCart> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    let value = raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == CART_COOKIE_NAME).then_some(value)
    })?;
    codec.decode_lenient(value)
}

/// Attaches a `Set-Cookie` header persisting the guest cart to a response.
pub fn with_guest_cart_cookie(
    response: Response,
    codec: &CartCookieCodec,
    cart: &GuestCart,
    config: &AppConfig,
) -> Result<Response, ApiError> {
    let encoded = codec.encode(cart).map_err(map_service_error)?;
    let header_value = set_cookie_header(
        &encoded,
        config.cart_cookie_max_age_secs,
        config.cookie_secure,
    );
    append_set_cookie(response, &header_value)
}

/// Attaches a `Set-Cookie` header that removes the guest cart.
pub fn with_cleared_cart_cookie(
    response: Response,
    config: &AppConfig,
) -> Result<Response, ApiError> {
    append_set_cookie(response, &clear_cookie_header(config.cookie_secure))
}

fn append_set_cookie(mut response: Response, value: &str) -> Result<Response, ApiError> {
    let header_value = value
        .parse()
        .map_err(|_| ApiError::InternalServerError)?;
    response
        .headers_mut()
        .append(header::SET_COOKIE, header_value);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn codec() -> CartCookieCodec {
        CartCookieCodec::new(b"cookie-secret-cookie-secret-1234")
    }

    #[test]
    fn reads_cart_from_cookie_header() {
        let mut cart = GuestCart::new();
        cart.add_item(Uuid::new_v4(), 2);
        let encoded = codec().encode(&cart).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("session=abc; {}={}", CART_COOKIE_NAME, encoded)
                .parse()
                .unwrap(),
        );
        assert_eq!(read_guest_cart(&headers, &codec()), Some(cart));
    }

    #[test]
    fn missing_or_garbage_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert!(read_guest_cart(&headers, &codec()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("{}=garbage", CART_COOKIE_NAME).parse().unwrap(),
        );
        assert!(read_guest_cart(&headers, &codec()).is_none());
    }
}

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Cookie that carries the anonymous cart.
pub const CART_COOKIE_NAME: &str = "cart";

/// Anonymous cart as serialized into the cookie. Field names match the
/// wire format carts were historically stored in, so existing cookies
/// keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCart {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<GuestCartItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCartItem {
    pub id: Uuid,
    #[serde(rename = "variantId")]
    pub variant_id: Uuid,
    pub quantity: i32,
    #[serde(rename = "cartId")]
    pub cart_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuestCart {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: String::new(),
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    /// Upsert: an existing line for the variant gains `quantity`, otherwise
    /// a new line is appended. Returns the line's item id.
    pub fn add_item(&mut self, variant_id: Uuid, quantity: i32) -> Uuid {
        let now = Utc::now();
        self.updated_at = now;
        if let Some(item) = self.items.iter_mut().find(|i| i.variant_id == variant_id) {
            item.quantity += quantity;
            item.updated_at = now;
            return item.id;
        }
        let item = GuestCartItem {
            id: Uuid::new_v4(),
            variant_id,
            quantity,
            cart_id: self.id,
            created_at: now,
            updated_at: now,
        };
        let id = item.id;
        self.items.push(item);
        id
    }

    pub fn item_mut(&mut self, item_id: Uuid) -> Option<&mut GuestCartItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Removes a line; false when no such line exists.
    pub fn remove_item(&mut self, item_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        self.updated_at = Utc::now();
        self.items.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for GuestCart {
    fn default() -> Self {
        Self::new()
    }
}

/// Signs and verifies the guest-cart cookie value.
///
/// The value is `base64url(json) + "." + hex(hmac-sha256(json))`; anything
/// that fails verification is treated as no cart at all rather than an
/// error surfaced to the shopper.
#[derive(Clone)]
pub struct CartCookieCodec {
    secret: Vec<u8>,
}

impl CartCookieCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn encode(&self, cart: &GuestCart) -> Result<String, ServiceError> {
        let json = serde_json::to_vec(cart)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode cart: {}", e)))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::InternalError(format!("Bad cookie secret: {}", e)))?;
        mac.update(&json);
        let tag = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(json), tag))
    }

    pub fn decode(&self, value: &str) -> Result<GuestCart, ServiceError> {
        let (payload, tag) = value
            .split_once('.')
            .ok_or_else(|| ServiceError::BadRequest("Malformed cart cookie".to_string()))?;
        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| ServiceError::BadRequest("Malformed cart cookie".to_string()))?;
        let expected = hex::decode(tag)
            .map_err(|_| ServiceError::BadRequest("Malformed cart cookie".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::InternalError(format!("Bad cookie secret: {}", e)))?;
        mac.update(&json);
        mac.verify_slice(&expected)
            .map_err(|_| ServiceError::BadRequest("Cart cookie signature mismatch".to_string()))?;

        serde_json::from_slice(&json)
            .map_err(|_| ServiceError::BadRequest("Malformed cart cookie".to_string()))
    }

    /// Decodes the cookie, falling back to `None` on any verification or
    /// parse failure so a stale cookie never breaks browsing.
    pub fn decode_lenient(&self, value: &str) -> Option<GuestCart> {
        self.decode(value).ok()
    }
}

/// `Set-Cookie` value storing the signed cart.
pub fn set_cookie_header(encoded: &str, max_age_secs: u64, secure: bool) -> String {
    let mut header = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        CART_COOKIE_NAME, encoded, max_age_secs
    );
    if secure {
        header.push_str("; Secure");
    }
    header
}

/// `Set-Cookie` value that expires the cart cookie immediately.
pub fn clear_cookie_header(secure: bool) -> String {
    let mut header = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", CART_COOKIE_NAME);
    if secure {
        header.push_str("; Secure");
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CartCookieCodec {
        CartCookieCodec::new(b"cookie-secret-cookie-secret-1234")
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut cart = GuestCart::new();
        cart.add_item(Uuid::new_v4(), 2);

        let encoded = codec().encode(&cart).unwrap();
        let decoded = codec().decode(&encoded).unwrap();
        assert_eq!(decoded, cart);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut cart = GuestCart::new();
        let variant = Uuid::new_v4();
        cart.add_item(variant, 1);
        let encoded = codec().encode(&cart).unwrap();

        // Swap the payload for a different cart, keeping the original tag
        let mut forged = GuestCart::new();
        forged.add_item(variant, 99);
        let forged_encoded = codec().encode(&forged).unwrap();
        let (forged_payload, _) = forged_encoded.split_once('.').unwrap();
        let (_, real_tag) = encoded.split_once('.').unwrap();
        let spliced = format!("{}.{}", forged_payload, real_tag);

        assert!(codec().decode(&spliced).is_err());
        assert!(codec().decode_lenient(&spliced).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let cart = GuestCart::new();
        let encoded = codec().encode(&cart).unwrap();
        let other = CartCookieCodec::new(b"another-secret-another-secret-12");
        assert!(other.decode(&encoded).is_err());
    }

    #[test]
    fn add_item_accumulates_quantity() {
        let mut cart = GuestCart::new();
        let variant = Uuid::new_v4();
        let first = cart.add_item(variant, 1);
        let second = cart.add_item(variant, 2);
        assert_eq!(first, second);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
    }

    #[test]
    fn serialized_field_names_match_wire_format() {
        let mut cart = GuestCart::new();
        cart.add_item(Uuid::new_v4(), 1);
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json["items"][0].get("variantId").is_some());
        assert!(json["items"][0].get("cartId").is_some());
    }
}

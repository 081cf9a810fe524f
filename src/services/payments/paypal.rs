use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::PaymentMethod;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::payments::{
    complete_payment, ensure_uninitialized, reset_payment, store_external_session,
    STATUS_COMPLETED,
};
use crate::services::pricing::minor_units_to_decimal_string;

/// A provider-side order as returned by create/capture.
#[derive(Debug, Clone, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
}

/// Approve-in-UI payment provider: the client SDK drives approval, the
/// server drives create and capture.
#[async_trait]
pub trait PaypalGateway: Send + Sync {
    async fn create_order(&self, amount: &str, currency: &str)
        -> Result<PaypalOrder, ServiceError>;

    async fn capture_order(&self, provider_order_id: &str) -> Result<PaypalOrder, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// REST-backed gateway. Each call fetches a client-credentials token; the
/// sandbox/live base URL comes from configuration.
pub struct HttpPaypalGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
}

impl HttpPaypalGateway {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
            secret: secret.into(),
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal auth failed: {}", e))
            })?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "PayPal auth returned {}",
                response.status()
            )));
        }
        Ok(response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Bad PayPal response: {}", e)))?
            .access_token)
    }

    async fn parse_order(response: reqwest::Response) -> Result<PaypalOrder, ServiceError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "PayPal returned {}: {}",
                status, body
            )));
        }
        response
            .json::<PaypalOrder>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Bad PayPal response: {}", e)))
    }
}

#[async_trait]
impl PaypalGateway for HttpPaypalGateway {
    async fn create_order(
        &self,
        amount: &str,
        currency: &str,
    ) -> Result<PaypalOrder, ServiceError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": { "currency_code": currency, "value": amount }
            }]
        });
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal request failed: {}", e))
            })?;
        Self::parse_order(response).await
    }

    async fn capture_order(&self, provider_order_id: &str) -> Result<PaypalOrder, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, provider_order_id
            ))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal request failed: {}", e))
            })?;
        Self::parse_order(response).await
    }
}

/// Create/approve/capture payment workflow.
#[derive(Clone)]
pub struct PaypalService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaypalGateway>,
}

impl PaypalService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaypalGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
        }
    }

    /// Creates a provider order for an eligible local order and stores its
    /// id, moving the workflow to CREATED. The client SDK takes over from
    /// the returned provider order.
    #[instrument(skip(self))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaypalOrder, ServiceError> {
        let order =
            ensure_uninitialized(&*self.db, user_id, order_id, PaymentMethod::Paypal).await?;

        let amount = minor_units_to_decimal_string(order.total_price);
        let provider_order = self
            .gateway
            .create_order(&amount, &order.currency_code)
            .await?;

        store_external_session(
            &self.db,
            user_id,
            order_id,
            PaymentMethod::Paypal,
            &provider_order.id,
            &provider_order.status,
        )
        .await?;

        self.event_sender
            .send_or_log(Event::PaymentSessionCreated {
                order_id,
                external_id: provider_order.id.clone(),
            })
            .await;
        info!(
            "Created provider order {} for order {}",
            provider_order.id, order_id
        );
        Ok(provider_order)
    }

    /// Client-driven cancel: resets the CREATED payment so checkout can be
    /// retried. NOT_FOUND when the order is missing, foreign, already
    /// captured, or holds a different provider id.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        provider_order_id: &str,
    ) -> Result<(), ServiceError> {
        reset_payment(
            &self.db,
            &self.event_sender,
            user_id,
            order_id,
            PaymentMethod::Paypal,
            provider_order_id,
        )
        .await
    }

    /// Captures an approved provider order. A capture failure resets the
    /// payment to UNINITIALIZED before surfacing the provider error, so the
    /// order is immediately payable again.
    #[instrument(skip(self))]
    pub async fn fulfill_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        provider_order_id: &str,
    ) -> Result<(), ServiceError> {
        // Fail fast before touching the provider when the order is not in
        // CREATED for this provider id
        ensure_capturable(self, user_id, order_id, provider_order_id).await?;

        let captured = self.gateway.capture_order(provider_order_id).await;
        let capture_failed = match &captured {
            Err(_) => true,
            Ok(order) => order.status != STATUS_COMPLETED,
        };
        if capture_failed {
            if let Err(reset_err) = reset_payment(
                &self.db,
                &self.event_sender,
                user_id,
                order_id,
                PaymentMethod::Paypal,
                provider_order_id,
            )
            .await
            {
                warn!(
                    "Could not reset payment for order {} after failed capture: {}",
                    order_id, reset_err
                );
            }
            return Err(match captured {
                Err(e) => e,
                Ok(order) => ServiceError::ExternalServiceError(format!(
                    "Capture ended in status {}",
                    order.status
                )),
            });
        }

        complete_payment(
            &self.db,
            &self.event_sender,
            user_id,
            order_id,
            PaymentMethod::Paypal,
            provider_order_id,
        )
        .await
    }
}

async fn ensure_capturable(
    service: &PaypalService,
    user_id: Uuid,
    order_id: Uuid,
    provider_order_id: &str,
) -> Result<(), ServiceError> {
    use crate::entities::payment_detail;
    use crate::services::payments::PaymentState;
    use sea_orm::EntityTrait;

    let not_found = || ServiceError::NotFound(format!("Order {} not found", order_id));
    let order = crate::entities::order::Entity::find_by_id(order_id)
        .one(&*service.db)
        .await?
        .ok_or_else(not_found)?;
    if order.user_id != user_id || order.paid_at.is_some() {
        return Err(not_found());
    }
    let detail = payment_detail::Entity::find_by_id(order_id)
        .one(&*service.db)
        .await?
        .ok_or_else(not_found)?;
    if detail.payment_method != PaymentMethod::Paypal
        || detail.payment_method_id.as_deref() != Some(provider_order_id)
        || PaymentState::of(&detail) != PaymentState::Created
    {
        return Err(not_found());
    }
    Ok(())
}

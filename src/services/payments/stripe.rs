use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{user, PaymentMethod};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::payments::{
    complete_payment, ensure_uninitialized, reset_payment, store_external_session,
};

/// A checkout session as the provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    pub order_id: Uuid,
    pub description: String,
}

/// Session-style payment provider. Production talks to the Stripe REST
/// API; tests substitute a mock.
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError>;
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// REST-backed gateway using form-encoded requests and secret-key bearer
/// auth.
pub struct HttpStripeGateway {
    client: reqwest::Client,
    secret_key: String,
}

impl HttpStripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl StripeGateway for HttpStripeGateway {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<CheckoutSession, ServiceError> {
        let currency = params.currency.to_lowercase();
        let amount = params.amount.to_string();
        let order_id = params.order_id.to_string();
        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &params.success_url),
            ("cancel_url", &params.cancel_url),
            ("customer_email", &params.customer_email),
            ("metadata[orderId]", &order_id),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &currency),
            ("line_items[0][price_data][unit_amount]", &amount),
            (
                "line_items[0][price_data][product_data][name]",
                &params.description,
            ),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "Stripe returned {}: {}",
                status, body
            )));
        }
        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Bad Stripe response: {}", e)))
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/checkout/sessions/{}",
                STRIPE_API_BASE, session_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "Stripe returned {}: {}",
                status, body
            )));
        }
        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Bad Stripe response: {}", e)))
    }
}

/// Outcome of the success-redirect callback, turned into a redirect by the
/// handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessOutcome {
    /// Payment verified and captured; show the order confirmation.
    Paid(Uuid),
    /// Session could not be verified as paid; send the shopper to the
    /// cancel route instead.
    RedirectToCancel,
}

/// Session/redirect-style payment workflow.
#[derive(Clone)]
pub struct StripeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    gateway: Arc<dyn StripeGateway>,
}

impl StripeService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn StripeGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            gateway,
        }
    }

    /// Creates a checkout session for an eligible order (owned, unpaid,
    /// UNINITIALIZED) and stores the session id, moving the workflow to
    /// CREATED. Returns the provider-hosted redirect URL.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<String, ServiceError> {
        let order =
            ensure_uninitialized(&*self.db, user_id, order_id, PaymentMethod::Stripe).await?;

        let shopper = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // The provider substitutes the session id into the redirect URLs
        let success_url = format!(
            "{}/payments/stripe/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.config.base_url
        );
        let cancel_url = format!(
            "{}/payments/stripe/cancel?session_id={{CHECKOUT_SESSION_ID}}",
            self.config.base_url
        );

        let session = self
            .gateway
            .create_session(CreateSessionParams {
                amount: order.total_price,
                currency: order.currency_code.clone(),
                success_url,
                cancel_url,
                customer_email: shopper.email,
                order_id,
                description: format!("Order {}", order_id),
            })
            .await?;

        let status = session.status.clone().unwrap_or_else(|| "open".to_string());
        store_external_session(
            &self.db,
            user_id,
            order_id,
            PaymentMethod::Stripe,
            &session.id,
            &status,
        )
        .await?;

        self.event_sender
            .send_or_log(Event::PaymentSessionCreated {
                order_id,
                external_id: session.id.clone(),
            })
            .await;
        info!("Created checkout session {} for order {}", session.id, order_id);

        session.url.ok_or_else(|| {
            ServiceError::ExternalServiceError("Checkout session has no redirect URL".to_string())
        })
    }

    /// Success-redirect callback. The session is re-fetched server-side
    /// rather than trusting the redirect; only a session the provider
    /// reports as paid triggers the capture transaction.
    ///
    /// A failed re-fetch routes the shopper to the cancel flow without
    /// resetting payment state here; if the cancel route's own lookup then
    /// fails too, the order stays CREATED until an explicit cancel.
    #[instrument(skip(self))]
    pub async fn handle_success(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<SuccessOutcome, ServiceError> {
        let session = match self.gateway.retrieve_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not verify session {}: {}", session_id, e);
                return Ok(SuccessOutcome::RedirectToCancel);
            }
        };

        let Some(order_id) = session
            .metadata
            .get("orderId")
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            warn!("Session {} carries no order reference", session_id);
            return Ok(SuccessOutcome::RedirectToCancel);
        };

        if session.payment_status.as_deref() != Some("paid") {
            return Ok(SuccessOutcome::RedirectToCancel);
        }

        complete_payment(
            &self.db,
            &self.event_sender,
            user_id,
            order_id,
            PaymentMethod::Stripe,
            &session.id,
        )
        .await?;

        Ok(SuccessOutcome::Paid(order_id))
    }

    /// Cancel-redirect callback: resets the matching CREATED payment so
    /// checkout can be retried. An unknown or already-captured session is
    /// left untouched and the redirect proceeds normally.
    #[instrument(skip(self))]
    pub async fn handle_cancel(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let session = match self.gateway.retrieve_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not verify session {}: {}", session_id, e);
                return Ok(());
            }
        };
        let Some(order_id) = session
            .metadata
            .get("orderId")
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            return Ok(());
        };

        match reset_payment(
            &self.db,
            &self.event_sender,
            user_id,
            order_id,
            PaymentMethod::Stripe,
            &session.id,
        )
        .await
        {
            Ok(()) => Ok(()),
            // Already paid, already reset, or not this user's order: the
            // redirect itself still succeeds
            Err(ServiceError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

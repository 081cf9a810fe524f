use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::config::AppConfig;
use storefront_api::db;
use storefront_api::entities::{
    attribute, category, discount, product, user, variant, variant_attribute,
};
use storefront_api::errors::ServiceError;
use storefront_api::events::{process_events, EventSender};
use storefront_api::services::cart::CartRepository;
use storefront_api::services::payments::paypal::{PaypalGateway, PaypalOrder};
use storefront_api::services::payments::stripe::{
    CheckoutSession, CreateSessionParams, StripeGateway,
};
use storefront_api::AppState;

/// Application state backed by an in-memory SQLite database, with mock
/// payment gateways the tests can script.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub stripe: Arc<MockStripeGateway>,
    pub paypal: Arc<MockPaypalGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_jwt_secret_that_is_at_least_32_chars".to_string(),
            "test_cookie_secret_that_is_32_chars_long".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // A pooled in-memory SQLite gives every connection its own database;
        // keep the pool at a single connection.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::create_schema(&pool)
            .await
            .expect("failed to create schema");

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(process_events(rx));

        let stripe = Arc::new(MockStripeGateway::default());
        let paypal = Arc::new(MockPaypalGateway::default());

        let state = Arc::new(AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            Arc::new(EventSender::new(tx)),
            stripe.clone(),
            paypal.clone(),
        ));

        Self {
            state,
            stripe,
            paypal,
        }
    }

    pub async fn seed_user(&self, email: &str) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let account = user::ActiveModel {
            id: Set(id),
            email: Set(email.to_string()),
            password_hash: Set("unused-in-tests".to_string()),
            name: Set("Test Shopper".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        account
            .insert(&*self.state.db)
            .await
            .expect("failed to seed user");
        id
    }

    /// Seeds a category + product + single variant. Returns (product id,
    /// variant id).
    pub async fn seed_variant(
        &self,
        price: i64,
        stock: i32,
        available: bool,
        discount: Option<(i32, Duration)>,
    ) -> (Uuid, Uuid) {
        let now = Utc::now();

        let discount_id = match discount {
            Some((percent, valid_for)) => {
                let id = Uuid::new_v4();
                let row = discount::ActiveModel {
                    id: Set(id),
                    percent: Set(percent),
                    valid_until: Set(now + valid_for),
                };
                row.insert(&*self.state.db)
                    .await
                    .expect("failed to seed discount");
                Some(id)
            }
            None => None,
        };

        let category_id = Uuid::new_v4();
        let cat = category::ActiveModel {
            id: Set(category_id),
            name: Set("Apparel".to_string()),
            slug: Set(format!("apparel-{}", category_id)),
        };
        cat.insert(&*self.state.db)
            .await
            .expect("failed to seed category");

        let product_id = Uuid::new_v4();
        let prod = product::ActiveModel {
            id: Set(product_id),
            slug: Set(format!("tee-{}", product_id)),
            name: Set("Test Tee".to_string()),
            description: Set("A tee for tests".to_string()),
            category_id: Set(category_id),
            discount_id: Set(discount_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        prod.insert(&*self.state.db)
            .await
            .expect("failed to seed product");

        let variant_id = Uuid::new_v4();
        let var = variant::ActiveModel {
            id: Set(variant_id),
            product_id: Set(product_id),
            price: Set(price),
            quantity_in_stock: Set(stock),
            sold_amount: Set(0),
            available_for_sale: Set(available),
            created_at: Set(now),
            updated_at: Set(now),
        };
        var.insert(&*self.state.db)
            .await
            .expect("failed to seed variant");

        (product_id, variant_id)
    }

    /// Seeds an attribute and links it to a variant. Returns the attribute
    /// id.
    pub async fn seed_attribute(
        &self,
        variant_id: Uuid,
        kind: attribute::AttributeKind,
        name: &str,
        value: &str,
    ) -> Uuid {
        let attribute_id = Uuid::new_v4();
        let attr = attribute::ActiveModel {
            id: Set(attribute_id),
            kind: Set(kind),
            name: Set(name.to_string()),
            value: Set(value.to_string()),
        };
        attr.insert(&*self.state.db)
            .await
            .expect("failed to seed attribute");

        let link = variant_attribute::ActiveModel {
            variant_id: Set(variant_id),
            attribute_id: Set(attribute_id),
        };
        link.insert(&*self.state.db)
            .await
            .expect("failed to link attribute");
        attribute_id
    }

    /// Puts a line into a user's DB cart through the repository.
    pub async fn add_to_cart(&self, user_id: Uuid, variant_id: Uuid, quantity: i32) {
        let mut repo = self.state.services.cart.for_user(user_id);
        repo.add_item(variant_id, quantity)
            .await
            .expect("failed to add to cart");
    }
}

#[derive(Default)]
pub struct MockStripeGateway {
    counter: AtomicUsize,
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    pub fail_retrieve: AtomicBool,
}

impl MockStripeGateway {
    /// Flips a session into the state Stripe reports after the shopper
    /// pays.
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = Some("complete".to_string());
            session.payment_status = Some("paid".to_string());
        }
    }

    pub fn fail_next_retrieve(&self) {
        self.fail_retrieve.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StripeGateway for MockStripeGateway {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<CheckoutSession, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{}", n);
        let session = CheckoutSession {
            id: id.clone(),
            status: Some("open".to_string()),
            payment_status: Some("unpaid".to_string()),
            url: Some(format!("https://checkout.stripe.test/{}", id)),
            metadata: HashMap::from([("orderId".to_string(), params.order_id.to_string())]),
        };
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        if self.fail_retrieve.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "simulated provider outage".to_string(),
            ));
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!("no such session {}", session_id))
            })
    }
}

#[derive(Default)]
pub struct MockPaypalGateway {
    counter: AtomicUsize,
    pub fail_capture: AtomicBool,
}

impl MockPaypalGateway {
    pub fn fail_next_capture(&self) {
        self.fail_capture.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaypalGateway for MockPaypalGateway {
    async fn create_order(
        &self,
        _amount: &str,
        _currency: &str,
    ) -> Result<PaypalOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaypalOrder {
            id: format!("PAYPAL-{}", n),
            status: "CREATED".to_string(),
        })
    }

    async fn capture_order(&self, provider_order_id: &str) -> Result<PaypalOrder, ServiceError> {
        if self.fail_capture.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "simulated capture failure".to_string(),
            ));
        }
        Ok(PaypalOrder {
            id: provider_order_id.to_string(),
            status: "COMPLETED".to_string(),
        })
    }
}

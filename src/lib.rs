/*!
 * # Storefront API
 *
 * E-commerce storefront backend: catalog browsing, guest and user carts,
 * order placement, and a two-provider payment workflow.
 */

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::cart::{CartCookieCodec, CartService};
use crate::services::cart::merge::CartMergeService;
use crate::services::catalog::CatalogService;
use crate::services::orders::OrderService;
use crate::services::payments::paypal::{PaypalGateway, PaypalService};
use crate::services::payments::stripe::{StripeGateway, StripeService};
use crate::services::users::UserService;

/// All business services, wired once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub cart_merge: CartMergeService,
    pub orders: OrderService,
    pub users: UserService,
    pub stripe: StripeService,
    pub paypal: PaypalService,
    pub cookie_codec: CartCookieCodec,
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        stripe_gateway: Arc<dyn StripeGateway>,
        paypal_gateway: Arc<dyn PaypalGateway>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            config.jwt_secret.clone(),
            config.jwt_expiration as i64,
        ));
        let services = AppServices {
            catalog: CatalogService::new(db.clone()),
            cart: CartService::new(db.clone(), event_sender.clone()),
            cart_merge: CartMergeService::new(db.clone(), event_sender.clone()),
            orders: OrderService::new(db.clone(), event_sender.clone(), config.clone()),
            users: UserService::new(db.clone(), auth.clone()),
            stripe: StripeService::new(
                db.clone(),
                event_sender.clone(),
                config.clone(),
                stripe_gateway,
            ),
            paypal: PaypalService::new(db.clone(), event_sender.clone(), paypal_gateway),
            cookie_codec: CartCookieCodec::new(config.cookie_secret.as_bytes()),
        };
        Self {
            db,
            config,
            auth,
            event_sender,
            services,
        }
    }
}

/// Builds the application router with tracing and CORS layers applied.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = match state
        .config
        .cors_allowed_origins
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        Some(origins) => {
            let origins: Vec<axum::http::HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => CorsLayer::permissive(),
    };

    handlers::api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

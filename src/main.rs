use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use storefront_api::config::{init_tracing, load_config};
use storefront_api::events::{process_events, EventSender};
use storefront_api::services::payments::paypal::HttpPaypalGateway;
use storefront_api::services::payments::stripe::HttpStripeGateway;
use storefront_api::{app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    if config.auto_migrate {
        db::create_schema(&pool)
            .await
            .context("failed to create database schema")?;
    }

    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(process_events(rx));

    let stripe_gateway = Arc::new(HttpStripeGateway::new(config.stripe_secret_key.clone()));
    let paypal_gateway = Arc::new(HttpPaypalGateway::new(
        config.paypal_api_base.clone(),
        config.paypal_client_id.clone(),
        config.paypal_secret.clone(),
    ));

    let state = Arc::new(AppState::new(
        Arc::new(pool),
        Arc::new(config.clone()),
        Arc::new(EventSender::new(tx)),
        stripe_gateway,
        paypal_gateway,
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

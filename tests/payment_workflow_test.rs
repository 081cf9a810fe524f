mod common;

use common::TestApp;
use sea_orm::EntityTrait;
use storefront_api::entities::{order, payment_detail, variant, PaymentMethod};
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::{PlaceOrderInput, ShippingAddressInput};
use storefront_api::services::payments::stripe::SuccessOutcome;
use uuid::Uuid;

async fn place_order(app: &TestApp, method: PaymentMethod) -> (Uuid, Uuid, Uuid) {
    let user_id = app.seed_user(&format!("{}@example.com", Uuid::new_v4())).await;
    let (_, variant_id) = app.seed_variant(1000, 5, true, None).await;
    app.add_to_cart(user_id, variant_id, 3).await;
    let placed = app
        .state
        .services
        .orders
        .place_order(
            user_id,
            PlaceOrderInput {
                shipping_address: ShippingAddressInput {
                    country: "US".to_string(),
                    state: "CA".to_string(),
                    city: "San Francisco".to_string(),
                    postal_code: "94103".to_string(),
                    street_address: "1 Test Way".to_string(),
                    complement: String::new(),
                },
                payment_method: method,
            },
        )
        .await
        .unwrap();
    (user_id, placed.id, variant_id)
}

async fn detail_of(app: &TestApp, order_id: Uuid) -> payment_detail::Model {
    payment_detail::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
}

async fn stock_of(app: &TestApp, variant_id: Uuid) -> (i32, i32) {
    let v = variant::Entity::find_by_id(variant_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    (v.quantity_in_stock, v.sold_amount)
}

#[tokio::test]
async fn paypal_create_capture_marks_paid_and_commits_stock() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Paypal).await;

    let provider_order = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_id.as_deref(), Some(provider_order.id.as_str()));

    app.state
        .services
        .paypal
        .fulfill_order(user_id, order_id, &provider_order.id)
        .await
        .unwrap();

    let paid = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(paid.paid_at.is_some());
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_status.as_deref(), Some("COMPLETED"));

    // Stock committed exactly once: 5 - 3 = 2 on hand, 3 sold
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));
}

#[tokio::test]
async fn capture_twice_is_not_found_and_does_not_double_decrement() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Paypal).await;

    let provider_order = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    app.state
        .services
        .paypal
        .fulfill_order(user_id, order_id, &provider_order.id)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .paypal
        .fulfill_order(user_id, order_id, &provider_order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));
}

#[tokio::test]
async fn create_on_created_order_is_not_found() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Paypal).await;

    app.state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    let err = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn cancel_then_create_reaches_created_again() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Paypal).await;

    let first = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    app.state
        .services
        .paypal
        .cancel_order(user_id, order_id, &first.id)
        .await
        .unwrap();

    let detail = detail_of(&app, order_id).await;
    assert!(detail.payment_method_id.is_none(), "back to UNINITIALIZED");
    assert!(detail.payment_method_status.is_none());

    let second = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_id.as_deref(), Some(second.id.as_str()));
}

#[tokio::test]
async fn failed_capture_resets_state_and_surfaces_provider_error() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Paypal).await;

    let provider_order = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();

    app.paypal.fail_next_capture();
    let err = app
        .state
        .services
        .paypal
        .fulfill_order(user_id, order_id, &provider_order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));

    // Reset to UNINITIALIZED, order still payable, no stock movement
    let detail = detail_of(&app, order_id).await;
    assert!(detail.payment_method_id.is_none());
    assert!(detail.payment_method_status.is_none());
    assert_eq!(stock_of(&app, variant_id).await, (5, 0));

    // Retry succeeds
    let retry = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    app.state
        .services
        .paypal
        .fulfill_order(user_id, order_id, &retry.id)
        .await
        .unwrap();
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));
}

#[tokio::test]
async fn capture_with_wrong_provider_id_is_not_found() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Paypal).await;

    app.state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    let err = app
        .state
        .services
        .paypal
        .fulfill_order(user_id, order_id, "PAYPAL-OTHER")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn stripe_session_and_paid_success_callback() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Stripe).await;

    let url = app
        .state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
    assert!(url.starts_with("https://checkout.stripe.test/"));

    let detail = detail_of(&app, order_id).await;
    let session_id = detail.payment_method_id.clone().unwrap();

    // Shopper pays on the provider side, then the redirect arrives
    app.stripe.mark_paid(&session_id);
    let outcome = app
        .state
        .services
        .stripe
        .handle_success(user_id, &session_id)
        .await
        .unwrap();
    assert_eq!(outcome, SuccessOutcome::Paid(order_id));
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));

    // A replayed success redirect must not double-capture
    let err = app
        .state
        .services
        .stripe
        .handle_success(user_id, &session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));
}

#[tokio::test]
async fn stripe_unpaid_session_bounces_to_cancel_without_reset() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Stripe).await;

    app.state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
    let session_id = detail_of(&app, order_id).await.payment_method_id.unwrap();

    // Session never reached "paid"
    let outcome = app
        .state
        .services
        .stripe
        .handle_success(user_id, &session_id)
        .await
        .unwrap();
    assert_eq!(outcome, SuccessOutcome::RedirectToCancel);

    // State stays CREATED; the cancel route is responsible for the reset
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(stock_of(&app, variant_id).await, (5, 0));
}

#[tokio::test]
async fn stripe_retrieve_failure_on_success_path_leaves_state_created() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Stripe).await;

    app.state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
    let session_id = detail_of(&app, order_id).await.payment_method_id.unwrap();

    app.stripe.fail_next_retrieve();
    let outcome = app
        .state
        .services
        .stripe
        .handle_success(user_id, &session_id)
        .await
        .unwrap();
    assert_eq!(outcome, SuccessOutcome::RedirectToCancel);

    // No reset happened on this path
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_id.as_deref(), Some(session_id.as_str()));
}

#[tokio::test]
async fn stripe_cancel_resets_created_session() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Stripe).await;

    app.state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
    let session_id = detail_of(&app, order_id).await.payment_method_id.unwrap();

    app.state
        .services
        .stripe
        .handle_cancel(user_id, &session_id)
        .await
        .unwrap();

    let detail = detail_of(&app, order_id).await;
    assert!(detail.payment_method_id.is_none());
    assert!(detail.payment_method_status.is_none());

    // And checkout can be retried
    app.state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn stripe_cancel_after_capture_leaves_paid_order_alone() {
    let app = TestApp::new().await;
    let (user_id, order_id, variant_id) = place_order(&app, PaymentMethod::Stripe).await;

    app.state
        .services
        .stripe
        .create_session(user_id, order_id)
        .await
        .unwrap();
    let session_id = detail_of(&app, order_id).await.payment_method_id.unwrap();
    app.stripe.mark_paid(&session_id);
    app.state
        .services
        .stripe
        .handle_success(user_id, &session_id)
        .await
        .unwrap();

    // A late cancel redirect must not unwind the completed payment
    app.state
        .services
        .stripe
        .handle_cancel(user_id, &session_id)
        .await
        .unwrap();
    let detail = detail_of(&app, order_id).await;
    assert_eq!(detail.payment_method_status.as_deref(), Some("COMPLETED"));
    assert_eq!(stock_of(&app, variant_id).await, (2, 3));
}

#[tokio::test]
async fn wrong_payment_method_order_is_not_found() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Stripe).await;

    // Order intends Stripe; the PayPal workflow must not touch it
    let err = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn foreign_user_cannot_drive_payment() {
    let app = TestApp::new().await;
    let (user_id, order_id, _) = place_order(&app, PaymentMethod::Paypal).await;
    let intruder = app.seed_user("intruder@example.com").await;

    let err = app
        .state
        .services
        .paypal
        .create_order(intruder, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let provider_order = app
        .state
        .services
        .paypal
        .create_order(user_id, order_id)
        .await
        .unwrap();
    let err = app
        .state
        .services
        .paypal
        .fulfill_order(intruder, order_id, &provider_order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

mod common;

use chrono::Duration;
use common::TestApp;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::entities::{order, payment_detail, variant, PaymentMethod};
use storefront_api::errors::ServiceError;
use storefront_api::services::cart::CartRepository;
use storefront_api::services::orders::{PlaceOrderInput, ShippingAddressInput};
use uuid::Uuid;

fn domestic_address() -> ShippingAddressInput {
    ShippingAddressInput {
        country: "US".to_string(),
        state: "CA".to_string(),
        city: "San Francisco".to_string(),
        postal_code: "94103".to_string(),
        street_address: "1 Test Way".to_string(),
        complement: String::new(),
    }
}

fn stripe_order(address: ShippingAddressInput) -> PlaceOrderInput {
    PlaceOrderInput {
        shipping_address: address,
        payment_method: PaymentMethod::Stripe,
    }
}

#[tokio::test]
async fn place_order_snapshots_totals_and_clears_cart() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    // 15% off 999 -> 849, stock 5, qty 3
    let (_, variant_id) = app
        .seed_variant(999, 5, true, Some((15, Duration::hours(1))))
        .await;
    app.add_to_cart(user_id, variant_id, 3).await;

    let placed = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap();

    assert_eq!(placed.items_subtotal, 3 * 849);
    // Subtotal below the free-shipping threshold, domestic flat rate
    assert_eq!(placed.shipping_cost, 1_500);
    assert_eq!(placed.total_price, 3 * 849 + 1_500);
    assert!(placed.paid_at.is_none());

    // Payment detail starts UNINITIALIZED
    let detail = payment_detail::Entity::find_by_id(placed.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.payment_method, PaymentMethod::Stripe);
    assert!(detail.payment_method_id.is_none());
    assert!(detail.payment_method_status.is_none());

    // Cart is gone
    let repo = app.state.services.cart.for_user(user_id);
    assert!(repo.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn over_stock_cart_is_rejected_and_left_unmodified() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 2, true, None).await;
    app.add_to_cart(user_id, variant_id, 2).await;

    // Stock drops below the carted quantity after the fact
    let v = variant::Entity::find_by_id(variant_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut v: variant::ActiveModel = v.into();
    v.quantity_in_stock = Set(1);
    v.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BadRequest(_)));

    // No order row, cart untouched
    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
    let repo = app.state.services.cart.for_user(user_id);
    let items = repo.items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;

    let err = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BadRequest(_)));
}

#[tokio::test]
async fn order_totals_survive_later_price_changes() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;
    app.add_to_cart(user_id, variant_id, 2).await;

    let placed = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap();
    let original_subtotal = placed.items_subtotal;
    let original_total = placed.total_price;

    // Double the price after placement
    let v = variant::Entity::find_by_id(variant_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut v: variant::ActiveModel = v.into();
    v.price = Set(2000);
    v.update(&*app.state.db).await.unwrap();

    let detail = app
        .state
        .services
        .orders
        .get_order(user_id, placed.id)
        .await
        .unwrap();
    assert_eq!(detail.order.items_subtotal, original_subtotal);
    assert_eq!(detail.order.total_price, original_total);
}

#[tokio::test]
async fn free_shipping_over_threshold_and_international_surcharge() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    // 6 x 2000 = 12000, over the 10000 free-shipping threshold
    let (_, variant_id) = app.seed_variant(2000, 10, true, None).await;
    app.add_to_cart(user_id, variant_id, 6).await;

    let placed = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap();
    assert_eq!(placed.shipping_cost, 0);

    // Second order, international, below the threshold
    app.add_to_cart(user_id, variant_id, 2).await;
    let mut address = domestic_address();
    address.country = "FR".to_string();
    let placed = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(address))
        .await
        .unwrap();
    assert_eq!(placed.shipping_cost, 1_500 + 1_000);
}

#[tokio::test]
async fn foreign_order_is_not_found() {
    let app = TestApp::new().await;
    let owner = app.seed_user("owner@example.com").await;
    let intruder = app.seed_user("intruder@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;
    app.add_to_cart(owner, variant_id, 1).await;

    let placed = app
        .state
        .services
        .orders
        .place_order(owner, stripe_order(domestic_address()))
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .get_order(intruder, placed.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn address_update_recomputes_shipping_until_payment_session_exists() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;
    app.add_to_cart(user_id, variant_id, 2).await;

    let placed = app
        .state
        .services
        .orders
        .place_order(user_id, stripe_order(domestic_address()))
        .await
        .unwrap();
    assert_eq!(placed.shipping_cost, 1_500);

    // Editable while UNINITIALIZED: switching to an international address
    // adds the surcharge
    let mut address = domestic_address();
    address.country = "BR".to_string();
    let updated = app
        .state
        .services
        .orders
        .update_shipping_address(user_id, placed.id, address.clone())
        .await
        .unwrap();
    assert_eq!(updated.shipping_cost, 2_500);
    assert_eq!(updated.total_price, updated.items_subtotal + 2_500);

    // Assign an external payment session; the order stops being editable
    let detail = payment_detail::ActiveModel {
        order_id: Set(placed.id),
        payment_method: Set(PaymentMethod::Stripe),
        payment_method_id: Set(Some("cs_live_123".to_string())),
        payment_method_status: Set(Some("open".to_string())),
    };
    payment_detail::Entity::update(detail)
        .exec(&*app.state.db)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .update_shipping_address(user_id, placed.id, address)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let err = app
        .state
        .services
        .orders
        .update_payment_method(user_id, placed.id, PaymentMethod::Paypal)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn list_orders_is_newest_first() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;

    let mut ids: Vec<Uuid> = Vec::new();
    for _ in 0..2 {
        app.add_to_cart(user_id, variant_id, 1).await;
        let placed = app
            .state
            .services
            .orders
            .place_order(user_id, stripe_order(domestic_address()))
            .await
            .unwrap();
        ids.push(placed.id);
        // created_at granularity
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed = app
        .state
        .services
        .orders
        .list_orders(user_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, ids[1]);
    assert_eq!(listed[1].id, ids[0]);
}

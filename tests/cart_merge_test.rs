mod common;

use common::TestApp;
use storefront_api::services::cart::{CartRepository, GuestCart};

#[tokio::test]
async fn login_merge_guest_wins_and_prunes_user_only_lines() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_v) = app.seed_variant(1000, 10, true, None).await;
    let (_, variant_w) = app.seed_variant(2000, 10, true, None).await;

    // User cart: V qty 5, W qty 1
    app.add_to_cart(user_id, variant_v, 5).await;
    app.add_to_cart(user_id, variant_w, 1).await;

    // Guest cart: V qty 2
    let mut guest = GuestCart::new();
    guest.add_item(variant_v, 2);

    app.state
        .services
        .cart_merge
        .merge_on_login(user_id, &guest)
        .await
        .unwrap();

    let repo = app.state.services.cart.for_user(user_id);
    let items = repo.items().await.unwrap();
    assert_eq!(items.len(), 1, "W was removed");
    assert_eq!(items[0].variant.as_ref().unwrap().id, variant_v);
    assert_eq!(items[0].quantity, 2, "guest quantity wins");
}

#[tokio::test]
async fn merge_inserts_guest_only_lines() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_v) = app.seed_variant(1000, 10, true, None).await;
    let (_, variant_w) = app.seed_variant(2000, 10, true, None).await;

    app.add_to_cart(user_id, variant_v, 1).await;

    let mut guest = GuestCart::new();
    guest.add_item(variant_v, 1);
    guest.add_item(variant_w, 4);

    app.state
        .services
        .cart_merge
        .merge_on_login(user_id, &guest)
        .await
        .unwrap();

    let repo = app.state.services.cart.for_user(user_id);
    let mut items = repo.items().await.unwrap();
    items.sort_by_key(|l| l.variant.as_ref().unwrap().price);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].quantity, 1);
    assert_eq!(items[1].quantity, 4);
}

#[tokio::test]
async fn merge_creates_cart_for_first_time_user() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("fresh@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;

    let mut guest = GuestCart::new();
    guest.add_item(variant_id, 3);

    app.state
        .services
        .cart_merge
        .merge_on_login(user_id, &guest)
        .await
        .unwrap();

    let repo = app.state.services.cart.for_user(user_id);
    let items = repo.items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
}

#[tokio::test]
async fn empty_guest_cart_wipes_user_cart_on_login() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_id) = app.seed_variant(1000, 10, true, None).await;
    app.add_to_cart(user_id, variant_id, 2).await;

    // The shopper emptied their anonymous cart before logging in; the
    // guest cart stays authoritative and the user cart is cleared
    app.state
        .services
        .cart_merge
        .merge_on_login(user_id, &GuestCart::new())
        .await
        .unwrap();

    let repo = app.state.services.cart.for_user(user_id);
    assert!(repo.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn logout_serializes_user_cart_into_guest_cart() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let (_, variant_a) = app.seed_variant(1000, 10, true, None).await;
    let (_, variant_b) = app.seed_variant(2000, 10, true, None).await;
    app.add_to_cart(user_id, variant_a, 2).await;
    app.add_to_cart(user_id, variant_b, 1).await;

    let guest = app
        .state
        .services
        .cart_merge
        .user_cart_as_guest(user_id)
        .await
        .unwrap();

    assert_eq!(guest.items.len(), 2);
    let qty_of = |vid| {
        guest
            .items
            .iter()
            .find(|i| i.variant_id == vid)
            .map(|i| i.quantity)
    };
    assert_eq!(qty_of(variant_a), Some(2));
    assert_eq!(qty_of(variant_b), Some(1));
}

#[tokio::test]
async fn logout_with_no_cart_yields_empty_guest_cart() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("cartless@example.com").await;

    let guest = app
        .state
        .services
        .cart_merge
        .user_cart_as_guest(user_id)
        .await
        .unwrap();
    assert!(guest.is_empty());
}

mod common;

use common::*;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use uuid::Uuid;

use storefront_api::entities::order::{OrderChannel, OrderStatus};
use storefront_api::entities::{in_store_order_detail, online_order_detail, order, order_item};
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::{NewOrderItem, OrderScope};

fn item(sku: &str, quantity: i32, price: rust_decimal::Decimal) -> NewOrderItem {
    NewOrderItem {
        sku: sku.to_string(),
        quantity,
        price,
    }
}

async fn table_counts(app: &TestApp) -> (u64, u64, u64, u64) {
    let orders = order::Entity::find().count(&*app.db).await.unwrap();
    let items = order_item::Entity::find().count(&*app.db).await.unwrap();
    let store_details = in_store_order_detail::Entity::find()
        .count(&*app.db)
        .await
        .unwrap();
    let online_details = online_order_detail::Entity::find()
        .count(&*app.db)
        .await
        .unwrap();
    (orders, items, store_details, online_details)
}

#[tokio::test]
async fn in_store_order_records_header_items_and_detail() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;

    let coffee = seed_product(&app.db, "COFFEE-1", true, true).await;
    let tea = seed_product(&app.db, "TEA-1", true, true).await;
    seed_stock(&app.db, coffee, 10).await;
    seed_stock(&app.db, tea, 10).await;

    let response = app
        .services
        .orders
        .create_in_store_order(
            Some(cashier_id),
            store_id,
            vec![
                item("COFFEE-1", 2, dec!(10.0)),
                item("TEA-1", 1, dec!(5.0)),
            ],
        )
        .await
        .unwrap();

    assert_eq!(response.number, "00001");
    assert_eq!(response.channel, OrderChannel::InStore);
    assert_eq!(response.status, OrderStatus::Pending);
    assert_eq!(response.total, dec!(25.0));
    assert_eq!(response.items.len(), 2);
    assert!(response.checkout_url.is_none());

    let store_detail = response.store.expect("store detail missing");
    assert_eq!(store_detail.store_id, store_id);
    assert_eq!(store_detail.cashier_id, Some(cashier_id));

    assert_eq!(table_counts(&app).await, (1, 2, 1, 0));
}

#[tokio::test]
async fn order_items_carry_their_product_images() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;

    let coffee = seed_product(&app.db, "COFFEE-1", true, true).await;
    let tea = seed_product(&app.db, "TEA-1", true, true).await;
    seed_stock(&app.db, coffee, 10).await;
    seed_stock(&app.db, tea, 10).await;
    seed_product_image(&app.db, coffee, "coffee-front.png").await;
    seed_product_image(&app.db, coffee, "coffee-side.png").await;

    let response = app
        .services
        .orders
        .create_in_store_order(
            None,
            store_id,
            vec![
                item("COFFEE-1", 1, dec!(10.0)),
                item("TEA-1", 1, dec!(5.0)),
            ],
        )
        .await
        .unwrap();

    let coffee_line = response
        .items
        .iter()
        .find(|line| line.sku == "COFFEE-1")
        .expect("coffee line missing");
    let mut images = coffee_line.images.clone();
    images.sort();
    assert_eq!(
        images,
        vec!["coffee-front.png".to_string(), "coffee-side.png".to_string()]
    );

    let tea_line = response
        .items
        .iter()
        .find(|line| line.sku == "TEA-1")
        .expect("tea line missing");
    assert!(tea_line.images.is_empty());
}

#[tokio::test]
async fn order_numbers_are_sequential_across_channels() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 50).await;

    let first = app
        .services
        .orders
        .create_in_store_order(Some(cashier_id), store_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();
    let second = app
        .services
        .orders
        .create_online_order(customer_id, vec![item("SOAP-1", 2, dec!(3.5))])
        .await
        .unwrap();
    let third = app
        .services
        .orders
        .create_in_store_order(Some(cashier_id), store_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    assert_eq!(first.number, "00001");
    assert_eq!(second.number, "00002");
    assert_eq!(third.number, "00003");
}

#[tokio::test]
async fn insufficient_stock_rolls_back_everything() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;

    let plenty = seed_product(&app.db, "PLENTY", true, true).await;
    let scarce = seed_product(&app.db, "SCARCE", true, true).await;
    seed_stock(&app.db, plenty, 10).await;
    seed_stock(&app.db, scarce, 1).await;

    let err = app
        .services
        .orders
        .create_in_store_order(
            Some(cashier_id),
            store_id,
            vec![item("PLENTY", 2, dec!(4.0)), item("SCARCE", 2, dec!(9.0))],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidOperation(_)));
    assert_eq!(
        err.to_string(),
        "Sorry, insufficient stock for the requested quantity of item SKU: SCARCE"
    );

    // The first line must not survive the failure of the second.
    assert_eq!(table_counts(&app).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn unknown_sku_is_a_not_found() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;

    let err = app
        .services
        .orders
        .create_in_store_order(Some(cashier_id), store_id, vec![item("GHOST", 1, dec!(1.0))])
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(table_counts(&app).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn disabled_product_is_rejected_on_both_channels() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;

    let product = seed_product(&app.db, "RETIRED", false, true).await;
    seed_stock(&app.db, product, 10).await;

    for result in [
        app.services
            .orders
            .create_in_store_order(Some(cashier_id), store_id, vec![item("RETIRED", 1, dec!(2.0))])
            .await,
        app.services
            .orders
            .create_online_order(customer_id, vec![item("RETIRED", 1, dec!(2.0))])
            .await,
    ] {
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Sorry, you cannot order item SKU: RETIRED");
    }
}

#[tokio::test]
async fn hidden_product_sells_in_store_but_not_online() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, store_id, cashier_id).await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;

    let product = seed_product(&app.db, "COUNTER-ONLY", true, false).await;
    seed_stock(&app.db, product, 10).await;

    let pos_sale = app
        .services
        .orders
        .create_in_store_order(
            Some(cashier_id),
            store_id,
            vec![item("COUNTER-ONLY", 1, dec!(7.0))],
        )
        .await;
    assert!(pos_sale.is_ok());

    let online = app
        .services
        .orders
        .create_online_order(customer_id, vec![item("COUNTER-ONLY", 1, dec!(7.0))])
        .await
        .unwrap_err();
    assert_eq!(
        online.to_string(),
        "Sorry, you cannot order item SKU: COUNTER-ONLY"
    );
}

#[tokio::test]
async fn unassigned_cashier_is_forbidden_and_writes_nothing() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let err = app
        .services
        .orders
        .create_in_store_order(Some(cashier_id), store_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(table_counts(&app).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn admin_records_a_sale_without_store_assignment() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let response = app
        .services
        .orders
        .create_in_store_order(None, store_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let detail = response.store.expect("store detail missing");
    assert_eq!(detail.store_id, store_id);
    assert_eq!(detail.cashier_id, None);
}

#[tokio::test]
async fn empty_item_list_is_rejected() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;

    let err = app
        .services
        .orders
        .create_in_store_order(None, store_id, Vec::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Please add items");
}

#[tokio::test]
async fn zero_quantity_gets_the_minimum_quantity_message() {
    let app = TestApp::new().await;
    let store_id = seed_store(&app.db, "downtown").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let err = app
        .services
        .orders
        .create_in_store_order(None, store_id, vec![item("SOAP-1", 0, dec!(3.5))])
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "The minimum order quantity for item SKU: SOAP-1 is 1"
    );
    assert_eq!(table_counts(&app).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn online_order_opens_a_checkout_session() {
    let app = TestApp::new().await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;
    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let response = app
        .services
        .orders
        .create_online_order(customer_id, vec![item("SOAP-1", 2, dec!(3.5))])
        .await
        .unwrap();

    assert_eq!(response.channel, OrderChannel::Online);
    assert_eq!(response.total, dec!(7.0));
    let checkout_url = response.checkout_url.expect("checkout url missing");
    assert_eq!(
        checkout_url,
        format!("https://checkout.test/{}", response.id)
    );

    let customer = response.customer.expect("customer detail missing");
    assert_eq!(customer.customer_id, Some(customer_id));

    assert_eq!(app.gateway.call_count(), 1);
    assert_eq!(table_counts(&app).await, (1, 1, 0, 1));
}

#[tokio::test]
async fn gateway_failure_rolls_the_online_order_back() {
    let app = TestApp::with_gateway(MockGateway::failing()).await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;
    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let err = app
        .services
        .orders
        .create_online_order(customer_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::PaymentFailed(_)));
    assert_eq!(app.gateway.call_count(), 1);
    assert_eq!(table_counts(&app).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn sku_lookup_is_gated_until_the_callback_lands() {
    let app = TestApp::new().await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;
    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 10).await;

    let created = app
        .services
        .orders
        .create_online_order(customer_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let gated = app
        .services
        .orders
        .find_by_item_sku("SOAP-1")
        .await
        .unwrap_err();
    assert!(matches!(gated, ServiceError::Forbidden(_)));
    assert_eq!(gated.to_string(), "Payment not clear");

    let completed = app.services.orders.mark_completed(created.id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert!(completed.updated_at.is_some());

    let released = app.services.orders.find_by_item_sku("SOAP-1").await.unwrap();
    assert_eq!(released.id, created.id);
    assert_eq!(released.items.len(), 1);

    // The callback can land twice without changing anything.
    let again = app.services.orders.mark_completed(created.id).await.unwrap();
    assert_eq!(again.status, OrderStatus::Completed);
}

#[tokio::test]
async fn completing_an_unknown_order_is_a_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services
        .orders
        .mark_completed(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn lookup_for_an_unknown_sku_is_a_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services
        .orders
        .find_by_item_sku("GHOST")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn admin_listing_scopes_by_store_and_channel() {
    let app = TestApp::new().await;
    let downtown = seed_store(&app.db, "downtown").await;
    let uptown = seed_store(&app.db, "uptown").await;
    let customer_id = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 50).await;

    for _ in 0..2 {
        app.services
            .orders
            .create_in_store_order(None, downtown, vec![item("SOAP-1", 1, dec!(3.5))])
            .await
            .unwrap();
    }
    app.services
        .orders
        .create_in_store_order(None, uptown, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();
    app.services
        .orders
        .create_online_order(customer_id, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let online = app
        .services
        .orders
        .list_orders(OrderScope::Online, 20, 0)
        .await
        .unwrap();
    assert_eq!(online.total, 1);
    assert_eq!(online.orders.len(), 1);
    assert_eq!(online.orders[0].channel, OrderChannel::Online);

    let downtown_page = app
        .services
        .orders
        .list_orders(OrderScope::Store(downtown), 20, 0)
        .await
        .unwrap();
    assert_eq!(downtown_page.total, 2);

    // Pagination: one per page, second page has the older order.
    let paged = app
        .services
        .orders
        .list_orders(OrderScope::Store(downtown), 1, 1)
        .await
        .unwrap();
    assert_eq!(paged.total, 2);
    assert_eq!(paged.orders.len(), 1);
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let omar = seed_user(&app.db, "Omar", "Ndlovu", "omar@example.com").await;
    let lena = seed_user(&app.db, "Lena", "Phiri", "lena@example.com").await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 50).await;

    let omars_order = app
        .services
        .orders
        .create_online_order(omar, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let omars = app
        .services
        .orders
        .list_orders_for_customer(omar, 20, 0)
        .await
        .unwrap();
    assert_eq!(omars.total, 1);

    let lenas = app
        .services
        .orders
        .list_orders_for_customer(lena, 20, 0)
        .await
        .unwrap();
    assert_eq!(lenas.total, 0);

    let err = app
        .services
        .orders
        .get_order_for_customer(lena, omars_order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn cashier_listing_covers_assigned_stores_only() {
    let app = TestApp::new().await;
    let downtown = seed_store(&app.db, "downtown").await;
    let uptown = seed_store(&app.db, "uptown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, downtown, cashier_id).await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 50).await;

    app.services
        .orders
        .create_in_store_order(Some(cashier_id), downtown, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();
    app.services
        .orders
        .create_in_store_order(None, uptown, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let page = app
        .services
        .orders
        .list_orders_for_cashier(cashier_id, 20, 0)
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let unassigned = seed_user(&app.db, "Noor", "Banda", "noor@example.com").await;
    let empty = app
        .services
        .orders
        .list_orders_for_cashier(unassigned, 20, 0)
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
}

#[tokio::test]
async fn store_scoped_fetch_requires_assignment() {
    let app = TestApp::new().await;
    let downtown = seed_store(&app.db, "downtown").await;
    let uptown = seed_store(&app.db, "uptown").await;
    let cashier_id = seed_user(&app.db, "Cora", "Till", "cora@example.com").await;
    assign_cashier(&app.db, downtown, cashier_id).await;

    let product = seed_product(&app.db, "SOAP-1", true, true).await;
    seed_stock(&app.db, product, 50).await;

    let created = app
        .services
        .orders
        .create_in_store_order(Some(cashier_id), downtown, vec![item("SOAP-1", 1, dec!(3.5))])
        .await
        .unwrap();

    let fetched = app
        .services
        .orders
        .get_order_for_store(cashier_id, created.id, downtown)
        .await
        .unwrap();
    assert_eq!(fetched.id, created.id);

    let wrong_store = app
        .services
        .orders
        .get_order_for_store(cashier_id, created.id, uptown)
        .await
        .unwrap_err();
    assert!(matches!(wrong_store, ServiceError::Forbidden(_)));
}

//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{EntityKind, Money, OrderStatus};
use sqlx::PgPool;
use store::{
    AddressStore, LineRequest, NewAddress, NewOrder, NewProduct, NewUser, OrderFilter, OrderPatch,
    OrderStore, Page, PostgresStore, Product, ProductFilter, ProductPatch, ProductStore,
    StoreError, StoreExt, User, UserFilter, UserPatch, UserStore,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_shop_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_lines, orders, addresses, products, users CASCADE")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn create_user(store: &PostgresStore, username: &str) -> User {
    store
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            description: None,
        })
        .await
        .unwrap()
}

async fn create_product(store: &PostgresStore, name: &str, cents: i64, stock: i32) -> Product {
    store
        .create_product(NewProduct {
            name: name.to_string(),
            price: Money::from_cents(cents),
            description: None,
            stock_quantity: stock,
        })
        .await
        .unwrap()
}

fn order_for(user: &User, lines: Vec<LineRequest>) -> NewOrder {
    NewOrder {
        user_id: user.id,
        address_id: None,
        lines,
        status: OrderStatus::Pending,
    }
}

#[tokio::test]
async fn create_and_get_user() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;

    let fetched = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, "alice");
    assert_eq!(fetched.email, "alice@example.com");
    assert!(fetched.description.is_none());
}

#[tokio::test]
async fn duplicate_username_is_constraint_violation() {
    let store = get_test_store().await;
    create_user(&store, "alice").await;

    let result = store
        .create_user(NewUser {
            username: "alice".to_string(),
            email: "other@example.com".to_string(),
            description: None,
        })
        .await;

    match result {
        Err(StoreError::ConstraintViolation { constraint, .. }) => {
            assert_eq!(constraint, "users_username_key");
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
}

#[tokio::test]
async fn update_user_keeps_absent_fields() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;

    let updated = store
        .update_user(
            user.id,
            UserPatch {
                description: Some("hello".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.username, "alice");
    assert_eq!(updated.description.as_deref(), Some("hello"));
}

#[tokio::test]
async fn update_missing_user_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .update_user(common::UserId::new(), UserPatch::default())
        .await;

    assert!(matches!(
        result,
        Err(StoreError::NotFound {
            kind: EntityKind::User,
            ..
        })
    ));
}

#[tokio::test]
async fn list_users_paginates_in_creation_order() {
    let store = get_test_store().await;
    for i in 0..5 {
        create_user(&store, &format!("user{i}")).await;
    }

    let page = store
        .list_users(&UserFilter::default(), Page::new(2, 2).unwrap())
        .await
        .unwrap();
    let names: Vec<_> = page.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["user2", "user3"]);
}

#[tokio::test]
async fn list_users_filters_case_insensitively() {
    let store = get_test_store().await;
    create_user(&store, "Alice").await;
    create_user(&store, "bob").await;

    let users = store
        .list_users(&UserFilter::default().username("ali"), Page::default())
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "Alice");
}

#[tokio::test]
async fn list_products_price_range_is_inclusive() {
    let store = get_test_store().await;
    create_product(&store, "cheap", 100, 1).await;
    create_product(&store, "mid", 500, 1).await;
    create_product(&store, "dear", 1000, 1).await;

    let filter = ProductFilter::default()
        .min_price(Money::from_cents(500))
        .max_price(Money::from_cents(1000));
    let products = store.list_products(&filter, Page::default()).await.unwrap();
    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["mid", "dear"]);
}

#[tokio::test]
async fn negative_stock_update_is_rejected() {
    let store = get_test_store().await;
    let product = create_product(&store, "widget", 100, 1).await;

    let result = store
        .update_product(
            product.id,
            ProductPatch {
                stock_quantity: Some(-1),
                ..Default::default()
            },
        )
        .await;

    match result {
        Err(StoreError::ConstraintViolation { constraint, .. }) => {
            assert_eq!(constraint, "products_stock_quantity_check");
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
}

#[tokio::test]
async fn place_order_decrements_stock_and_captures_price() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 1000, 5).await;

    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 3)]))
        .await
        .unwrap();

    assert_eq!(order.total_price, Money::from_cents(3000));
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].price_at_order, Money::from_cents(1000));

    let product = store.require_product(product.id).await.unwrap();
    assert_eq!(product.stock_quantity, 2);

    let fetched = store.require_order(order.id).await.unwrap();
    assert_eq!(fetched, order);
}

#[tokio::test]
async fn captured_price_survives_product_repricing() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 1000, 5).await;

    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    store
        .update_product(
            product.id,
            ProductPatch {
                price: Some(Money::from_cents(9999)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let fetched = store.require_order(order.id).await.unwrap();
    assert_eq!(fetched.lines[0].price_at_order, Money::from_cents(1000));
}

#[tokio::test]
async fn insufficient_stock_writes_nothing() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let plenty = create_product(&store, "plenty", 100, 10).await;
    let scarce = create_product(&store, "scarce", 100, 1).await;

    let result = store
        .place_order(order_for(
            &user,
            vec![
                LineRequest::new(plenty.id, 4),
                LineRequest::new(scarce.id, 2),
            ],
        ))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::InsufficientStock {
            available: 1,
            requested: 2,
            ..
        })
    ));
    assert_eq!(store.require_product(plenty.id).await.unwrap().stock_quantity, 10);
    assert_eq!(store.require_product(scarce.id).await.unwrap().stock_quantity, 1);

    let orders = store
        .list_orders(&OrderFilter::default(), Page::default())
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn repeated_product_lines_check_combined_demand() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;

    let result = store
        .place_order(order_for(
            &user,
            vec![
                LineRequest::new(product.id, 3),
                LineRequest::new(product.id, 3),
            ],
        ))
        .await;

    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
    assert_eq!(store.require_product(product.id).await.unwrap().stock_quantity, 5);
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            let order = order_for(&user, vec![LineRequest::new(product.id, 3)]);
            tokio::spawn(async move { store.place_order(order).await })
        })
        .collect();

    let results = futures_util::future::join_all(handles).await;
    let (ok, failed): (Vec<_>, Vec<_>) = results
        .into_iter()
        .map(|r| r.unwrap())
        .partition(|r| r.is_ok());

    assert_eq!(ok.len(), 1);
    assert_eq!(failed.len(), 1);
    assert!(matches!(
        failed[0],
        Err(StoreError::InsufficientStock { .. })
    ));
    assert_eq!(store.require_product(product.id).await.unwrap().stock_quantity, 2);
}

#[tokio::test]
async fn delete_user_cascades_to_orders_and_addresses() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let address = store
        .create_address(NewAddress {
            user_id: user.id,
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: String::new(),
            zip_code: String::new(),
            country: "US".to_string(),
            is_primary: true,
        })
        .await
        .unwrap();
    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    assert!(store.delete_user(user.id).await.unwrap());
    assert!(store.get_order(order.id).await.unwrap().is_none());
    assert!(store.get_address(address.id).await.unwrap().is_none());
    assert!(!store.delete_user(user.id).await.unwrap());
}

#[tokio::test]
async fn delete_address_clears_order_reference() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let address = store
        .create_address(NewAddress {
            user_id: user.id,
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: String::new(),
            zip_code: String::new(),
            country: "US".to_string(),
            is_primary: false,
        })
        .await
        .unwrap();

    let mut new = order_for(&user, vec![LineRequest::new(product.id, 1)]);
    new.address_id = Some(address.id);
    let order = store.place_order(new).await.unwrap();
    assert_eq!(order.address_id, Some(address.id));

    assert!(store.delete_address(address.id).await.unwrap());
    let fetched = store.require_order(order.id).await.unwrap();
    assert!(fetched.address_id.is_none());
}

#[tokio::test]
async fn delete_referenced_product_is_restricted() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    match store.delete_product(product.id).await {
        Err(StoreError::ConstraintViolation { constraint, .. }) => {
            assert_eq!(constraint, "order_lines_product_id_fkey");
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
}

#[tokio::test]
async fn update_order_with_missing_user_is_constraint_violation() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    let result = store
        .update_order(
            order.id,
            OrderPatch {
                user_id: Some(common::UserId::new()),
                ..Default::default()
            },
        )
        .await;

    match result {
        Err(StoreError::ConstraintViolation { constraint, .. }) => {
            assert_eq!(constraint, "orders_user_id_fkey");
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let first = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();
    store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    store
        .update_order(
            first.id,
            OrderPatch {
                status: Some(OrderStatus::Shipped),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let shipped = store
        .list_orders(
            &OrderFilter::default().status(OrderStatus::Shipped),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(shipped.len(), 1);
    assert_eq!(shipped[0].id, first.id);
    assert_eq!(shipped[0].lines.len(), 1);
}

#[tokio::test]
async fn total_overflow_writes_nothing() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "yacht", i64::MAX / 2, 5).await;

    let result = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 3)]))
        .await;

    assert!(matches!(result, Err(StoreError::TotalOverflow)));
    assert_eq!(store.require_product(product.id).await.unwrap().stock_quantity, 5);
    let orders = store
        .list_orders(&OrderFilter::default(), Page::default())
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn order_cannot_use_another_users_address() {
    let store = get_test_store().await;
    let alice = create_user(&store, "alice").await;
    let bob = create_user(&store, "bob").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let bobs_address = store
        .create_address(NewAddress {
            user_id: bob.id,
            street: "2 Elm St".to_string(),
            city: "Shelbyville".to_string(),
            state: String::new(),
            zip_code: String::new(),
            country: "US".to_string(),
            is_primary: true,
        })
        .await
        .unwrap();

    let mut new_order = order_for(&alice, vec![LineRequest::new(product.id, 1)]);
    new_order.address_id = Some(bobs_address.id);
    let result = store.place_order(new_order).await;

    assert!(matches!(
        result,
        Err(StoreError::NotFound {
            kind: EntityKind::Address,
            ..
        })
    ));
    assert_eq!(store.require_product(product.id).await.unwrap().stock_quantity, 5);
}

#[tokio::test]
async fn cancelled_order_cannot_be_shipped() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    store
        .update_order(
            order.id,
            OrderPatch {
                status: Some(OrderStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = store
        .update_order(
            order.id,
            OrderPatch {
                status: Some(OrderStatus::Shipped),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::InvalidStatusTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Shipped,
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_terminal_status_updates_have_one_winner() {
    let store = get_test_store().await;
    let user = create_user(&store, "alice").await;
    let product = create_product(&store, "widget", 100, 5).await;
    let order = store
        .place_order(order_for(&user, vec![LineRequest::new(product.id, 1)]))
        .await
        .unwrap();

    let handles: Vec<_> = [OrderStatus::Completed, OrderStatus::Cancelled]
        .into_iter()
        .map(|status| {
            let store = store.clone();
            let patch = OrderPatch {
                status: Some(status),
                ..Default::default()
            };
            tokio::spawn(async move { store.update_order(order.id, patch).await })
        })
        .collect();

    let results = futures_util::future::join_all(handles).await;
    let (ok, failed): (Vec<_>, Vec<_>) = results
        .into_iter()
        .map(|r| r.unwrap())
        .partition(|r| r.is_ok());

    assert_eq!(ok.len(), 1);
    assert!(matches!(
        failed[..],
        [Err(StoreError::InvalidStatusTransition { .. })]
    ));
    let winner = ok[0].as_ref().unwrap().status;
    assert_eq!(store.require_order(order.id).await.unwrap().status, winner);
}

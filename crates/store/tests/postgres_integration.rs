//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{AddressId, OrderId, SellerId, ShipmentId, UserId};
use domain::{
    Address, Customer, Dimensions, Money, Order, OrderItem, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, Product, ProductId, Seller, Shipment, ShipmentStatus,
};
use sqlx::PgPool;
use store::{PostgresStore, Store, StoreError, Transaction, TransactionExt};
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

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_fulfillment_tables.sql"
            ))
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

    sqlx::query(
        "TRUNCATE TABLE order_status_history, shipments, payments, order_items, orders, \
         products, sellers, addresses, customers CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

struct Fixture {
    customer: UserId,
    seller: SellerId,
    address: AddressId,
}

fn address(owner_id: Option<UserId>) -> Address {
    Address {
        id: AddressId::new(),
        owner_id,
        name: "Jane Doe".to_string(),
        line1: "1 Main St".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        region: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        phone: Some("+15550100".to_string()),
    }
}

async fn seed(store: &PostgresStore) -> Fixture {
    let customer = Customer {
        id: UserId::new(),
        name: "Jane Doe".to_string(),
        email: "jane@example.com".to_string(),
    };
    store.add_customer(&customer).await.unwrap();

    let home = address(Some(customer.id));
    store.add_address(&home).await.unwrap();

    let seller = Seller {
        id: SellerId::new(),
        name: "Acme".to_string(),
        warehouse_address: Some(address(None)),
    };
    store.add_seller(&seller).await.unwrap();

    store
        .add_product(&Product {
            id: "P".into(),
            name: "Widget".to_string(),
            price: Money::from_cents(1000),
            stock: 10,
            seller_id: Some(seller.id),
            weight_grams: 500,
            dimensions: Dimensions {
                length_cm: 30,
                width_cm: 20,
                height_cm: 5,
            },
        })
        .await
        .unwrap();

    Fixture {
        customer: customer.id,
        seller: seller.id,
        address: home.id,
    }
}

fn order_for(fixture: &Fixture) -> Order {
    let order_id = OrderId::new();
    Order::new(
        order_id,
        fixture.customer,
        fixture.seller,
        fixture.address,
        fixture.address,
        vec![OrderItem::new(order_id, "P", 2, Money::from_cents(1000)).unwrap()],
        Utc::now(),
    )
}

#[tokio::test]
async fn order_round_trips_with_items_and_payment() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = order_for(&fixture);
    let payment = Payment::pending(order.id, order.total_amount, Utc::now());

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();

    let details = store.order_details(order.id).await.unwrap().unwrap();
    assert_eq!(details.order.order_number, order.order_number);
    assert_eq!(details.order.items.len(), 1);
    assert_eq!(details.order.items[0].quantity, 2);
    assert_eq!(details.order.total_amount.cents(), 2000);
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Pending);
}

#[tokio::test]
async fn rollback_on_drop() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.update_product_stock(&"P".into(), 3).await.unwrap();
        tx.insert_order(&order_for(&fixture)).await.unwrap();
    }

    let product = store.product(&"P".into()).await.unwrap().unwrap();
    assert_eq!(product.stock, 10);
}

#[tokio::test]
async fn duplicate_payment_for_order_is_rejected() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = order_for(&fixture);

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_payment(&Payment::pending(order.id, order.total_amount, Utc::now()))
        .await
        .unwrap();
    let result = tx
        .insert_payment(&Payment::pending(order.id, order.total_amount, Utc::now()))
        .await;

    assert!(matches!(result, Err(StoreError::Duplicate { .. })));
}

#[tokio::test]
async fn payment_updates_persist_every_column() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = order_for(&fixture);
    let mut payment = Payment::pending(order.id, order.total_amount, Utc::now());

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();

    payment.method = Some(PaymentMethod::PayPal);
    payment.status = PaymentStatus::Success;
    payment.gateway_transaction_id = Some("PAYPAL-ORDER-1".to_string());

    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_payment_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(locked.id, payment.id);
    tx.update_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.method, Some(PaymentMethod::PayPal));
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(
        stored.gateway_transaction_id.as_deref(),
        Some("PAYPAL-ORDER-1")
    );
}

#[tokio::test]
async fn status_changes_are_audited_in_order() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let mut order = order_for(&fixture);

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    let change = order
        .transition_to(OrderStatus::Processing, "payment captured", Utc::now())
        .unwrap();
    tx.save_status_change(&order, &change).await.unwrap();
    let change = order
        .transition_to(OrderStatus::Shipped, "shipment created", Utc::now())
        .unwrap();
    tx.save_status_change(&order, &change).await.unwrap();
    tx.commit().await.unwrap();

    let history = store.order_history(order.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].to, OrderStatus::Processing);
    assert_eq!(history[1].from, OrderStatus::Processing);
    assert_eq!(history[1].to, OrderStatus::Shipped);

    let details = store.order_details(order.id).await.unwrap().unwrap();
    assert_eq!(details.order.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn shipments_are_unique_per_carrier_and_tracking() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = order_for(&fixture);
    let now = Utc::now();
    let shipment = Shipment {
        id: ShipmentId::new(),
        order_id: order.id,
        carrier: "UPS".to_string(),
        tracking_number: "1Z999".to_string(),
        label_url: Some("https://labels.example.com/1Z999.pdf".to_string()),
        status: ShipmentStatus::Processing,
        logistics_provider: "sandbox".to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_shipment(&shipment).await.unwrap();
    tx.commit().await.unwrap();

    let found = store.shipment_by_tracking("1Z999").await.unwrap().unwrap();
    assert_eq!(found.id, shipment.id);

    let duplicate = Shipment {
        id: ShipmentId::new(),
        ..shipment
    };
    let mut tx = store.begin().await.unwrap();
    let result = tx.insert_shipment(&duplicate).await;
    assert!(matches!(result, Err(StoreError::Duplicate { .. })));
}

#[tokio::test]
async fn seller_lookup_includes_warehouse() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let seller = tx.find_seller(fixture.seller).await.unwrap().unwrap();
    let warehouse = seller.warehouse_address.unwrap();
    assert_eq!(warehouse.city, "Springfield");
    assert!(warehouse.owner_id.is_none());

    assert!(
        tx.find_address(fixture.address, fixture.customer)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        tx.find_address(fixture.address, UserId::new())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn missing_rows_are_reported() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.lock_order(OrderId::new()).await.unwrap().is_none());
    let result = tx.update_product_stock(&"missing".into(), 1).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

/// Takes `quantity` units of `product_id` under a row lock, holding the lock
/// briefly so competing transactions queue up behind it.
async fn reserve(store: &PostgresStore, product_id: &ProductId, quantity: u32) -> bool {
    let mut tx = store.begin().await.unwrap();
    let product = tx.lock_product(product_id).await.unwrap().unwrap();
    if product.stock < quantity {
        return false;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.update_product_stock(product_id, product.stock - quantity)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    true
}

/// Cancels `order_id` and returns its stock, locking order, payment and
/// product in that order. Returns false when the order was already cancelled.
async fn cancel(store: &PostgresStore, order_id: OrderId) -> bool {
    let mut tx = store.begin().await.unwrap();
    let mut order = tx.lock_order(order_id).await.unwrap().unwrap();
    if order.status == OrderStatus::Cancelled {
        return false;
    }
    tx.lock_payment_for_order(order_id).await.unwrap();
    for item in &order.items {
        let product = tx.lock_product(&item.product_id).await.unwrap().unwrap();
        tx.update_product_stock(&item.product_id, product.stock + item.quantity)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    let change = order
        .transition_to(OrderStatus::Cancelled, "cancelled by customer", Utc::now())
        .unwrap();
    tx.save_status_change(&order, &change).await.unwrap();
    tx.commit().await.unwrap();
    true
}

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    seed(&store).await;
    let product_id: ProductId = "P".into();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let product_id = product_id.clone();
            tokio::spawn(async move { reserve(&store, &product_id, 3).await })
        })
        .collect();
    let mut reserved = 0;
    for handle in handles {
        if handle.await.unwrap() {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 10 / 3);
    let product = store.product(&product_id).await.unwrap().unwrap();
    assert_eq!(product.stock, 10 - 3 * reserved);
}

#[tokio::test]
async fn concurrent_cancellations_restore_stock_once() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = order_for(&fixture);

    let mut tx = store.begin().await.unwrap();
    tx.update_product_stock(&"P".into(), 8).await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_payment(&Payment::pending(order.id, order.total_amount, Utc::now()))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let order_id = order.id;
    let first = tokio::spawn({
        let store = store.clone();
        async move { cancel(&store, order_id).await }
    });
    let second = tokio::spawn({
        let store = store.clone();
        async move { cancel(&store, order_id).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|cancelled| **cancelled).count(), 1);
    let product = store.product(&"P".into()).await.unwrap().unwrap();
    assert_eq!(product.stock, 10);
    let history = store.order_history(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to, OrderStatus::Cancelled);
}

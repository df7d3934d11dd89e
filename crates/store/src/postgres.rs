use std::str::FromStr;

use async_trait::async_trait;
use common::{AddressId, OrderId, OrderItemId, PaymentId, SellerId, ShipmentId, UserId};
use domain::{
    Address, Customer, Dimensions, Money, Order, OrderDetails, OrderItem, OrderNumber,
    OrderStatus, Payment, Product, ProductId, Seller, Shipment, StatusChange,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, Transaction},
};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, seller_id, shipping_address_id, \
     billing_address_id, status, total_amount_cents, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, method, status, amount_cents, \
     gateway_transaction_id, refund_transaction_id, created_at, updated_at";

const SHIPMENT_COLUMNS: &str = "id, order_id, carrier, tracking_number, label_url, status, \
     logistics_provider, created_at, updated_at";

const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, stock, seller_id, weight_grams, length_cm, width_cm, height_cm";

const ADDRESS_COLUMNS: &str =
    "id, owner_id, name, line1, line2, city, region, postal_code, country, phone";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Registers a customer.
    pub async fn add_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query("INSERT INTO customers (id, name, email) VALUES ($1, $2, $3)")
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .bind(&customer.email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Registers an address.
    pub async fn add_address(&self, address: &Address) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO addresses (id, owner_id, name, line1, line2, city, region, postal_code, country, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(address.id.as_uuid())
        .bind(address.owner_id.map(|id| id.as_uuid()))
        .bind(&address.name)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.region)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Registers a seller, inserting its warehouse address first.
    pub async fn add_seller(&self, seller: &Seller) -> Result<()> {
        if let Some(warehouse) = &seller.warehouse_address {
            self.add_address(warehouse).await?;
        }

        sqlx::query("INSERT INTO sellers (id, name, warehouse_address_id) VALUES ($1, $2, $3)")
            .bind(seller.id.as_uuid())
            .bind(&seller.name)
            .bind(seller.warehouse_address.as_ref().map(|a| a.id.as_uuid()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Registers or replaces a product.
    pub async fn add_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, seller_id, weight_grams, length_cm, width_cm, height_cm)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                seller_id = EXCLUDED.seller_id,
                weight_grams = EXCLUDED.weight_grams,
                length_cm = EXCLUDED.length_cm,
                width_cm = EXCLUDED.width_cm,
                height_cm = EXCLUDED.height_cm
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_int("products", product.stock)?)
        .bind(product.seller_id.map(|id| id.as_uuid()))
        .bind(to_int("products", product.weight_grams)?)
        .bind(to_int("products", product.dimensions.length_cm)?)
        .bind(to_int("products", product.dimensions.width_cm)?)
        .bind(to_int("products", product.dimensions.height_cm)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    async fn order_details(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = fetch_order(&mut conn, order_id, false).await? else {
            return Ok(None);
        };
        let payment = fetch_payment_for_order(&mut conn, order_id, false).await?;

        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
        let shipments = rows.into_iter().map(row_to_shipment).collect::<Result<_>>()?;

        Ok(Some(OrderDetails {
            order,
            payment,
            shipments,
        }))
    }

    async fn order_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, from_status, to_status, reason, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<StatusChange> {
                Ok(StatusChange {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    from: parse("order_status_history", row.try_get("from_status")?)?,
                    to: parse("order_status_history", row.try_get("to_status")?)?,
                    reason: row.try_get("reason")?,
                    changed_at: row.try_get("changed_at")?,
                })
            })
            .collect()
    }

    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_payment).transpose()
    }

    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, product_id, false).await
    }

    async fn shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_shipment_by_tracking(&mut conn, tracking_number, false).await
    }
}

/// Transaction over [`PostgresStore`].
///
/// `lock_*` methods issue `SELECT ... FOR UPDATE`. Dropping the value rolls
/// the transaction back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn find_customer(&mut self, customer_id: UserId) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, name, email FROM customers WHERE id = $1")
            .bind(customer_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| -> Result<Customer> {
            Ok(Customer {
                id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            })
        })
        .transpose()
    }

    async fn find_address(
        &mut self,
        address_id: AddressId,
        owner_id: UserId,
    ) -> Result<Option<Address>> {
        let row = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND owner_id = $2"
        ))
        .bind(address_id.as_uuid())
        .bind(owner_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|row| row_to_address(&row, "")).transpose()
    }

    async fn find_seller(&mut self, seller_id: SellerId) -> Result<Option<Seller>> {
        let row = sqlx::query(
            r#"
            SELECT s.id AS seller_id, s.name AS seller_name,
                   a.id AS w_id, a.owner_id AS w_owner_id, a.name AS w_name,
                   a.line1 AS w_line1, a.line2 AS w_line2, a.city AS w_city,
                   a.region AS w_region, a.postal_code AS w_postal_code,
                   a.country AS w_country, a.phone AS w_phone
            FROM sellers s
            LEFT JOIN addresses a ON a.id = s.warehouse_address_id
            WHERE s.id = $1
            "#,
        )
        .bind(seller_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let warehouse_id: Option<Uuid> = row.try_get("w_id")?;
        let warehouse_address = match warehouse_id {
            Some(_) => Some(row_to_address(&row, "w_")?),
            None => None,
        };

        Ok(Some(Seller {
            id: SellerId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            name: row.try_get("seller_name")?,
            warehouse_address,
        }))
    }

    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        fetch_product(&mut self.tx, product_id, true).await
    }

    async fn update_product_stock(&mut self, product_id: &ProductId, stock: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(product_id.as_str())
            .bind(to_int("products", stock)?)
            .execute(&mut *self.tx)
            .await?;
        ensure_updated(result.rows_affected(), "product", product_id)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.customer_id.as_uuid())
        .bind(order.seller_id.as_uuid())
        .bind(order.shipping_address_id.as_uuid())
        .bind(order.billing_address_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "unique_order_number", "order number", || {
            order.order_number.to_string()
        }))?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, quantity, price_at_purchase_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(to_int("order_items", item.quantity)?)
            .bind(item.price_at_purchase.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        fetch_order(&mut self.tx, order_id, true).await
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await?;
        ensure_updated(result.rows_affected(), "order", order.id)
    }

    async fn record_status_change(&mut self, change: &StatusChange) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, reason, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(change.order_id.as_uuid())
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(&change.reason)
        .bind(change.changed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.method.map(|m| m.as_str()))
        .bind(payment.status.as_str())
        .bind(payment.amount.cents())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.refund_transaction_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "unique_payment_order", "payment for order", || {
            payment.order_id.to_string()
        }))?;
        Ok(())
    }

    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_payment).transpose()
    }

    async fn lock_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        fetch_payment_for_order(&mut self.tx, order_id, true).await
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET method = $2, status = $3, gateway_transaction_id = $4,
                refund_transaction_id = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.method.map(|m| m.as_str()))
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.refund_transaction_id)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        ensure_updated(result.rows_affected(), "payment", payment.id)
    }

    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO shipments ({SHIPMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(shipment.id.as_uuid())
        .bind(shipment.order_id.as_uuid())
        .bind(&shipment.carrier)
        .bind(&shipment.tracking_number)
        .bind(&shipment.label_url)
        .bind(shipment.status.as_str())
        .bind(&shipment.logistics_provider)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "unique_carrier_tracking", "tracking number", || {
            format!("{}/{}", shipment.carrier, shipment.tracking_number)
        }))?;
        Ok(())
    }

    async fn lock_shipment_by_tracking(
        &mut self,
        tracking_number: &str,
    ) -> Result<Option<Shipment>> {
        fetch_shipment_by_tracking(&mut self.tx, tracking_number, true).await
    }

    async fn update_shipment_status(&mut self, shipment: &Shipment) -> Result<()> {
        let result = sqlx::query("UPDATE shipments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(shipment.id.as_uuid())
            .bind(shipment.status.as_str())
            .bind(shipment.updated_at)
            .execute(&mut *self.tx)
            .await?;
        ensure_updated(result.rows_affected(), "shipment", shipment.id)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn lock_clause(lock: bool) -> &'static str {
    if lock { " FOR UPDATE" } else { "" }
}

async fn fetch_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    lock: bool,
) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
        lock_clause(lock)
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let item_rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, quantity, price_at_purchase_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let items = item_rows
        .into_iter()
        .map(|row| -> Result<OrderItem> {
            Ok(OrderItem {
                id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
                order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                quantity: from_int("order_items", row.try_get("quantity")?)?,
                price_at_purchase: Money::from_cents(row.try_get("price_at_purchase_cents")?),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let status: OrderStatus = parse("orders", row.try_get("status")?)?;

    Ok(Some(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
        customer_id: UserId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        seller_id: SellerId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        shipping_address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("shipping_address_id")?),
        billing_address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("billing_address_id")?),
        status,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn fetch_payment_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    lock: bool,
) -> Result<Option<Payment>> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1{}",
        lock_clause(lock)
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(row_to_payment).transpose()
}

async fn fetch_product(
    conn: &mut PgConnection,
    product_id: &ProductId,
    lock: bool,
) -> Result<Option<Product>> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{}",
        lock_clause(lock)
    ))
    .bind(product_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: from_int("products", row.try_get("stock")?)?,
            seller_id: row
                .try_get::<Option<Uuid>, _>("seller_id")?
                .map(SellerId::from_uuid),
            weight_grams: from_int("products", row.try_get("weight_grams")?)?,
            dimensions: Dimensions {
                length_cm: from_int("products", row.try_get("length_cm")?)?,
                width_cm: from_int("products", row.try_get("width_cm")?)?,
                height_cm: from_int("products", row.try_get("height_cm")?)?,
            },
        })
    })
    .transpose()
}

async fn fetch_shipment_by_tracking(
    conn: &mut PgConnection,
    tracking_number: &str,
    lock: bool,
) -> Result<Option<Shipment>> {
    let row = sqlx::query(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE tracking_number = $1 \
         ORDER BY created_at DESC LIMIT 1{}",
        lock_clause(lock)
    ))
    .bind(tracking_number)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(row_to_shipment).transpose()
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    let method: Option<String> = row.try_get("method")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        method: method.map(|m| parse("payments", m)).transpose()?,
        status: parse("payments", row.try_get("status")?)?,
        amount: Money::from_cents(row.try_get("amount_cents")?),
        gateway_transaction_id: row.try_get("gateway_transaction_id")?,
        refund_transaction_id: row.try_get("refund_transaction_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_shipment(row: PgRow) -> Result<Shipment> {
    Ok(Shipment {
        id: ShipmentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        carrier: row.try_get("carrier")?,
        tracking_number: row.try_get("tracking_number")?,
        label_url: row.try_get("label_url")?,
        status: parse("shipments", row.try_get("status")?)?,
        logistics_provider: row.try_get("logistics_provider")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Decodes an address whose columns carry `prefix`.
fn row_to_address(row: &PgRow, prefix: &str) -> Result<Address> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(Address {
        id: AddressId::from_uuid(row.try_get::<Uuid, _>(col("id").as_str())?),
        owner_id: row
            .try_get::<Option<Uuid>, _>(col("owner_id").as_str())?
            .map(UserId::from_uuid),
        name: row.try_get(col("name").as_str())?,
        line1: row.try_get(col("line1").as_str())?,
        line2: row.try_get(col("line2").as_str())?,
        city: row.try_get(col("city").as_str())?,
        region: row.try_get(col("region").as_str())?,
        postal_code: row.try_get(col("postal_code").as_str())?,
        country: row.try_get(col("country").as_str())?,
        phone: row.try_get(col("phone").as_str())?,
    })
}

fn parse<T>(table: &'static str, value: String) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| StoreError::Corrupt {
        table,
        reason: e.to_string(),
    })
}

fn from_int(table: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        table,
        reason: format!("negative count {value}"),
    })
}

fn to_int(table: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt {
        table,
        reason: format!("count {value} out of range"),
    })
}

fn ensure_updated(rows_affected: u64, entity: &'static str, id: impl ToString) -> Result<()> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn unique_violation(
    error: sqlx::Error,
    constraint: &str,
    entity: &'static str,
    key: impl FnOnce() -> String,
) -> StoreError {
    // Check if this is the named unique constraint
    if let sqlx::Error::Database(ref db_err) = error
        && db_err.constraint() == Some(constraint)
    {
        let key = key();
        tracing::warn!(constraint, entity, %key, "unique constraint rejected write");
        return StoreError::Duplicate { entity, key };
    }
    StoreError::Database(error)
}

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AddressId, OrderId, PaymentId, SellerId, ShipmentId, UserId};
use domain::{
    Address, Customer, Order, OrderDetails, Payment, Product, ProductId, Seller, Shipment,
    StatusChange,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{Store, Transaction},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    customers: HashMap<UserId, Customer>,
    addresses: HashMap<AddressId, Address>,
    sellers: HashMap<SellerId, Seller>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    shipments: HashMap<ShipmentId, Shipment>,
    history: Vec<StatusChange>,
}

impl Tables {
    fn payment_for_order(&self, order_id: OrderId) -> Option<&Payment> {
        self.payments.values().find(|p| p.order_id == order_id)
    }

    fn shipment_by_tracking(&self, tracking_number: &str) -> Option<&Shipment> {
        self.shipments
            .values()
            .filter(|s| s.tracking_number == tracking_number)
            .max_by_key(|s| s.created_at)
    }

    fn order_details(&self, order_id: OrderId) -> Option<OrderDetails> {
        let order = self.orders.get(&order_id)?.clone();
        let payment = self.payment_for_order(order_id).cloned();
        let mut shipments: Vec<Shipment> = self
            .shipments
            .values()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect();
        shipments.sort_by_key(|s| s.created_at);

        Some(OrderDetails {
            order,
            payment,
            shipments,
        })
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Transactions are fully serialized: [`Store::begin`] takes a single async
/// mutex and works on a staged copy of the tables that replaces the live
/// tables on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer.
    pub async fn add_customer(&self, customer: Customer) {
        self.tables
            .lock()
            .await
            .customers
            .insert(customer.id, customer);
    }

    /// Registers an address.
    pub async fn add_address(&self, address: Address) {
        self.tables.lock().await.addresses.insert(address.id, address);
    }

    /// Registers a seller.
    pub async fn add_seller(&self, seller: Seller) {
        self.tables.lock().await.sellers.insert(seller.id, seller);
    }

    /// Registers or replaces a product.
    pub async fn add_product(&self, product: Product) {
        self.tables
            .lock()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Makes every subsequent commit fail with a database error.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        })
    }

    async fn order_details(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        Ok(self.tables.lock().await.order_details(order_id))
    }

    async fn order_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .history
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.lock().await.payments.get(&payment_id).cloned())
    }

    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(product_id).cloned())
    }

    async fn shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        Ok(self
            .tables
            .lock()
            .await
            .shipment_by_tracking(tracking_number)
            .cloned())
    }
}

/// Transaction over [`InMemoryStore`].
///
/// Holds the store mutex for its whole lifetime, so every lock is implied.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_on_commit: bool,
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_customer(&mut self, customer_id: UserId) -> Result<Option<Customer>> {
        Ok(self.staged.customers.get(&customer_id).cloned())
    }

    async fn find_address(
        &mut self,
        address_id: AddressId,
        owner_id: UserId,
    ) -> Result<Option<Address>> {
        Ok(self
            .staged
            .addresses
            .get(&address_id)
            .filter(|a| a.owner_id == Some(owner_id))
            .cloned())
    }

    async fn find_seller(&mut self, seller_id: SellerId) -> Result<Option<Seller>> {
        Ok(self.staged.sellers.get(&seller_id).cloned())
    }

    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.staged.products.get(product_id).cloned())
    }

    async fn update_product_stock(&mut self, product_id: &ProductId, stock: u32) -> Result<()> {
        let product = self
            .staged
            .products
            .get_mut(product_id)
            .ok_or_else(|| not_found("product", product_id))?;
        product.stock = stock;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self
            .staged
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Duplicate {
                entity: "order number",
                key: order.order_number.to_string(),
            });
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<()> {
        let stored = self
            .staged
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| not_found("order", order.id))?;
        stored.status = order.status;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn record_status_change(&mut self, change: &StatusChange) -> Result<()> {
        self.staged.history.push(change.clone());
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self.staged.payment_for_order(payment.order_id).is_some() {
            return Err(StoreError::Duplicate {
                entity: "payment for order",
                key: payment.order_id.to_string(),
            });
        }
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.staged.payments.get(&payment_id).cloned())
    }

    async fn lock_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.staged.payment_for_order(order_id).cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let stored = self
            .staged
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| not_found("payment", payment.id))?;
        *stored = payment.clone();
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()> {
        if self.staged.shipments.values().any(|s| {
            s.carrier == shipment.carrier && s.tracking_number == shipment.tracking_number
        }) {
            return Err(StoreError::Duplicate {
                entity: "tracking number",
                key: format!("{}/{}", shipment.carrier, shipment.tracking_number),
            });
        }
        self.staged.shipments.insert(shipment.id, shipment.clone());
        Ok(())
    }

    async fn lock_shipment_by_tracking(
        &mut self,
        tracking_number: &str,
    ) -> Result<Option<Shipment>> {
        Ok(self.staged.shipment_by_tracking(tracking_number).cloned())
    }

    async fn update_shipment_status(&mut self, shipment: &Shipment) -> Result<()> {
        let stored = self
            .staged
            .shipments
            .get_mut(&shipment.id)
            .ok_or_else(|| not_found("shipment", shipment.id))?;
        stored.status = shipment.status;
        stored.updated_at = shipment.updated_at;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTransaction {
            mut guard,
            staged,
            fail_on_commit,
        } = self;
        if fail_on_commit {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        *guard = staged;
        Ok(())
    }
}

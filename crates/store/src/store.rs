use async_trait::async_trait;
use common::{AddressId, OrderId, PaymentId, SellerId, UserId};
use domain::{
    Address, Customer, Order, OrderDetails, Payment, Product, ProductId, Seller, Shipment,
    StatusChange,
};

use crate::Result;

/// Core trait for store implementations.
///
/// Reads on the store itself take no locks and serve queries. Every write
/// goes through a [`Transaction`] obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by [`Store::begin`].
    type Tx: Transaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads an order with its payment and shipments.
    async fn order_details(&self, order_id: OrderId) -> Result<Option<OrderDetails>>;

    /// Returns the status audit trail of an order, oldest first.
    async fn order_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>>;

    /// Loads a payment by id.
    async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Loads a product by id.
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Loads the most recent shipment carrying the tracking number.
    async fn shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>>;
}

/// A unit of work against the store.
///
/// `lock_*` methods take a row lock held until commit or drop. Callers lock
/// in a fixed order (order, payment, shipment, products sorted by id) so
/// concurrent transactions cannot deadlock.
#[async_trait]
pub trait Transaction: Send {
    /// Looks up a customer.
    async fn find_customer(&mut self, customer_id: UserId) -> Result<Option<Customer>>;

    /// Looks up an address, returning it only if `owner_id` owns it.
    async fn find_address(
        &mut self,
        address_id: AddressId,
        owner_id: UserId,
    ) -> Result<Option<Address>>;

    /// Looks up a seller with its warehouse address.
    async fn find_seller(&mut self, seller_id: SellerId) -> Result<Option<Seller>>;

    /// Locks and loads a product.
    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Overwrites a product's stock count.
    async fn update_product_stock(&mut self, product_id: &ProductId, stock: u32) -> Result<()>;

    /// Inserts an order together with its items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Locks and loads an order with its items.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Persists an order's status and `updated_at`.
    async fn update_order_status(&mut self, order: &Order) -> Result<()>;

    /// Appends to the order status audit trail.
    async fn record_status_change(&mut self, change: &StatusChange) -> Result<()>;

    /// Inserts a payment.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Locks and loads a payment.
    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Locks and loads the payment owned by an order.
    async fn lock_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Persists every mutable payment column.
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Inserts a shipment.
    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()>;

    /// Locks and loads the most recent shipment carrying the tracking number.
    async fn lock_shipment_by_tracking(&mut self, tracking_number: &str)
    -> Result<Option<Shipment>>;

    /// Persists a shipment's status and `updated_at`.
    async fn update_shipment_status(&mut self, shipment: &Shipment) -> Result<()>;

    /// Commits every write made in this transaction.
    async fn commit(self) -> Result<()>;
}

/// Extension trait providing convenience methods for transactions.
#[async_trait]
pub trait TransactionExt: Transaction {
    /// Persists an order status change and its audit entry.
    async fn save_status_change(&mut self, order: &Order, change: &StatusChange) -> Result<()> {
        self.update_order_status(order).await?;
        self.record_status_change(change).await
    }
}

// Blanket implementation for all Transaction implementations
impl<T: Transaction> TransactionExt for T {}

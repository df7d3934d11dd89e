//! Order aggregate root.

use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, OrderItemId, SellerId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::payment::Payment;
use crate::shipment::Shipment;

use super::{Money, OrderNumber, OrderStatus, ProductId};

/// One line of an order.
///
/// The unit price is snapshotted at placement and never recomputed from the
/// live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

impl OrderItem {
    /// Creates a new line, rejecting a zero quantity.
    pub fn new(
        order_id: OrderId,
        product_id: impl Into<ProductId>,
        quantity: u32,
        price_at_purchase: Money,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }

        Ok(Self {
            id: OrderItemId::new(),
            order_id,
            product_id: product_id.into(),
            quantity,
            price_at_purchase,
        })
    }

    /// Returns the total price for this line (quantity * price_at_purchase).
    pub fn line_total(&self) -> Money {
        self.price_at_purchase.multiply(self.quantity)
    }
}

/// One recorded move of an order between two statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

/// A single purchase transaction against one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: UserId,
    pub seller_id: SellerId,
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order whose total is the sum of its lines.
    pub fn new(
        id: OrderId,
        customer_id: UserId,
        seller_id: SellerId,
        shipping_address_id: AddressId,
        billing_address_id: AddressId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Self {
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            id,
            order_number: OrderNumber::generate(id, now),
            customer_id,
            seller_id,
            shipping_address_id,
            billing_address_id,
            status: OrderStatus::Pending,
            total_amount,
            items,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recomputes the total from the snapshotted line prices.
    pub fn computed_total(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Moves to `next` if the transition table allows it.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        self.status.transition_to(next)?;
        Ok(self.record(next, reason.into(), now))
    }

    /// Moves to `next` without consulting the transition table.
    ///
    /// Used by reconciliation paths that follow an external system's
    /// authoritative signal. Returns `None` when the status is unchanged.
    pub fn force_status(
        &mut self,
        next: OrderStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<StatusChange> {
        if self.status == next {
            return None;
        }
        Some(self.record(next, reason.into(), now))
    }

    fn record(&mut self, next: OrderStatus, reason: String, now: DateTime<Utc>) -> StatusChange {
        let change = StatusChange {
            order_id: self.id,
            from: self.status,
            to: next,
            reason,
            changed_at: now,
        };
        self.status = next;
        self.updated_at = now;
        change
    }
}

/// The fully materialized view of an order returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub payment: Option<Payment>,
    pub shipments: Vec<Shipment>,
}

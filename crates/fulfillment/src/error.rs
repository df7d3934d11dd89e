//! Fulfillment error types.

use common::{AddressId, OrderId, UserId};
use domain::{DomainError, OrderStatus, PaymentMethod, PaymentStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Broad class of a [`FulfillmentError`], used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Unauthorized,
    ExternalGateway,
    WebhookVerification,
    Internal,
}

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(UserId),

    #[error("Address not found: {0}")]
    AddressNotFound(AddressId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Carries the payment id, or the owning order for order-scoped lookups.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Shipment not found for tracking number: {0}")]
    ShipmentNotFound(String),

    /// Requested quantity exceeds the live stock count.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Items in one order belong to different sellers.
    #[error("All items in an order must come from the same seller (product {product_id})")]
    MultiSellerOrder { product_id: ProductId },

    #[error("Invalid quantity for product {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    #[error("Access to order {0} denied")]
    UnauthorizedAccess(OrderId),

    #[error("This operation requires the administrator role")]
    AdminRequired,

    #[error("Order cannot be cancelled in status {status}")]
    OrderCancellation { status: OrderStatus },

    #[error("Invalid order status transition: cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment is not in PENDING state (current: {status})")]
    PaymentNotPending { status: PaymentStatus },

    /// A payment gateway call failed or timed out.
    #[error("Payment failed: {0}")]
    Payment(String),

    /// The payment does not qualify for a refund.
    #[error("Refund not allowed: {0}")]
    RefundNotAllowed(String),

    /// A refund call to the gateway failed or timed out.
    #[error("Refund failed: {0}")]
    Refund(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    /// Order data required for shipping is missing.
    #[error("Order is not ready to ship: {0}")]
    ShipmentNotReady(String),

    /// The carrier call failed or timed out.
    #[error("Shipment creation failed: {0}")]
    ShipmentCreation(String),

    #[error("No payment gateway configured for {0}")]
    GatewayNotConfigured(PaymentMethod),

    /// A domain rule other than an order transition was violated.
    #[error("{0}")]
    Domain(DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidOrderTransition { from, to } => {
                FulfillmentError::InvalidStatusTransition { from, to }
            }
            other => FulfillmentError::Domain(other),
        }
    }
}

impl FulfillmentError {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::CustomerNotFound(_)
            | FulfillmentError::AddressNotFound(_)
            | FulfillmentError::ProductNotFound(_)
            | FulfillmentError::OrderNotFound(_)
            | FulfillmentError::PaymentNotFound(_)
            | FulfillmentError::ShipmentNotFound(_) => ErrorKind::NotFound,

            FulfillmentError::InsufficientStock { .. }
            | FulfillmentError::MultiSellerOrder { .. }
            | FulfillmentError::InvalidQuantity { .. }
            | FulfillmentError::EmptyOrder
            | FulfillmentError::OrderCreation(_)
            | FulfillmentError::OrderCancellation { .. }
            | FulfillmentError::InvalidStatusTransition { .. }
            | FulfillmentError::PaymentNotPending { .. }
            | FulfillmentError::RefundNotAllowed(_)
            | FulfillmentError::ShipmentNotReady(_)
            | FulfillmentError::GatewayNotConfigured(_)
            | FulfillmentError::Domain(_) => ErrorKind::Validation,

            FulfillmentError::UnauthorizedAccess(_) | FulfillmentError::AdminRequired => {
                ErrorKind::Unauthorized
            }

            FulfillmentError::Payment(_)
            | FulfillmentError::Refund(_)
            | FulfillmentError::ShipmentCreation(_) => ErrorKind::ExternalGateway,

            FulfillmentError::WebhookVerification(_) => ErrorKind::WebhookVerification,

            FulfillmentError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

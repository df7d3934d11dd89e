//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;

/// Errors raised by domain records and their state machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The order status table does not allow this move.
    #[error("Invalid order status transition: cannot move from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    /// The payment status table does not allow this move.
    #[error("Invalid payment status transition: cannot move from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// An enum value read from storage or a request was not recognized.
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// Order line quantity must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}

//! Payment record and its state machine.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::Money;

/// Supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Stripe,
    #[serde(rename = "PAYPAL")]
    PayPal,
}

impl PaymentMethod {
    /// Every method the system can be configured with.
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Stripe, PaymentMethod::PayPal];

    /// Returns the method name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "STRIPE",
            PaymentMethod::PayPal => "PAYPAL",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRIPE" => Ok(PaymentMethod::Stripe),
            "PAYPAL" => Ok(PaymentMethod::PayPal),
            _ => Err(DomainError::UnknownValue {
                kind: "payment method",
                value: s.to_string(),
            }),
        }
    }
}

/// The status of a payment.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success ──► Refunded
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created with the order, awaiting the gateway.
    #[default]
    Pending,

    /// Funds captured (terminal for webhooks, may still be refunded).
    Success,

    /// Gateway reported a failure (terminal state).
    Failed,

    /// Funds returned to the customer.
    Refunded,
}

impl PaymentStatus {
    /// Returns true if this status is settled by a gateway webhook.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Returns true if the transition table allows moving to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Success | PaymentStatus::Failed
            ) | (PaymentStatus::Success, PaymentStatus::Refunded)
        )
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            _ => Err(DomainError::UnknownValue {
                kind: "payment status",
                value: s.to_string(),
            }),
        }
    }
}

/// The financial record of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    /// Chosen at initiation; unset while the customer has not picked a gateway.
    pub method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    /// Always equal to the order total.
    pub amount: Money,
    pub gateway_transaction_id: Option<String>,
    pub refund_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates the pending payment that accompanies a new order.
    pub fn pending(order_id: OrderId, amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            method: None,
            status: PaymentStatus::Pending,
            amount,
            gateway_transaction_id: None,
            refund_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks a captured payment as refunded.
    pub fn mark_refunded(
        &mut self,
        refund_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(DomainError::InvalidPaymentTransition {
                from: self.status,
                to: PaymentStatus::Refunded,
            });
        }
        self.status = PaymentStatus::Refunded;
        self.refund_transaction_id = Some(refund_id.into());
        self.updated_at = now;
        Ok(())
    }
}

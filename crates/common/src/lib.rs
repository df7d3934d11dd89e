//! Shared types for the order fulfillment system.
//!
//! Identifiers are UUID newtypes so an order id can never be passed where a
//! payment id is expected. [`Requester`] carries the caller identity used by
//! ownership checks.

pub mod access;
pub mod types;

pub use access::{Requester, Role, RoleParseError};
pub use types::{AddressId, OrderId, OrderItemId, PaymentId, SellerId, ShipmentId, UserId};

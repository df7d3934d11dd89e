//! Domain layer for the order fulfillment system.
//!
//! This crate provides the data model shared by the store and the
//! fulfillment core:
//! - Order, OrderItem and the order status state machine
//! - Payment with its method and status state machine
//! - Shipment, carrier-facing parcel data and shipment status
//! - Catalog and directory records (products, sellers, customers, addresses)

pub mod catalog;
pub mod error;
pub mod order;
pub mod payment;
pub mod shipment;

pub use catalog::{Address, Customer, Dimensions, Product, Seller};
pub use error::DomainError;
pub use order::{
    Money, Order, OrderDetails, OrderItem, OrderNumber, OrderStatus, ProductId, StatusChange,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use shipment::{Parcel, Shipment, ShipmentStatus};

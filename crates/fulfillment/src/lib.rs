//! Order lifecycle and payment/shipment reconciliation engine.
//!
//! [`OrderEngine`] places and cancels orders, [`PaymentReconciler`] drives
//! payments through their gateways, and [`ShipmentReconciler`] books
//! shipments and ingests carrier updates. All three share one [`store::Store`].

pub mod carrier;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod payments;
pub mod settings;
pub mod shipments;

pub use carrier::{Carrier, CarrierError, CarrierShipment, SandboxCarrier, normalize_status};
pub use engine::{Cancellation, NewOrder, OrderEngine, OrderLine, RefundOutcome};
pub use error::{ErrorKind, FulfillmentError, Result};
pub use gateway::{
    GatewayCredentials, GatewayError, GatewayEvent, GatewayEventKind, GatewayRegistry,
    IntentMetadata, PayPalGateway, PaymentGateway, PaymentIntent, RefundReceipt, SandboxBackend,
    StripeGateway, WebhookHeaders,
};
pub use inventory::InventoryLedger;
pub use payments::{PaymentInitiation, PaymentReconciler, WebhookOutcome};
pub use settings::Settings;
pub use shipments::{CARRIER_SIGNATURE_HEADER, ShipmentReconciler, ShipmentUpdate};

//! Shipment record, status and parcel data.

use chrono::{DateTime, Utc};
use common::{OrderId, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::error::DomainError;

/// Status of a shipment as tracked by the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Processing,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    FailedDelivery,
    Returned,
}

impl ShipmentStatus {
    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Processing => "PROCESSING",
            ShipmentStatus::PickedUp => "PICKED_UP",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::FailedDelivery => "FAILED_DELIVERY",
            ShipmentStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = DomainError;

    /// Strict parse of a stored status name. Carrier input goes through the
    /// lenient normalizer in the fulfillment crate instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(ShipmentStatus::Processing),
            "PICKED_UP" => Ok(ShipmentStatus::PickedUp),
            "IN_TRANSIT" => Ok(ShipmentStatus::InTransit),
            "OUT_FOR_DELIVERY" => Ok(ShipmentStatus::OutForDelivery),
            "DELIVERED" => Ok(ShipmentStatus::Delivered),
            "FAILED_DELIVERY" => Ok(ShipmentStatus::FailedDelivery),
            "RETURNED" => Ok(ShipmentStatus::Returned),
            _ => Err(DomainError::UnknownValue {
                kind: "shipment status",
                value: s.to_string(),
            }),
        }
    }
}

/// One fulfillment attempt for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub carrier: String,
    /// Unique per carrier.
    pub tracking_number: String,
    pub label_url: Option<String>,
    pub status: ShipmentStatus,
    pub logistics_provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Physical package handed to a carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parcel {
    pub weight_grams: u32,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

impl Parcel {
    /// Packs order lines into one parcel.
    ///
    /// Weight and height accumulate per unit (units are stacked), length and
    /// width take the largest footprint among the products.
    pub fn for_lines<'a>(lines: impl IntoIterator<Item = (&'a Product, u32)>) -> Self {
        lines
            .into_iter()
            .fold(Parcel::default(), |parcel, (product, quantity)| Parcel {
                weight_grams: parcel.weight_grams + product.weight_grams * quantity,
                length_cm: parcel.length_cm.max(product.dimensions.length_cm),
                width_cm: parcel.width_cm.max(product.dimensions.width_cm),
                height_cm: parcel.height_cm + product.dimensions.height_cm * quantity,
            })
    }
}

//! Carrier contract, status normalization and a sandbox carrier.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Address, Parcel, ShipmentStatus};
use thiserror::Error;

/// Errors raised by carrier adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarrierError {
    #[error("Carrier rejected the shipment: {0}")]
    Rejected(String),

    #[error("Carrier unavailable: {0}")]
    Unavailable(String),
}

/// A shipment booked with a carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierShipment {
    pub tracking_number: String,
    pub label_url: Option<String>,
    /// Carrier's own status string, normalized by the caller.
    pub initial_status: String,
}

/// Contract every carrier adapter fulfils.
#[async_trait]
pub trait Carrier: Send + Sync {
    /// Name of the logistics provider recorded on shipments.
    fn provider(&self) -> &str;

    /// Books a shipment from `from` to `to`.
    async fn create_shipment(
        &self,
        from: &Address,
        to: &Address,
        parcel: &Parcel,
        carrier_name: &str,
    ) -> Result<CarrierShipment, CarrierError>;
}

/// Maps a carrier status string onto [`ShipmentStatus`].
///
/// Matching ignores case and any non-alphanumeric characters. Unknown
/// strings fall back to [`ShipmentStatus::InTransit`].
pub fn normalize_status(raw: &str) -> ShipmentStatus {
    let key: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match key.as_str() {
        "processing" | "pretransit" | "labelcreated" => ShipmentStatus::Processing,
        "intransit" => ShipmentStatus::InTransit,
        "pickup" | "pickedup" => ShipmentStatus::PickedUp,
        "outfordelivery" => ShipmentStatus::OutForDelivery,
        "delivered" => ShipmentStatus::Delivered,
        "failure" | "deliveryfailed" | "faileddelivery" => ShipmentStatus::FailedDelivery,
        "returned" | "returntosender" => ShipmentStatus::Returned,
        _ => {
            tracing::warn!(status = raw, "unknown carrier status, treating as IN_TRANSIT");
            ShipmentStatus::InTransit
        }
    }
}

#[derive(Debug, Clone)]
struct BookedShipment {
    tracking_number: String,
    carrier_name: String,
    parcel: Parcel,
    from_postal_code: String,
    to_postal_code: String,
}

#[derive(Debug, Default)]
struct SandboxCarrierState {
    booked: Vec<BookedShipment>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-process carrier issuing sequential tracking numbers.
#[derive(Debug, Clone, Default)]
pub struct SandboxCarrier {
    state: Arc<RwLock<SandboxCarrierState>>,
}

impl SandboxCarrier {
    /// Creates a new sandbox carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the carrier to fail on the next create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of shipments booked.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().booked.len()
    }

    /// Returns the parcel booked under a tracking number.
    pub fn parcel_for(&self, tracking_number: &str) -> Option<Parcel> {
        self.state
            .read()
            .unwrap()
            .booked
            .iter()
            .find(|b| b.tracking_number == tracking_number)
            .map(|b| b.parcel)
    }

    /// Returns the (from, to) postal codes and carrier of a booking.
    pub fn route_for(&self, tracking_number: &str) -> Option<(String, String, String)> {
        self.state
            .read()
            .unwrap()
            .booked
            .iter()
            .find(|b| b.tracking_number == tracking_number)
            .map(|b| {
                (
                    b.from_postal_code.clone(),
                    b.to_postal_code.clone(),
                    b.carrier_name.clone(),
                )
            })
    }
}

#[async_trait]
impl Carrier for SandboxCarrier {
    fn provider(&self) -> &str {
        "sandbox"
    }

    async fn create_shipment(
        &self,
        from: &Address,
        to: &Address,
        parcel: &Parcel,
        carrier_name: &str,
    ) -> Result<CarrierShipment, CarrierError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(CarrierError::Unavailable("Carrier API timeout".to_string()));
        }
        if parcel.weight_grams == 0 {
            return Err(CarrierError::Rejected("Parcel weight must be positive".to_string()));
        }

        state.next_id += 1;
        let tracking_number = format!("TRACK-{:06}", state.next_id);
        state.booked.push(BookedShipment {
            tracking_number: tracking_number.clone(),
            carrier_name: carrier_name.to_string(),
            parcel: *parcel,
            from_postal_code: from.postal_code.clone(),
            to_postal_code: to.postal_code.clone(),
        });

        Ok(CarrierShipment {
            label_url: Some(format!(
                "https://labels.sandbox.invalid/{tracking_number}.pdf"
            )),
            tracking_number,
            initial_status: "PRE_TRANSIT".to_string(),
        })
    }
}

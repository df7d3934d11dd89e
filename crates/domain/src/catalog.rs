//! Catalog and directory records owned by neighbouring services.
//!
//! The core only reads these, except for product stock which it reserves
//! and releases.

use common::{AddressId, SellerId, UserId};
use serde::{Deserialize, Serialize};

use crate::order::{Money, ProductId};

/// Package dimensions in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

/// A sellable product with its live stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    /// Products without a seller cannot be ordered.
    pub seller_id: Option<SellerId>,
    pub weight_grams: u32,
    pub dimensions: Dimensions,
}

/// A postal address from the customer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    /// Customer owning the address; `None` for seller warehouses.
    pub owner_id: Option<UserId>,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// A marketplace seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    pub name: String,
    /// Ship-from address; required before the seller's orders can ship.
    pub warehouse_address: Option<Address>,
}

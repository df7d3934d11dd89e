//! Stock reservation against the product catalog.

use std::collections::BTreeMap;

use domain::{OrderItem, Product, ProductId};
use store::Transaction;

use crate::error::{FulfillmentError, Result};

/// Reserves and releases product stock inside a caller's transaction.
///
/// Reservation is an immediate decrement; there is no separate hold phase.
/// Both operations lock the product row, so concurrent reservations of the
/// same product are serialized by the store.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Decrements stock by `quantity`, returning the product as locked.
    pub async fn reserve<T: Transaction>(
        tx: &mut T,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Product> {
        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;

        if product.stock < quantity {
            return Err(FulfillmentError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: product.stock,
            });
        }

        product.stock -= quantity;
        tx.update_product_stock(product_id, product.stock).await?;
        Ok(product)
    }

    /// Adds `quantity` back to stock.
    pub async fn release<T: Transaction>(
        tx: &mut T,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;

        let stock = product.stock.saturating_add(quantity);
        tx.update_product_stock(product_id, stock).await?;
        Ok(stock)
    }

    /// Releases every line of an order, locking products in id order.
    pub async fn release_items<T: Transaction>(tx: &mut T, items: &[OrderItem]) -> Result<()> {
        let mut totals: BTreeMap<&ProductId, u32> = BTreeMap::new();
        for item in items {
            *totals.entry(&item.product_id).or_default() += item.quantity;
        }

        for (product_id, quantity) in totals {
            let stock = Self::release(tx, product_id, quantity).await?;
            tracing::debug!(%product_id, quantity, stock, "stock released");
        }
        Ok(())
    }
}

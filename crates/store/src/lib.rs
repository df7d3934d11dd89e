//! Transactional persistence for the fulfillment core.
//!
//! Every mutating core operation opens one [`Transaction`], locks the rows
//! it touches and commits once. Dropping a transaction without committing
//! discards its writes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{Store, Transaction, TransactionExt};

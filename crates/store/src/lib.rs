//! Record persistence for newswire.
//!
//! This crate provides:
//! - `RecordStore` / `RecordTx` traits consumed by the sync engine
//! - `MemoryStore` for single-node runs and tests
//! - `PgStore` backed by PostgreSQL via sqlx

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{RecordStore, RecordTx};

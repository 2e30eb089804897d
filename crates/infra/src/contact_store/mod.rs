//! Contact storage boundary.
//!
//! This module defines the storage abstraction one resolution runs against,
//! without making engine assumptions: a transactional handle exposing the
//! lookups and writes the resolver needs, with an in-memory backend for
//! tests/dev and a Postgres backend for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryContactStore;
pub use postgres::PostgresContactStore;
pub use r#trait::{ContactStore, ContactTx, StoreError};

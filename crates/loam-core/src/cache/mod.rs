//! Persistent local store: durable cache and pending queue
//!
//! Survives process restarts. Mutated only through the document sync
//! store's API; no other component writes here directly.

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::LocalCache;

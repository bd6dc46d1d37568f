//! rollcall-store — Durable identity store.
//!
//! One SQLite database holds every enrolled identity and its reference
//! embeddings. The store is the single source of truth for matching:
//! the engine reads from it per call and keeps no state of its own.

mod store;

pub use store::{IdentityStore, StoreError};

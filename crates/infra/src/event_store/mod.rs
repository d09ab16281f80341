//! Append-only event store boundary.
//!
//! The ledger's durable state is its event stream; everything else is rebuilt
//! from it. This module defines the storage seam and an in-memory backend.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

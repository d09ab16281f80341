//! Infrastructure layer: event store, command pipeline, ledger service, config.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod service;


pub use command_dispatcher::{CommandDispatcher, Committed, DispatchError};
pub use config::LedgerConfig;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use service::{LedgerService, MintRate, ServiceError};

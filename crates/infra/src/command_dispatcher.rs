//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Effect hook (optional external side effect, may veto the commit)
//!   ↓
//! 5. Append (single batch, optimistic concurrency on the loaded version)
//!   ↓
//! 6. Publish committed envelopes to the bus
//! ```
//!
//! Nothing is appended unless every earlier step succeeded, so a rejected
//! command or a vetoing effect leaves the stream untouched. Publication happens
//! strictly after the append; a publish failure is reported but the events stay
//! committed (at-least-once delivery).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use accrual_core::{Aggregate, AggregateId, ExpectedVersion};
use accrual_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The aggregate rejected the command.
    #[error("{0}")]
    Domain(E),

    /// The stream moved between load and append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl<E> From<EventStoreError> for DispatchError<E> {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl<E> DispatchError<E> {
    /// The domain rejection, if that is what this is.
    pub fn domain(&self) -> Option<&E> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Events decided by the aggregate together with their stored form.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<E> {
    pub events: Vec<E>,
    pub stored: Vec<StoredEvent>,
}

impl<E> Committed<E> {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            stored: Vec::new(),
        }
    }

    /// Stream version after the commit, if anything was appended.
    pub fn version(&self) -> Option<u64> {
        self.stored.last().map(StoredEvent::stream_version)
    }
}

/// Reusable command execution engine: composes an `EventStore` and an
/// `EventBus`, contains no IO of its own.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rebuild an aggregate from its full stream.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.rehydrate(aggregate_id, make_aggregate)
            .map(|(aggregate, _)| aggregate)
    }

    /// Run a command through the full pipeline without an external effect.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Committed<A::Event>, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: accrual_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_with(aggregate_id, aggregate_type, command, make_aggregate, |_| Ok(()))
    }

    /// Run a command, calling `effect` with the decided events before they are
    /// appended. If `effect` fails nothing is appended and its error is returned.
    pub fn dispatch_with<A, X>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
        effect: impl FnOnce(&[A::Event]) -> Result<(), X>,
    ) -> Result<Committed<A::Event>, X>
    where
        A: Aggregate,
        A::Event: accrual_events::Event + Serialize + DeserializeOwned,
        X: From<DispatchError<A::Error>>,
    {
        let (aggregate, version) = self.rehydrate(aggregate_id, make_aggregate)?;

        let decided = aggregate
            .handle(&command)
            .map_err(DispatchError::Domain)?;
        if decided.is_empty() {
            return Ok(Committed::empty());
        }

        effect(&decided)?;

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DispatchError::<A::Error>::from)?;

        let stored = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(version))
            .map_err(DispatchError::<A::Error>::from)?;

        for e in &stored {
            self.bus
                .publish(e.to_envelope())
                .map_err(|err| DispatchError::<A::Error>::Publish(format!("{err:?}")))?;
        }

        Ok(Committed {
            events: decided,
            stored,
        })
    }

    fn rehydrate<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, u64), DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        for stored in &history {
            let ev: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            aggregate.apply(&ev);
        }

        Ok((aggregate, stream_version(&history)))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Reject streams a backend should never return: foreign events or
/// non-monotonic sequence numbers.
fn validate_loaded_stream<E>(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError<E>> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

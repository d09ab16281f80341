use chrono::{DateTime, Utc};

/// A recorded fact about the ledger.
///
/// Events are immutable, versioned for schema evolution, and append-only.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable type identifier (e.g. "ledger.minted").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Ledger time at which the event took effect.
    fn occurred_at(&self) -> DateTime<Utc>;
}

//! Value object trait: equality by value, not identity.

/// Marker trait for immutable values compared by their attributes
/// (rates, token metadata). Holders, by contrast, are identified by `HolderId`.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

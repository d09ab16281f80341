//! `accrual-core` — domain foundation building blocks.
//!
//! Identifiers, aggregate traits, the shared domain error type and the clock
//! abstraction. No infrastructure concerns live here.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, HolderId, LedgerId};
pub use value_object::ValueObject;

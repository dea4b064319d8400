//! Fleet GC reconciliation core.
//!
//! [`FleetCollector`] is the broker behind the watch layer: it routes
//! envelopes by event type, deletes Fleets whose TTL has elapsed and links
//! FleetAutoscalers to the Fleets they scale.

#![forbid(unsafe_code)]

mod collector;
mod error;
mod retry;

pub use collector::{FleetCollector, SyncPolicy};
pub use error::{CollectorError, SyncAttemptError};
pub use retry::with_retry;

use std::time::Duration;

use fleetgc_core::{DurationParseError, EventKind, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("timed out waiting for Agones cache to sync: retry failed after {attempts} attempts")]
    CacheSyncTimeout {
        attempts: u32,
        #[source]
        source: SyncAttemptError,
    },
    #[error("fleet {fleet} does not contain the ttl annotation")]
    MissingTtlAnnotation { fleet: String },
    #[error("fleet {fleet} has an invalid ttl {ttl:?}")]
    InvalidTtlFormat {
        fleet: String,
        ttl: String,
        #[source]
        source: DurationParseError,
    },
    #[error("failed to delete fleet {fleet}")]
    DeleteFailed {
        fleet: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to look up fleet {fleet} for FleetAutoscaler {autoscaler}")]
    LookupFailed {
        autoscaler: String,
        fleet: String,
        #[source]
        source: StoreError,
    },
    #[error("fleet {fleet} has no uid, cannot own FleetAutoscaler {autoscaler}")]
    OwnerWithoutUid { autoscaler: String, fleet: String },
    #[error("failed to assign owner ref to FleetAutoscaler {autoscaler}")]
    UpdateFailed {
        autoscaler: String,
        #[source]
        source: StoreError,
    },
    #[error("event {event_type} carries an unexpected payload")]
    PayloadMismatch { event_type: EventKind },
}

impl CollectorError {
    /// Errors that only concern the TTL decision for one object. These end
    /// the reconcile pass and are not surfaced past the dispatcher.
    pub fn is_decision_error(&self) -> bool {
        matches!(
            self,
            CollectorError::MissingTtlAnnotation { .. } | CollectorError::InvalidTtlFormat { .. }
        )
    }
}

/// Failure of a single cache sync attempt.
#[derive(Debug, thiserror::Error)]
pub enum SyncAttemptError {
    #[error("cache did not sync within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

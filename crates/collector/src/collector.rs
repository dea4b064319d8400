use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetgc_core::{
    expiry, namespaced, parse_duration, Broker, Clock, DurationParseError, Envelope, Event, EventKind, Fleet,
    FleetAutoscaler, FleetCache, Message, RemoteStore, StoreError, SystemClock,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use metrics::counter;
use tracing::{debug, error, info};

use crate::error::{CollectorError, SyncAttemptError};
use crate::retry::with_retry;

/// Bounds of the startup cache readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Upper bound of a single wait for the cache.
    pub attempt_timeout: Duration,
    /// Fixed pause before every attempt.
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            interval: Duration::from_secs(5),
            attempts: 5,
        }
    }
}

/// Deletes Fleets whose `octops.io/ttl` has elapsed and makes Fleets the
/// owners of the FleetAutoscalers that target them.
///
/// Calls for different objects may run concurrently. Events for one object
/// are assumed to arrive in order from a single watch stream, so there is no
/// per-object locking here.
pub struct FleetCollector<C, R> {
    cache: C,
    remote: R,
    clock: Arc<dyn Clock>,
    sync_policy: SyncPolicy,
}

impl<C: FleetCache, R: RemoteStore> FleetCollector<C, R> {
    pub fn new(cache: C, remote: R) -> Self {
        Self {
            cache,
            remote,
            clock: Arc::new(SystemClock),
            sync_policy: SyncPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Block until the Fleet cache reports synced. Failing this is fatal for
    /// startup: nothing else can run against an empty cache.
    pub async fn has_synced(&self) -> Result<(), CollectorError> {
        let policy = self.sync_policy;
        let cache = &self.cache;
        with_retry(policy.interval, policy.attempts, move || async move {
            info!("waiting for Agones cache to sync");
            match tokio::time::timeout(policy.attempt_timeout, cache.wait_until_synced()).await {
                Ok(res) => res.map_err(SyncAttemptError::from),
                Err(_) => Err(SyncAttemptError::Timeout(policy.attempt_timeout)),
            }
        })
        .await
        .map_err(|source| CollectorError::CacheSyncTimeout { attempts: policy.attempts.max(1), source })?;
        info!("Agones cache synced");
        Ok(())
    }

    /// Delete `fleet` once `creationTimestamp + ttl` has passed.
    ///
    /// Fleets without the annotation are never touched. A Fleet that is
    /// already gone counts as deleted.
    pub async fn reconcile(&self, fleet: &Fleet) -> Result<(), CollectorError> {
        let fleet_ref = namespaced(fleet);

        let Some(raw) = fleet.ttl() else {
            debug!(fleet = %fleet_ref, "ignoring fleet, ttl annotation is not present");
            return Ok(());
        };
        if raw.trim().is_empty() {
            return Err(CollectorError::MissingTtlAnnotation { fleet: fleet_ref });
        }

        let invalid = |source: DurationParseError| CollectorError::InvalidTtlFormat {
            fleet: fleet_ref.clone(),
            ttl: raw.to_string(),
            source,
        };
        let ttl = parse_duration(raw).map_err(invalid)?;

        let Some(created) = fleet.metadata.creation_timestamp.as_ref().map(|t| t.0) else {
            debug!(fleet = %fleet_ref, "ignoring fleet, creation timestamp is not set");
            return Ok(());
        };
        let expire_at = expiry(created, ttl).ok_or_else(|| invalid(DurationParseError::Overflow(raw.to_string())))?;

        if self.clock.now() < expire_at {
            debug!(
                fleet = %fleet_ref,
                created_at = %created,
                ttl = raw,
                expire_at = %expire_at,
                "ignoring fleet, ttl is not expired"
            );
            return Ok(());
        }

        let namespace = fleet.namespace().unwrap_or_default();
        match self.remote.delete_fleet(&namespace, &fleet.name_any()).await {
            Ok(()) => {
                counter!("fleetgc_fleets_deleted_total", 1);
                info!(fleet = %fleet_ref, ttl = raw, "fleet deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => {
                debug!(fleet = %fleet_ref, "fleet already deleted");
                Ok(())
            }
            Err(source) => Err(CollectorError::DeleteFailed { fleet: fleet_ref, source }),
        }
    }

    /// Set the targeted Fleet as the single controller owner of `scaler`.
    ///
    /// A missing Fleet is not an error; the link is retried on the next
    /// event for the autoscaler. When the Fleet exists the autoscaler is
    /// always written, even if the reference is already in place.
    pub async fn assign_owner_ref(&self, scaler: &FleetAutoscaler) -> Result<(), CollectorError> {
        let autoscaler = namespaced(scaler);
        let namespace = scaler.namespace().unwrap_or_default();

        let fleet = match self.cache.get_fleet(&namespace, &scaler.spec.fleet_name) {
            Ok(Some(fleet)) => fleet,
            Ok(None) | Err(StoreError::NotFound) => {
                debug!(
                    fleet_autoscaler = %autoscaler,
                    target_fleet = %scaler.target(),
                    "FleetAutoscaler does not have a Fleet deployed"
                );
                return Ok(());
            }
            Err(source) => {
                return Err(CollectorError::LookupFailed { autoscaler, fleet: scaler.target(), source });
            }
        };

        let owner = fleet
            .controller_owner_ref(&())
            .ok_or_else(|| CollectorError::OwnerWithoutUid { autoscaler: autoscaler.clone(), fleet: namespaced(&*fleet) })?;

        let mut updated = scaler.clone();
        updated.metadata.owner_references = Some(vec![OwnerReference {
            block_owner_deletion: Some(true),
            ..owner
        }]);

        let stored = self
            .remote
            .update_autoscaler(&updated)
            .await
            .map_err(|source| CollectorError::UpdateFailed { autoscaler: autoscaler.clone(), source })?;

        counter!("fleetgc_owner_refs_assigned_total", 1);
        debug!(
            fleet_autoscaler = %namespaced(&stored),
            owner = %namespaced(&*fleet),
            "FleetAutoscaler owner references updated"
        );
        Ok(())
    }

    async fn route(&self, kind: EventKind, message: &Message) -> Result<(), CollectorError> {
        match kind {
            EventKind::FleetAdded | EventKind::FleetUpdated => self.reconcile(fleet_payload(kind, message)?).await,
            EventKind::FleetDeleted => {
                let fleet = fleet_payload(kind, message)?;
                debug!(fleet = %namespaced(fleet), event = %kind, action = "nop", "fleet deleted");
                Ok(())
            }
            EventKind::FleetAutoscalerAdded | EventKind::FleetAutoscalerUpdated => {
                self.assign_owner_ref(autoscaler_payload(kind, message)?).await
            }
            EventKind::FleetAutoscalerDeleted => {
                let scaler = autoscaler_payload(kind, message)?;
                debug!(fleet_autoscaler = %namespaced(scaler), event = %kind, action = "nop", "FleetAutoscaler deleted");
                Ok(())
            }
        }
    }
}

fn fleet_payload(kind: EventKind, message: &Message) -> Result<&Fleet, CollectorError> {
    match message {
        Message::Fleet(transition) => Ok(transition.current()),
        _ => Err(CollectorError::PayloadMismatch { event_type: kind }),
    }
}

fn autoscaler_payload(kind: EventKind, message: &Message) -> Result<&FleetAutoscaler, CollectorError> {
    match message {
        Message::FleetAutoscaler(transition) => Ok(transition.current()),
        _ => Err(CollectorError::PayloadMismatch { event_type: kind }),
    }
}

#[async_trait]
impl<C: FleetCache, R: RemoteStore> Broker for FleetCollector<C, R> {
    type Error = CollectorError;

    fn build_envelope(&self, event: Event) -> Result<Envelope, CollectorError> {
        Ok(Envelope::new(event))
    }

    /// Route an envelope by its `event_type` header.
    ///
    /// Unknown event types are ignored. TTL decision errors are logged and
    /// end here; every other handler error is returned unchanged.
    async fn send_message(&self, envelope: &Envelope) -> Result<(), CollectorError> {
        let event_type = envelope.event_type();
        let Ok(kind) = event_type.parse::<EventKind>() else {
            debug!(event = event_type, "ignoring unknown event type");
            return Ok(());
        };
        counter!("fleetgc_events_dispatched_total", 1, "event_type" => kind.as_str());

        match self.route(kind, &envelope.message().message).await {
            Err(err) if err.is_decision_error() => {
                counter!("fleetgc_reconcile_errors_total", 1, "event_type" => kind.as_str());
                error!(error = %err, cause = ?std::error::Error::source(&err), event = %kind, "skipping reconcile");
                Ok(())
            }
            Err(err) => {
                counter!("fleetgc_reconcile_errors_total", 1, "event_type" => kind.as_str());
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }
}

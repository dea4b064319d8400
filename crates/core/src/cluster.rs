//! Seams between the collector and the cluster: the local mirrored cache,
//! the remote store, the message broker and the clock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::{Envelope, Event};
use crate::resources::{Fleet, FleetAutoscaler};

/// Errors reported by cache and remote store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("cache writer dropped before the cache became ready")]
    CacheClosed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Read-only view of the locally mirrored Fleets.
#[async_trait]
pub trait FleetCache: Send + Sync {
    /// Look up a Fleet by namespace and name. `Ok(None)` when absent.
    fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Arc<Fleet>>, StoreError>;

    /// Resolve once the cache has completed its initial list.
    async fn wait_until_synced(&self) -> Result<(), StoreError>;
}

/// Mutating calls against the cluster.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn delete_fleet(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Replace the FleetAutoscaler with `scaler`, returning the stored object.
    async fn update_autoscaler(&self, scaler: &FleetAutoscaler) -> Result<FleetAutoscaler, StoreError>;
}

/// Consumer of reconcile events.
#[async_trait]
pub trait Broker: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn build_envelope(&self, event: Event) -> Result<Envelope, Self::Error>;

    async fn send_message(&self, envelope: &Envelope) -> Result<(), Self::Error>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
impl<T: FleetCache + ?Sized> FleetCache for Arc<T> {
    fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Arc<Fleet>>, StoreError> {
        (**self).get_fleet(namespace, name)
    }

    async fn wait_until_synced(&self) -> Result<(), StoreError> {
        (**self).wait_until_synced().await
    }
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn delete_fleet(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        (**self).delete_fleet(namespace, name).await
    }

    async fn update_autoscaler(&self, scaler: &FleetAutoscaler) -> Result<FleetAutoscaler, StoreError> {
        (**self).update_autoscaler(scaler).await
    }
}

//! kube-rs implementations of the collector's cache and remote store.

use std::sync::Arc;

use async_trait::async_trait;
use fleetgc_core::{Fleet, FleetAutoscaler, FleetCache, RemoteStore, StoreError};
use kube::{
    api::{Api, DeleteParams, PostParams},
    runtime::reflector::{ObjectRef, Store},
    Client, ResourceExt,
};

/// Fleet lookups served from the informer's reflector store.
#[derive(Clone)]
pub struct KubeFleetCache {
    store: Store<Fleet>,
}

impl KubeFleetCache {
    pub fn new(store: Store<Fleet>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FleetCache for KubeFleetCache {
    fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Arc<Fleet>>, StoreError> {
        Ok(self.store.get(&ObjectRef::new(name).within(namespace)))
    }

    async fn wait_until_synced(&self) -> Result<(), StoreError> {
        self.store.wait_until_ready().await.map_err(|_| StoreError::CacheClosed)
    }
}

/// Writes against the API server.
#[derive(Clone)]
pub struct KubeRemoteStore {
    client: Client,
}

impl KubeRemoteStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStore for KubeRemoteStore {
    async fn delete_fleet(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<Fleet> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await.map_err(store_error)?;
        Ok(())
    }

    async fn update_autoscaler(&self, scaler: &FleetAutoscaler) -> Result<FleetAutoscaler, StoreError> {
        let namespace = scaler.namespace().unwrap_or_default();
        let api: Api<FleetAutoscaler> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&scaler.name_any(), &PostParams::default(), scaler)
            .await
            .map_err(store_error)
    }
}

/// 404 from the API server becomes `NotFound`; everything else is opaque.
pub fn store_error(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => StoreError::NotFound,
        other => StoreError::Other(other.into()),
    }
}

//! Fleet GC kubehub: informers, kube-rs cluster adapters and the broadcaster

#![forbid(unsafe_code)]

mod broadcaster;
mod cluster;
mod informer;

use fleetgc_core::{Fleet, FleetAutoscaler};
use kube::{Api, Client};

pub use broadcaster::{Broadcaster, BroadcasterConfig};
pub use cluster::{store_error, KubeFleetCache, KubeRemoteStore};
pub use informer::{transitions, EventSink, Informer};

/// Informer over Fleets, optionally restricted to one namespace.
pub fn fleet_informer(client: Client, namespace: Option<&str>) -> Informer<Fleet> {
    Informer::new(scoped_api(client, namespace))
}

/// Informer over FleetAutoscalers, optionally restricted to one namespace.
pub fn fleet_autoscaler_informer(client: Client, namespace: Option<&str>) -> Informer<FleetAutoscaler> {
    Informer::new(scoped_api(client, namespace))
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

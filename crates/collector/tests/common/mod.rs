#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fleetgc_collector::FleetCollector;
use fleetgc_core::{
    Clock, Fleet, FleetAutoscaler, FleetAutoscalerSpec, FleetCache, FleetSpec, RemoteStore, StoreError,
    TTL_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    NotFound,
    Other,
}

impl Fail {
    fn err(self) -> StoreError {
        match self {
            Fail::NotFound => StoreError::NotFound,
            Fail::Other => StoreError::Other(anyhow!("apiserver unavailable")),
        }
    }
}

/// In-memory cache + remote store recording every mutating call.
#[derive(Default)]
pub struct FakeCluster {
    fleets: Mutex<HashMap<(String, String), Arc<Fleet>>>,
    deletes: Mutex<Vec<(String, String)>>,
    updates: Mutex<Vec<FleetAutoscaler>>,
    fail_delete: Mutex<Option<Fail>>,
    fail_lookup: Mutex<Option<Fail>>,
    fail_update: Mutex<Option<Fail>>,
    /// Number of sync waits that hang before the cache reports ready.
    sync_after: AtomicU32,
    sync_calls: AtomicU32,
    never_sync: Mutex<bool>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_fleet(&self, fleet: Fleet) {
        let key = (fleet.metadata.namespace.clone().unwrap_or_default(), fleet.metadata.name.clone().unwrap_or_default());
        self.fleets.lock().unwrap().insert(key, Arc::new(fleet));
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<FleetAutoscaler> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fail_delete(&self, f: Fail) {
        *self.fail_delete.lock().unwrap() = Some(f);
    }

    pub fn fail_lookup(&self, f: Fail) {
        *self.fail_lookup.lock().unwrap() = Some(f);
    }

    pub fn fail_update(&self, f: Fail) {
        *self.fail_update.lock().unwrap() = Some(f);
    }

    pub fn sync_after(&self, hanging_waits: u32) {
        self.sync_after.store(hanging_waits, Ordering::SeqCst);
    }

    pub fn never_sync(&self) {
        *self.never_sync.lock().unwrap() = true;
    }

    pub fn sync_calls(&self) -> u32 {
        self.sync_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FleetCache for FakeCluster {
    fn get_fleet(&self, namespace: &str, name: &str) -> Result<Option<Arc<Fleet>>, StoreError> {
        if let Some(f) = *self.fail_lookup.lock().unwrap() {
            return Err(f.err());
        }
        Ok(self.fleets.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }

    async fn wait_until_synced(&self) -> Result<(), StoreError> {
        let call = self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let never = *self.never_sync.lock().unwrap();
        if never || call < self.sync_after.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeCluster {
    async fn delete_fleet(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.deletes.lock().unwrap().push((namespace.to_string(), name.to_string()));
        match *self.fail_delete.lock().unwrap() {
            Some(f) => Err(f.err()),
            None => Ok(()),
        }
    }

    async fn update_autoscaler(&self, scaler: &FleetAutoscaler) -> Result<FleetAutoscaler, StoreError> {
        self.updates.lock().unwrap().push(scaler.clone());
        match *self.fail_update.lock().unwrap() {
            Some(f) => Err(f.err()),
            None => Ok(scaler.clone()),
        }
    }
}

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(t: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(t)))
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.0.lock().unwrap() = t;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc)
}

pub fn after(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn fleet(ns: &str, name: &str, ttl: Option<&str>) -> Fleet {
    let mut f = Fleet::new(name, FleetSpec::default());
    f.metadata.namespace = Some(ns.to_string());
    f.metadata.uid = Some(format!("uid-{name}"));
    f.metadata.creation_timestamp = Some(Time(t0()));
    if let Some(ttl) = ttl {
        f.metadata.annotations = Some([(TTL_ANNOTATION.to_string(), ttl.to_string())].into_iter().collect());
    }
    f
}

pub fn autoscaler(ns: &str, name: &str, fleet_name: &str) -> FleetAutoscaler {
    let mut fas = FleetAutoscaler::new(name, FleetAutoscalerSpec { fleet_name: fleet_name.to_string(), ..Default::default() });
    fas.metadata.namespace = Some(ns.to_string());
    fas
}

pub type TestCollector = FleetCollector<Arc<FakeCluster>, Arc<FakeCluster>>;

pub fn collector(cluster: &Arc<FakeCluster>, clock: &Arc<FixedClock>) -> TestCollector {
    FleetCollector::new(cluster.clone(), cluster.clone()).with_clock(clock.clone())
}

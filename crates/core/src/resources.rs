//! Agones resource kinds watched by the collector.
//!
//! Only the fields the collector reads are modelled; everything else in the
//! spec is carried through `fields` so a full-object update round-trips it.

use kube::{CustomResource, Resource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Annotation holding the time-to-live of a Fleet, e.g. `"15m"` or `"2h"`.
pub const TTL_ANNOTATION: &str = "octops.io/ttl";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(group = "agones.dev", version = "v1", kind = "Fleet", namespaced, schema = "disabled", derive = "PartialEq")]
pub struct FleetSpec {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "autoscaling.agones.dev",
    version = "v1",
    kind = "FleetAutoscaler",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct FleetAutoscalerSpec {
    /// Name of the Fleet (same namespace) this autoscaler targets.
    pub fleet_name: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// `namespace/name` rendering used in logs and errors.
pub fn namespaced<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

impl Fleet {
    /// Raw TTL annotation value, if present.
    pub fn ttl(&self) -> Option<&str> {
        self.annotations().get(TTL_ANNOTATION).map(String::as_str)
    }
}

impl FleetAutoscaler {
    /// `namespace/fleetName` of the targeted Fleet.
    pub fn target(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.spec.fleet_name)
    }
}

//! Event model: typed lifecycle events, the kind registry and envelopes.
//!
//! The watch layer produces a [`Transition`] for an object, the
//! [`EventRegistry`] turns it into an [`Event`] and the broker wraps that into
//! an [`Envelope`] whose `event_type` header drives dispatch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use kube::Resource;
use serde::{Deserialize, Serialize};

use crate::resources::{Fleet, FleetAutoscaler};

/// Header carrying the stringified [`EventKind`].
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Informer callback that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    OnAdd,
    OnUpdate,
    OnDelete,
}

/// Closed set of event types understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FleetAdded,
    FleetUpdated,
    FleetDeleted,
    FleetAutoscalerAdded,
    FleetAutoscalerUpdated,
    FleetAutoscalerDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::FleetAdded,
        EventKind::FleetUpdated,
        EventKind::FleetDeleted,
        EventKind::FleetAutoscalerAdded,
        EventKind::FleetAutoscalerUpdated,
        EventKind::FleetAutoscalerDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FleetAdded => "fleet.events.added",
            EventKind::FleetUpdated => "fleet.events.updated",
            EventKind::FleetDeleted => "fleet.events.deleted",
            EventKind::FleetAutoscalerAdded => "fleetautoscaler.events.added",
            EventKind::FleetAutoscalerUpdated => "fleetautoscaler.events.updated",
            EventKind::FleetAutoscalerDeleted => "fleetautoscaler.events.deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Lifecycle change of a single object.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<K> {
    Added(K),
    Updated { previous: K, current: K },
    Deleted(K),
}

impl<K> Transition<K> {
    /// Object as of after the transition. For updates this is always `current`.
    pub fn current(&self) -> &K {
        match self {
            Transition::Added(obj) | Transition::Deleted(obj) => obj,
            Transition::Updated { current, .. } => current,
        }
    }

    pub fn into_current(self) -> K {
        match self {
            Transition::Added(obj) | Transition::Deleted(obj) => obj,
            Transition::Updated { current, .. } => current,
        }
    }

    pub fn source(&self) -> EventSource {
        match self {
            Transition::Added(_) => EventSource::OnAdd,
            Transition::Updated { .. } => EventSource::OnUpdate,
            Transition::Deleted(_) => EventSource::OnDelete,
        }
    }
}

/// Payload of an event, one variant per watched kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Fleet(Transition<Fleet>),
    FleetAutoscaler(Transition<FleetAutoscaler>),
}

impl Message {
    pub fn source(&self) -> EventSource {
        match self {
            Message::Fleet(t) => t.source(),
            Message::FleetAutoscaler(t) => t.source(),
        }
    }
}

/// Kinds that can travel inside a [`Message`].
pub trait Watched: Resource<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static {
    fn into_message(transition: Transition<Self>) -> Message;
}

impl Watched for Fleet {
    fn into_message(transition: Transition<Self>) -> Message {
        Message::Fleet(transition)
    }
}

impl Watched for FleetAutoscaler {
    fn into_message(transition: Transition<Self>) -> Message {
        Message::FleetAutoscaler(transition)
    }
}

/// A typed reconcile event: where it came from, what it is, and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub source: EventSource,
    pub kind: EventKind,
    pub message: Message,
}

impl Event {
    pub fn event_type(&self) -> EventKind {
        self.kind
    }

    pub fn event_source(&self) -> EventSource {
        self.source
    }
}

pub type EventConstructor = fn(Message) -> Event;

/// Constructors for the three lifecycle transitions of one kind.
#[derive(Clone, Copy)]
pub struct EventFactory {
    pub added: EventConstructor,
    pub updated: EventConstructor,
    pub deleted: EventConstructor,
}

impl fmt::Debug for EventFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFactory").finish_non_exhaustive()
    }
}

pub fn fleet_added(message: Message) -> Event {
    Event { source: EventSource::OnAdd, kind: EventKind::FleetAdded, message }
}

pub fn fleet_updated(message: Message) -> Event {
    Event { source: EventSource::OnUpdate, kind: EventKind::FleetUpdated, message }
}

pub fn fleet_deleted(message: Message) -> Event {
    Event { source: EventSource::OnDelete, kind: EventKind::FleetDeleted, message }
}

pub fn fleet_autoscaler_added(message: Message) -> Event {
    Event { source: EventSource::OnAdd, kind: EventKind::FleetAutoscalerAdded, message }
}

pub fn fleet_autoscaler_updated(message: Message) -> Event {
    Event { source: EventSource::OnUpdate, kind: EventKind::FleetAutoscalerUpdated, message }
}

pub fn fleet_autoscaler_deleted(message: Message) -> Event {
    Event { source: EventSource::OnDelete, kind: EventKind::FleetAutoscalerDeleted, message }
}

pub const FLEET_EVENTS: EventFactory = EventFactory {
    added: fleet_added,
    updated: fleet_updated,
    deleted: fleet_deleted,
};

pub const FLEET_AUTOSCALER_EVENTS: EventFactory = EventFactory {
    added: fleet_autoscaler_added,
    updated: fleet_autoscaler_updated,
    deleted: fleet_autoscaler_deleted,
};

/// Binds each watched kind to its event constructors.
///
/// Built once at startup and shared with the watch layer; a transition for a
/// kind that was never registered yields no event.
#[derive(Debug, Default, Clone)]
pub struct EventRegistry {
    factories: HashMap<String, EventFactory>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with Fleet and FleetAutoscaler bound to their constructors.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Fleet>(FLEET_EVENTS)
            .register::<FleetAutoscaler>(FLEET_AUTOSCALER_EVENTS);
        registry
    }

    pub fn register<K: Resource<DynamicType = ()>>(&mut self, factory: EventFactory) -> &mut Self {
        self.factories.insert(K::kind(&()).into_owned(), factory);
        self
    }

    pub fn is_registered<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.factories.contains_key(K::kind(&()).as_ref())
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn event_for<K: Watched>(&self, transition: Transition<K>) -> Option<Event> {
        let factory = self.factories.get(K::kind(&()).as_ref())?;
        let ctor = match transition {
            Transition::Added(_) => factory.added,
            Transition::Updated { .. } => factory.updated,
            Transition::Deleted(_) => factory.deleted,
        };
        Some(ctor(K::into_message(transition)))
    }
}

/// Header set plus an event, handed from producers to the dispatcher.
#[derive(Debug, Clone)]
pub struct Envelope {
    headers: BTreeMap<String, String>,
    message: Event,
}

impl Envelope {
    /// Wrap an event; the `event_type` header is always set.
    pub fn new(event: Event) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(EVENT_TYPE_HEADER.to_string(), event.event_type().to_string());
        Self { headers, message: event }
    }

    /// Rebuild an envelope from raw headers, e.g. when relayed by another
    /// producer. Returns `None` when `event_type` is missing.
    pub fn from_parts(headers: BTreeMap<String, String>, message: Event) -> Option<Self> {
        headers.contains_key(EVENT_TYPE_HEADER).then_some(Self { headers, message })
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == EVENT_TYPE_HEADER {
            return;
        }
        self.headers.insert(key, value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn event_type(&self) -> &str {
        self.header(EVENT_TYPE_HEADER).unwrap_or_default()
    }

    pub fn message(&self) -> &Event {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{FleetAutoscalerSpec, FleetSpec};

    fn fleet(name: &str, generation: i64) -> Fleet {
        let mut f = Fleet::new(name, FleetSpec::default());
        f.metadata.namespace = Some("ns".into());
        f.metadata.generation = Some(generation);
        f
    }

    #[test]
    fn event_kind_strings_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("fleet.events.exploded".parse::<EventKind>().is_err());
        assert!("".parse::<EventKind>().is_err());
    }

    #[test]
    fn registry_builds_typed_events() {
        let registry = EventRegistry::standard();
        assert_eq!(registry.kinds(), vec!["Fleet", "FleetAutoscaler"]);

        let ev = registry.event_for(Transition::Added(fleet("a", 1))).unwrap();
        assert_eq!(ev.kind, EventKind::FleetAdded);
        assert_eq!(ev.source, EventSource::OnAdd);

        let ev = registry
            .event_for(Transition::Updated { previous: fleet("a", 1), current: fleet("a", 2) })
            .unwrap();
        assert_eq!(ev.kind, EventKind::FleetUpdated);
        assert_eq!(ev.source, EventSource::OnUpdate);
        match &ev.message {
            Message::Fleet(t) => assert_eq!(t.current().metadata.generation, Some(2)),
            other => panic!("unexpected payload {other:?}"),
        }

        let scaler = FleetAutoscaler::new("s", FleetAutoscalerSpec { fleet_name: "a".into(), ..Default::default() });
        let ev = registry.event_for(Transition::Deleted(scaler)).unwrap();
        assert_eq!(ev.kind, EventKind::FleetAutoscalerDeleted);
        assert_eq!(ev.source, EventSource::OnDelete);
    }

    #[test]
    fn unregistered_kind_yields_nothing() {
        let mut registry = EventRegistry::new();
        registry.register::<Fleet>(FLEET_EVENTS);
        assert!(registry.is_registered::<Fleet>());
        assert!(!registry.is_registered::<FleetAutoscaler>());
        let scaler = FleetAutoscaler::new("s", FleetAutoscalerSpec::default());
        assert!(registry.event_for(Transition::Added(scaler)).is_none());
    }

    #[test]
    fn envelope_always_carries_event_type() {
        let ev = fleet_updated(Message::Fleet(Transition::Updated { previous: fleet("a", 1), current: fleet("a", 2) }));
        let mut env = Envelope::new(ev);
        assert_eq!(env.event_type(), "fleet.events.updated");

        env.add_header("trace", "abc");
        env.add_header(EVENT_TYPE_HEADER, "fleet.events.deleted");
        assert_eq!(env.header("trace"), Some("abc"));
        assert_eq!(env.event_type(), "fleet.events.updated");
        assert_eq!(env.headers().len(), 2);

        let ev = env.message().clone();
        assert!(Envelope::from_parts(BTreeMap::new(), ev.clone()).is_none());
        let headers = BTreeMap::from([(EVENT_TYPE_HEADER.to_string(), "custom.events".to_string())]);
        assert_eq!(Envelope::from_parts(headers, ev).unwrap().event_type(), "custom.events");
    }
}

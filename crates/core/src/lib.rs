//! Fleet GC core types: watched resources, the event model and TTL parsing.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod duration;
pub mod events;
pub mod resources;

pub use cluster::{Broker, Clock, FleetCache, RemoteStore, StoreError, SystemClock};
pub use duration::{expiry, parse_duration, DurationParseError};
pub use events::{
    Envelope, Event, EventFactory, EventKind, EventRegistry, EventSource, Message, Transition, Watched,
    EVENT_TYPE_HEADER,
};
pub use resources::{namespaced, Fleet, FleetAutoscaler, FleetAutoscalerSpec, FleetSpec, TTL_ANNOTATION};

pub mod prelude {
    pub use super::{
        Broker, Clock, Envelope, Event, EventKind, EventRegistry, Fleet, FleetAutoscaler, FleetCache, Message,
        RemoteStore, StoreError, Transition,
    };
}

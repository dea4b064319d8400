//! Reflector-backed informer: list+watch one kind, keep a local cache and
//! publish Added/Updated/Deleted transitions, with periodic resync.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fleetgc_core::{Broker, Envelope, EventRegistry, Transition, Watched};
use futures::StreamExt;
use kube::{
    runtime::{
        reflector::{self, store::Writer, ObjectRef, Store},
        watcher::{self, Event},
        WatchStreamExt,
    },
    Api,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns transitions into envelopes and queues them for the broadcaster.
pub struct EventSink<B> {
    registry: Arc<EventRegistry>,
    broker: Arc<B>,
    tx: mpsc::Sender<Envelope>,
}

impl<B> Clone for EventSink<B> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry), broker: Arc::clone(&self.broker), tx: self.tx.clone() }
    }
}

impl<B: Broker> EventSink<B> {
    pub fn new(registry: Arc<EventRegistry>, broker: Arc<B>, tx: mpsc::Sender<Envelope>) -> Self {
        Self { registry, broker, tx }
    }

    /// Queue `transition`. Returns `false` once the queue is closed.
    pub async fn publish<K: Watched>(&self, transition: Transition<K>) -> bool {
        let Some(event) = self.registry.event_for(transition) else {
            return true;
        };
        match self.broker.build_envelope(event) {
            Ok(envelope) => self.tx.send(envelope).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to build envelope");
                true
            }
        }
    }
}

/// Transitions implied by `event`, computed against the cache *before* the
/// event is applied to it.
pub fn transitions<K>(cache: &Store<K>, event: &Event<K>) -> Vec<Transition<K>>
where
    K: Watched,
{
    match event {
        Event::Applied(obj) => vec![applied(cache, obj)],
        Event::Deleted(obj) => vec![Transition::Deleted(obj.clone())],
        Event::Restarted(list) => {
            let listed: HashSet<ObjectRef<K>> = list.iter().map(ObjectRef::from_obj).collect();
            let mut out: Vec<_> = list.iter().map(|obj| applied(cache, obj)).collect();
            out.extend(
                cache
                    .state()
                    .into_iter()
                    .filter(|cached| !listed.contains(&ObjectRef::from_obj(cached.as_ref())))
                    .map(|gone| Transition::Deleted(gone.as_ref().clone())),
            );
            out
        }
    }
}

fn applied<K: Watched>(cache: &Store<K>, obj: &K) -> Transition<K> {
    match cache.get(&ObjectRef::from_obj(obj)) {
        Some(previous) => Transition::Updated { previous: previous.as_ref().clone(), current: obj.clone() },
        None => Transition::Added(obj.clone()),
    }
}

pub struct Informer<K>
where
    K: Watched,
{
    api: Api<K>,
    reader: Store<K>,
    writer: Writer<K>,
}

impl<K> Informer<K>
where
    K: Watched + DeserializeOwned,
{
    pub fn new(api: Api<K>) -> Self {
        let (reader, writer) = reflector::store();
        Self { api, reader, writer }
    }

    /// Read handle on the local cache; ready once the initial list landed.
    pub fn store(&self) -> Store<K> {
        self.reader.clone()
    }

    /// Watch until cancelled or the event queue closes. A zero `resync`
    /// disables periodic replays.
    pub async fn run<B: Broker>(mut self, sink: EventSink<B>, resync: Duration, token: CancellationToken) {
        let kind = K::kind(&()).into_owned();
        let stream = watcher::watcher(self.api.clone(), watcher::Config::default()).default_backoff();
        futures::pin_mut!(stream);

        let resync_enabled = !resync.is_zero();
        let period = if resync_enabled { resync } else { Duration::from_secs(3600) };
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(kind = %kind, resync = ?resync, "informer started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick(), if resync_enabled => {
                    let cached = self.reader.state();
                    debug!(kind = %kind, count = cached.len(), "resync");
                    for obj in cached {
                        let t = Transition::Updated { previous: obj.as_ref().clone(), current: obj.as_ref().clone() };
                        if !sink.publish(t).await {
                            return;
                        }
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        let pending = transitions(&self.reader, &event);
                        self.writer.apply_watcher_event(&event);
                        for t in pending {
                            if !sink.publish(t).await {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => warn!(kind = %kind, error = %e, "watch error"),
                    None => {
                        warn!(kind = %kind, "watcher stream ended");
                        break;
                    }
                },
            }
        }
        info!(kind = %kind, "informer stopped");
    }
}

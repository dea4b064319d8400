//! Drives informers and hands their envelopes to the broker with bounded
//! concurrency.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleetgc_core::{Broker, Envelope, EventRegistry, Watched};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use metrics::counter;
use serde::de::DeserializeOwned;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::informer::{EventSink, Informer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Interval at which every cached object is replayed as an update.
    pub sync_period: Duration,
    /// Maximum number of envelopes processed at once.
    pub max_concurrent_reconcile: usize,
    pub queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(15),
            max_concurrent_reconcile: 5,
            queue_capacity: 1024,
        }
    }
}

pub struct Broadcaster<B: Broker> {
    broker: Arc<B>,
    config: BroadcasterConfig,
    sink: EventSink<B>,
    rx: mpsc::Receiver<Envelope>,
    informers: Vec<BoxFuture<'static, ()>>,
    token: CancellationToken,
}

impl<B: Broker + 'static> Broadcaster<B> {
    pub fn new(broker: Arc<B>, registry: Arc<EventRegistry>, config: BroadcasterConfig, token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let sink = EventSink::new(registry, Arc::clone(&broker), tx);
        Self { broker, config, sink, rx, informers: Vec::new(), token }
    }

    /// Register an informer; it starts with [`Broadcaster::start`].
    pub fn with_informer<K>(mut self, informer: Informer<K>) -> Self
    where
        K: Watched + DeserializeOwned,
    {
        let run = informer.run(self.sink.clone(), self.config.sync_period, self.token.child_token());
        self.informers.push(run.boxed());
        self
    }

    /// Extra producer handle, e.g. for replaying events.
    pub fn sink(&self) -> EventSink<B> {
        self.sink.clone()
    }

    /// Run informers and dispatch until cancelled or every producer is gone.
    /// Envelopes already being dispatched are processed to completion.
    pub async fn start(self) {
        let ready = async { Ok::<(), Infallible>(()) };
        if let Err(never) = self.start_after(ready).await {
            match never {}
        }
    }

    /// Like [`Broadcaster::start`], but dispatch only begins once `ready`
    /// resolves. Informers run (and fill their caches) meanwhile. A failed
    /// gate stops the informers and is returned.
    pub async fn start_after<F, E>(self, ready: F) -> Result<(), E>
    where
        F: Future<Output = Result<(), E>>,
    {
        let Broadcaster { broker, config, sink, rx, informers, token } = self;
        drop(sink);

        let mut tasks = JoinSet::new();
        for run in informers {
            tasks.spawn(run);
        }

        let gate = tokio::select! {
            res = ready => res,
            _ = token.cancelled() => Ok(()),
        };
        if let Err(e) = gate {
            token.cancel();
            join_informers(&mut tasks).await;
            return Err(e);
        }

        info!(
            informers = tasks.len(),
            max_concurrent = config.max_concurrent_reconcile,
            "broadcaster started"
        );

        let queue = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|env| (env, rx)) });
        queue
            .take_until(token.cancelled())
            .for_each_concurrent(config.max_concurrent_reconcile.max(1), |envelope| {
                let broker = Arc::clone(&broker);
                async move { dispatch(broker.as_ref(), envelope).await }
            })
            .await;

        token.cancel();
        join_informers(&mut tasks).await;
        info!("broadcaster stopped");
        Ok(())
    }
}

async fn join_informers(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "informer task failed");
        }
    }
}

async fn dispatch<B: Broker>(broker: &B, envelope: Envelope) {
    if let Err(e) = broker.send_message(&envelope).await {
        counter!("fleetgc_dispatch_failures_total", 1, "event_type" => envelope.event_type().to_string());
        error!(error = %e, event = envelope.event_type(), "failed to process event");
    }
}

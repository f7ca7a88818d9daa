//! Event bus: merges producer streams and fans out to monitors.
//!
//! Producers publish through non-blocking handles into a bounded ingest
//! queue. A dedicated worker delivers each event to every subscription
//! whose interest filter accepts it, using per-subscriber bounded queues
//! and `try_send` so a slow monitor never stalls the others. Overflow is
//! dropped and counted, never blocked on.
//!
//! Per-producer arrival order is preserved (one FIFO ingest queue);
//! ordering across producers is best-effort, and every event carries its
//! own timestamp so consumers can reorder when they need to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{AvatarRole, EngineEvent};

/// Unique identifier for a bus subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which events a subscription wants delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInterest {
    sensors: Vec<(AvatarRole, String)>,
    speech_roles: Vec<AvatarRole>,
}

impl EventInterest {
    /// An interest that accepts nothing; extend with the builders below.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a watched sensor parameter.
    #[must_use]
    pub fn sensor(mut self, source: AvatarRole, parameter: impl Into<String>) -> Self {
        let parameter = parameter.into();
        if !self.sensors.iter().any(|(r, p)| *r == source && *p == parameter) {
            self.sensors.push((source, parameter));
        }
        self
    }

    /// Adds a watched speech role.
    #[must_use]
    pub fn speech(mut self, role: AvatarRole) -> Self {
        if !self.speech_roles.contains(&role) {
            self.speech_roles.push(role);
        }
        self
    }

    /// Whether the filter accepts the event.
    #[must_use]
    pub fn accepts(&self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::Sensor(ev) => self
                .sensors
                .iter()
                .any(|(role, parameter)| *role == ev.source && *parameter == ev.parameter),
            EngineEvent::Speech(ev) => self.speech_roles.contains(&ev.role),
        }
    }
}

enum ControlMsg {
    Subscribe {
        id: SubscriptionId,
        interest: EventInterest,
        tx: Sender<EngineEvent>,
        reply: Sender<()>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Shutdown,
}

struct SubscriptionEntry {
    interest: EventInterest,
    tx: Sender<EngineEvent>,
}

/// The event bus handle owned by the session.
#[derive(Debug)]
pub struct EventBus {
    subscriber_capacity: usize,
    control_tx: Sender<ControlMsg>,
    ingest_tx: Sender<EngineEvent>,
    dropped_ingest: Arc<AtomicU64>,
    dropped_deliveries: Arc<AtomicU64>,
}

impl EventBus {
    /// Starts the bus worker.
    #[must_use]
    pub fn start(cfg: &QueueConfig) -> Self {
        let (control_tx, control_rx) = bounded::<ControlMsg>(cfg.control_capacity.max(1));
        let (ingest_tx, ingest_rx) = bounded::<EngineEvent>(cfg.ingest_capacity.max(1));

        let dropped_deliveries = Arc::new(AtomicU64::new(0));
        let worker_dropped = Arc::clone(&dropped_deliveries);

        // Detached on purpose: producer handles keep a clone of ingest_tx,
        // so joining here could wait on a channel the caller still holds.
        // The worker exits on Shutdown or once every sender is gone.
        let builder = std::thread::Builder::new().name("leash-bus".to_string());
        let _ = builder
            .spawn(move || worker_loop(worker_dropped, control_rx, ingest_rx))
            .expect("failed to spawn leash bus worker");

        Self {
            subscriber_capacity: cfg.subscriber_capacity.max(1),
            control_tx,
            ingest_tx,
            dropped_ingest: Arc::new(AtomicU64::new(0)),
            dropped_deliveries,
        }
    }

    /// Registers a subscription and returns its event receiver.
    pub fn subscribe(
        &self,
        interest: EventInterest,
    ) -> EngineResult<(SubscriptionId, Receiver<EngineEvent>)> {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<EngineEvent>(self.subscriber_capacity);
        let (reply_tx, reply_rx) = bounded::<()>(1);

        self.control_tx
            .send(ControlMsg::Subscribe {
                id,
                interest,
                tx,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::Disconnected {
                path: "bus_control".to_string(),
            })?;

        reply_rx.recv().map_err(|_| EngineError::Disconnected {
            path: "bus_control".to_string(),
        })?;

        Ok((id, rx))
    }

    /// Removes a subscription. Best-effort and idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.control_tx.try_send(ControlMsg::Unsubscribe { id });
    }

    /// Non-blocking publish; overflow and post-shutdown publishes are
    /// dropped and counted.
    pub fn publish(&self, event: EngineEvent) {
        match self.ingest_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_ingest.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// A cloneable producer handle backed by the same ingest queue.
    #[must_use]
    pub fn producer(&self) -> Producer {
        Producer {
            tx: self.ingest_tx.clone(),
            dropped: Arc::clone(&self.dropped_ingest),
        }
    }

    /// Events dropped at ingest (queue full or bus stopped).
    #[must_use]
    pub fn dropped_ingest(&self) -> u64 {
        self.dropped_ingest.load(Ordering::Relaxed)
    }

    /// Events dropped on the way to a slow subscriber.
    #[must_use]
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped_deliveries.load(Ordering::Relaxed)
    }

    /// Stops the worker and disconnects every subscriber queue.
    ///
    /// Subscribers observe disconnection and wind down without firing
    /// pending timers. Idempotent.
    pub fn close(&self) {
        let _ = self.control_tx.send(ControlMsg::Shutdown);
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.close();
    }
}

/// Non-blocking publish handle shared with producers.
#[derive(Debug, Clone)]
pub struct Producer {
    tx: Sender<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl Producer {
    /// Publishes one event; overflow is dropped and counted.
    pub fn publish(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn worker_loop(
    dropped_deliveries: Arc<AtomicU64>,
    control_rx: Receiver<ControlMsg>,
    ingest_rx: Receiver<EngineEvent>,
) {
    let mut subs: HashMap<SubscriptionId, SubscriptionEntry> = HashMap::new();

    let mut control_closed = false;
    let mut ingest_closed = false;

    loop {
        select! {
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg::Subscribe { id, interest, tx, reply }) => {
                        subs.insert(id, SubscriptionEntry { interest, tx });
                        let _ = reply.send(());
                    }
                    Ok(ControlMsg::Unsubscribe { id }) => {
                        subs.remove(&id);
                    }
                    Ok(ControlMsg::Shutdown) => {
                        debug!(subscriptions = subs.len(), "event bus shutting down");
                        // Dropping the map disconnects every subscriber queue.
                        subs.clear();
                        return;
                    }
                    Err(_) => {
                        control_closed = true;
                    }
                }
            }
            recv(ingest_rx) -> msg => {
                match msg {
                    Ok(event) => {
                        for entry in subs.values() {
                            if !entry.interest.accepts(&event) {
                                continue;
                            }
                            // Never block the bus: drop if the subscriber is slow.
                            match entry.tx.try_send(event.clone()) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                                    dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                    }
                    Err(_) => {
                        ingest_closed = true;
                    }
                }
            }
        }

        if control_closed && ingest_closed {
            break;
        }
    }
}

//! Session lifecycle: validation, wiring, and cancellation.
//!
//! `Session::start` validates the whole configuration first (a session
//! never starts partially configured), then wires producers → bus →
//! monitors → coordinator → sink. Each monitor runs on its own named
//! worker thread; stopping the session closes the bus, which disconnects
//! every monitor queue — workers exit without firing pending timers, and
//! the coordinator discards whatever is still in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use tracing::info;

use crate::bus::{EventBus, Producer};
use crate::config::SessionConfig;
use crate::coordinator::{spawn_coordinator, CoordinatorSettings, ModeToggles};
use crate::error::EngineResult;
use crate::event::{EngineEvent, SensorEvent, SpeechEvent};
use crate::monitor::command::CommandMonitor;
use crate::monitor::meter::MeterMonitor;
use crate::monitor::stretch::StretchMonitor;
use crate::monitor::vocab_watch::VocabWatchMonitor;
use crate::monitor::{spawn_monitor, Monitor};
use crate::sink::StimulusSink;
use crate::status::StatusStream;
use crate::trigger::{TriggerKind, TriggerSignal};

/// Publish handle for avatar-parameter updates.
#[derive(Debug, Clone)]
pub struct SensorProducer {
    inner: Producer,
}

impl SensorProducer {
    /// Publishes one sensor update. Non-blocking; overflow is counted.
    pub fn publish(&self, event: SensorEvent) {
        self.inner.publish(EngineEvent::Sensor(event));
    }
}

/// Publish handle for completed utterances.
#[derive(Debug, Clone)]
pub struct SpeechProducer {
    inner: Producer,
}

impl SpeechProducer {
    /// Publishes one speech event. Non-blocking; overflow is counted.
    pub fn publish(&self, event: SpeechEvent) {
        self.inner.publish(EngineEvent::Speech(event));
    }
}

/// A running interaction session.
#[derive(Debug)]
pub struct Session {
    bus: EventBus,
    toggles: Arc<ModeToggles>,
    stopped: Arc<AtomicBool>,
    status: Mutex<Option<StatusStream>>,
    monitor_joins: Mutex<Vec<JoinHandle<()>>>,
    coordinator_join: Mutex<Option<JoinHandle<()>>>,
    dropped_signals: Arc<AtomicU64>,
    suppressed_triggers: Arc<AtomicU64>,
}

impl Session {
    /// Validates the configuration and starts every configured monitor.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found; nothing is spawned
    /// on failure.
    pub fn start(config: SessionConfig, sink: Arc<dyn StimulusSink>) -> EngineResult<Self> {
        Self::start_at(config, sink, Utc::now())
    }

    /// Like [`Session::start`] but with a fixed time origin.
    ///
    /// The origin anchors meter `dt` measurement, so replaying a recorded
    /// event sequence against the same origin reproduces the same trigger
    /// sequence.
    pub fn start_at(
        config: SessionConfig,
        sink: Arc<dyn StimulusSink>,
        origin: DateTime<Utc>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let difficulty = config.difficulty;

        // Build all monitors before spawning anything so a late
        // compilation failure cannot leave a half-started session.
        let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
        if let Some(cfg) = &config.focus {
            monitors.push(Box::new(MeterMonitor::new(
                TriggerKind::Focus,
                cfg,
                &difficulty,
                origin,
            )?));
        }
        if let Some(cfg) = &config.proximity {
            monitors.push(Box::new(MeterMonitor::new(
                TriggerKind::Proximity,
                cfg,
                &difficulty,
                origin,
            )?));
        }
        if let Some(cfg) = &config.command {
            monitors.push(Box::new(CommandMonitor::new(cfg, &difficulty)?));
        }
        if let Some(cfg) = &config.scold {
            monitors.push(Box::new(VocabWatchMonitor::new(TriggerKind::Scold, cfg)?));
        }
        if let Some(cfg) = &config.self_reference {
            monitors.push(Box::new(VocabWatchMonitor::new(
                TriggerKind::SelfReference,
                cfg,
            )?));
        }
        if let Some(cfg) = &config.stretch {
            monitors.push(Box::new(StretchMonitor::new(cfg, &difficulty)));
        }

        let bus = EventBus::start(&config.queues);
        let toggles = Arc::new(ModeToggles::new(&config.modes));
        let stopped = Arc::new(AtomicBool::new(false));
        let dropped_signals = Arc::new(AtomicU64::new(0));
        let suppressed_triggers = Arc::new(AtomicU64::new(0));

        let (signal_tx, signal_rx) = bounded::<TriggerSignal>(config.queues.signal_capacity.max(1));
        let (status_tx, status_rx) = bounded(config.queues.status_capacity.max(1));

        let mut monitor_joins = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let (_, event_rx) = bus.subscribe(monitor.interest())?;
            monitor_joins.push(spawn_monitor(
                monitor,
                event_rx,
                signal_tx.clone(),
                status_tx.clone(),
                Arc::clone(&dropped_signals),
            ));
        }

        let settings = CoordinatorSettings::new(
            config.intensity,
            config.min_interval_ms,
            &difficulty,
            &config.targets,
        );
        let coordinator_join = spawn_coordinator(
            settings,
            Arc::clone(&toggles),
            sink,
            signal_rx,
            status_tx,
            Arc::clone(&stopped),
            Arc::clone(&suppressed_triggers),
        );
        // The workers hold the only remaining signal senders: once they
        // exit, the coordinator's queue disconnects and it winds down.
        drop(signal_tx);

        info!(monitors = monitor_joins.len(), "session started");

        Ok(Self {
            bus,
            toggles,
            stopped,
            status: Mutex::new(Some(StatusStream::new(status_rx))),
            monitor_joins: Mutex::new(monitor_joins),
            coordinator_join: Mutex::new(Some(coordinator_join)),
            dropped_signals,
            suppressed_triggers,
        })
    }

    /// Publish handle for the avatar-parameter transport.
    #[must_use]
    pub fn sensor_producer(&self) -> SensorProducer {
        SensorProducer {
            inner: self.bus.producer(),
        }
    }

    /// Publish handle for the speech engine.
    #[must_use]
    pub fn speech_producer(&self) -> SpeechProducer {
        SpeechProducer {
            inner: self.bus.producer(),
        }
    }

    /// Runtime per-mode enable flags.
    #[must_use]
    pub fn toggles(&self) -> Arc<ModeToggles> {
        Arc::clone(&self.toggles)
    }

    /// Takes the operator status stream. Returns `None` after the first
    /// call.
    pub fn take_status(&self) -> Option<StatusStream> {
        self.status.lock().ok()?.take()
    }

    /// Signals dropped between monitors and the coordinator (fan-in
    /// queue overflow).
    #[must_use]
    pub fn dropped_signals(&self) -> u64 {
        self.dropped_signals.load(Ordering::Relaxed)
    }

    /// Triggers discarded by the coordinator (mode disabled or cooldown).
    #[must_use]
    pub fn suppressed_triggers(&self) -> u64 {
        self.suppressed_triggers.load(Ordering::Relaxed)
    }

    /// Events dropped at the bus (ingest overflow or slow monitors).
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.bus.dropped_ingest() + self.bus.dropped_deliveries()
    }

    /// Stops the session: cancels pending timers, discards in-flight
    /// events and signals, and joins every worker. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        // Closing the bus disconnects every monitor queue; workers exit
        // without firing pending deadlines.
        self.bus.close();

        if let Ok(mut joins) = self.monitor_joins.lock() {
            for join in joins.drain(..) {
                let _ = join.join();
            }
        }

        // All signal senders are gone now, so the coordinator drains and
        // exits; its stop flag makes the drain a discard.
        if let Ok(mut join) = self.coordinator_join.lock() {
            if let Some(handle) = join.take() {
                let _ = handle.join();
            }
        }

        info!("session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Monitors: per-mode state machines over the merged event stream.
//!
//! Each monitor owns its state exclusively and is a deterministic
//! function of the timestamped events it receives — replaying an
//! identical event sequence into a fresh monitor produces an identical
//! signal sequence. Wall-clock time only enters through the worker
//! harness, which turns deadlines into scheduled wake-ups.
//!
//! Timer ordering: when a deadline wake-up fires, the harness first
//! drains every event already enqueued. A completion event that raced
//! the deadline is therefore processed before expiry is declared, which
//! makes the near-simultaneous case deterministic.

/// Command window state machine.
pub mod command;
/// Boolean fill/drain meters (focus, proximity).
pub mod meter;
/// Continuous threshold watcher with per-monitor cooldown.
pub mod stretch;
/// Stateless vocabulary matchers (scold, self-reference).
pub mod vocab_watch;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::debug;

use crate::bus::EventInterest;
use crate::event::EngineEvent;
use crate::status::StatusEvent;
use crate::trigger::TriggerSignal;

/// Signals and status reports produced by one processing step.
#[derive(Debug, Default)]
pub struct MonitorOutput {
    /// Trigger signals to forward to the coordinator.
    pub signals: Vec<TriggerSignal>,
    /// Status reports for the operator layer.
    pub status: Vec<StatusEvent>,
}

impl MonitorOutput {
    /// Appends another step's output.
    pub fn merge(&mut self, mut other: Self) {
        self.signals.append(&mut other.signals);
        self.status.append(&mut other.status);
    }
}

/// A monitor consumes events and deadline wake-ups, emitting signals.
pub trait Monitor: Send {
    /// Stable name used for the worker thread and logs.
    fn name(&self) -> &'static str;

    /// Which events this monitor wants from the bus.
    fn interest(&self) -> EventInterest;

    /// Processes one event.
    fn on_event(&mut self, event: &EngineEvent) -> MonitorOutput;

    /// The next moment this monitor must wake even without events.
    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Handles an elapsed deadline. Called with the deadline timestamp
    /// itself so emitted signals carry event time, not arrival time.
    fn on_deadline(&mut self, _deadline: DateTime<Utc>) -> MonitorOutput {
        MonitorOutput::default()
    }
}

/// Runs a monitor on a dedicated worker thread until its event queue
/// disconnects.
///
/// Disconnection is the cancellation path: pending deadlines are
/// abandoned, not fired, so stopping a session emits no further
/// triggers.
pub(crate) fn spawn_monitor(
    mut monitor: Box<dyn Monitor>,
    rx: Receiver<EngineEvent>,
    signal_tx: Sender<TriggerSignal>,
    status_tx: Sender<StatusEvent>,
    dropped_signals: Arc<AtomicU64>,
) -> JoinHandle<()> {
    let name = monitor.name();
    std::thread::Builder::new()
        .name(format!("leash-{name}"))
        .spawn(move || {
            loop {
                let received = match monitor.next_deadline() {
                    Some(deadline) => {
                        let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        match rx.recv_timeout(wait) {
                            Ok(event) => Some(event),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match rx.recv() {
                        Ok(event) => Some(event),
                        Err(_) => break,
                    },
                };

                let output = match received {
                    Some(event) => monitor.on_event(&event),
                    None => {
                        // Deadline elapsed. Drain anything already enqueued
                        // first: an in-flight completion beats the timer.
                        let mut output = MonitorOutput::default();
                        let mut disconnected = false;
                        loop {
                            match rx.try_recv() {
                                Ok(event) => output.merge(monitor.on_event(&event)),
                                Err(TryRecvError::Empty) => break,
                                Err(TryRecvError::Disconnected) => {
                                    disconnected = true;
                                    break;
                                }
                            }
                        }
                        if !disconnected {
                            if let Some(deadline) = monitor.next_deadline() {
                                if deadline <= Utc::now() {
                                    output.merge(monitor.on_deadline(deadline));
                                }
                            }
                        }
                        forward(&output, &signal_tx, &status_tx, &dropped_signals);
                        if disconnected {
                            break;
                        }
                        continue;
                    }
                };

                forward(&output, &signal_tx, &status_tx, &dropped_signals);
            }
            debug!(monitor = name, "monitor worker stopped");
        })
        .expect("failed to spawn leash monitor worker")
}

fn forward(
    output: &MonitorOutput,
    signal_tx: &Sender<TriggerSignal>,
    status_tx: &Sender<StatusEvent>,
    dropped_signals: &AtomicU64,
) {
    for signal in &output.signals {
        match signal_tx.try_send(signal.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                dropped_signals.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    for status in &output.status {
        // Status is advisory; drops are acceptable and uncounted here
        // (the stream owner can fall behind without consequence).
        let _ = status_tx.try_send(status.clone());
    }
}

//! Operator-facing status reporting.
//!
//! Monitors and the coordinator surface non-fatal conditions (stale
//! signals, sink failures, deliveries) as status events on a bounded
//! stream. Nothing in the engine swallows a sink failure silently.

use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::event::AvatarRole;
use crate::trigger::TriggerKind;

/// A status report from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A meter's watched parameters stopped updating; the meter froze
    /// instead of draining.
    SignalLost {
        /// Avatar whose transport went quiet.
        role: AvatarRole,
        /// One of the watched parameters.
        parameter: String,
        /// Timestamp of the last update seen before the gap.
        last_seen: DateTime<Utc>,
    },

    /// A command window opened.
    CommandStarted {
        /// Canonical command name.
        name: String,
        /// When the window expires.
        deadline: DateTime<Utc>,
    },

    /// A command was completed inside its window. No trigger fired.
    CommandCompleted {
        /// Canonical command name.
        name: String,
        /// How long completion took.
        elapsed_ms: u64,
    },

    /// A stimulus was delivered to the device API.
    StimulusDelivered {
        /// Monitor kind that requested it.
        kind: TriggerKind,
        /// Target avatar.
        role: AvatarRole,
        /// Delivered intensity.
        intensity: u8,
        /// Delivered duration in milliseconds.
        duration_ms: u64,
        /// Event time of the originating trigger.
        at: DateTime<Utc>,
    },

    /// The device API reported a failure. The attempt is not retried.
    SinkFailure {
        /// Monitor kind that requested the stimulus.
        kind: TriggerKind,
        /// Target avatar.
        role: AvatarRole,
        /// Rendered sink error.
        message: String,
        /// Event time of the originating trigger.
        at: DateTime<Utc>,
    },
}

/// Receiving half of the status stream.
///
/// Obtained once from a running session. Dropping it is fine: status
/// events are then dropped (counted) instead of delivered.
#[derive(Debug)]
pub struct StatusStream {
    rx: Receiver<StatusEvent>,
}

impl StatusStream {
    pub(crate) fn new(rx: Receiver<StatusEvent>) -> Self {
        Self { rx }
    }

    /// Receives the next status event (blocking).
    pub fn recv(&self) -> EngineResult<StatusEvent> {
        self.rx.recv().map_err(|_| EngineError::Disconnected {
            path: "status_stream".to_string(),
        })
    }

    /// Receives the next status event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> EngineResult<StatusEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => EngineError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => EngineError::Disconnected {
                path: "status_stream".to_string(),
            },
        })
    }

    /// Drains whatever is currently buffered without blocking.
    pub fn drain(&self) -> Vec<StatusEvent> {
        self.rx.try_iter().collect()
    }
}

//! Stimulus delivery seam.
//!
//! The engine treats the device API as an opaque, possibly-slow,
//! possibly-failing sink behind the [`StimulusSink`] trait. Retry, auth
//! and transport details all live on the implementation side.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::StimulusTarget;
use crate::error::SinkError;

/// A concrete stimulus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusCommand {
    /// Intensity in `[0, 100]`.
    pub intensity: u8,
    /// How long the stimulus lasts.
    pub duration: Duration,
}

impl StimulusCommand {
    /// Creates a command, rejecting out-of-range intensity.
    pub fn new(intensity: u8, duration: Duration) -> Result<Self, SinkError> {
        if intensity > 100 {
            return Err(SinkError::InvalidCommand {
                reason: format!("intensity {intensity} exceeds 100"),
            });
        }
        if duration.is_zero() {
            return Err(SinkError::InvalidCommand {
                reason: "duration is zero".to_string(),
            });
        }
        Ok(Self {
            intensity,
            duration,
        })
    }
}

/// The external stimulus device API.
///
/// Implementations may block; the coordinator calls this from its own
/// worker thread so a slow sink never stalls monitors or producers.
pub trait StimulusSink: Send + Sync {
    /// Delivers one stimulus command to the target device.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the device API rejects or cannot be
    /// reached. The engine logs and surfaces failures but never retries
    /// within the same trigger.
    fn deliver(&self, target: &StimulusTarget, command: StimulusCommand) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_rejects_out_of_range_intensity() {
        let err = StimulusCommand::new(101, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, SinkError::InvalidCommand { .. }));
    }

    #[test]
    fn command_rejects_zero_duration() {
        let err = StimulusCommand::new(50, Duration::ZERO).unwrap_err();
        assert!(matches!(err, SinkError::InvalidCommand { .. }));
    }

    #[test]
    fn command_accepts_bounds() {
        let cmd = StimulusCommand::new(100, Duration::from_millis(1)).unwrap();
        assert_eq!(cmd.intensity, 100);
    }
}

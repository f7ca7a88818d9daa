//! Event types shared by producers, the bus, and monitors.
//!
//! Events are immutable once published. Each carries its own timestamp so
//! consumers can order across producers; arrival order is only guaranteed
//! within a single producer's stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which tracked avatar an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarRole {
    /// The trainer-side avatar.
    Trainer,
    /// The pet-side avatar.
    Pet,
}

impl AvatarRole {
    /// Stable lowercase name, used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trainer => "trainer",
            Self::Pet => "pet",
        }
    }
}

/// A boolean or continuous avatar-parameter reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SensorValue {
    Bool(bool),
    Float(f64),
}

impl SensorValue {
    #[must_use]
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Float(_) => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Bool(_) => None,
        }
    }
}

/// A timestamped avatar-parameter update from the rendering client.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub source: AvatarRole,
    pub parameter: String,
    pub value: SensorValue,
    pub timestamp: DateTime<Utc>,
}

impl SensorEvent {
    /// Convenience constructor for a boolean parameter update.
    #[must_use]
    pub fn boolean(
        source: AvatarRole,
        parameter: impl Into<String>,
        value: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            parameter: parameter.into(),
            value: SensorValue::Bool(value),
            timestamp,
        }
    }

    /// Convenience constructor for a continuous parameter update.
    #[must_use]
    pub fn continuous(
        source: AvatarRole,
        parameter: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            parameter: parameter.into(),
            value: SensorValue::Float(value),
            timestamp,
        }
    }
}

/// A completed speech utterance from the transcription engine.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechEvent {
    pub role: AvatarRole,
    pub text: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SpeechEvent {
    /// The instant the utterance completed.
    ///
    /// Used when ordering speech against sensor data; a command window
    /// opens at the end of the spoken command, not its start.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.ended_at
    }
}

/// The merged event stream delivered by the bus to monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An avatar-parameter update.
    Sensor(SensorEvent),
    /// A completed utterance.
    Speech(SpeechEvent),
}

impl EngineEvent {
    /// The timestamp the event carries.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Sensor(ev) => ev.timestamp,
            Self::Speech(ev) => ev.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sensor_value_accessors() {
        assert_eq!(SensorValue::Bool(true).as_bool(), Some(true));
        assert_eq!(SensorValue::Bool(true).as_float(), None);
        assert_eq!(SensorValue::Float(0.5).as_float(), Some(0.5));
        assert_eq!(SensorValue::Float(0.5).as_bool(), None);
    }

    #[test]
    fn speech_event_timestamp_is_end_of_utterance() {
        let t0 = Utc::now();
        let ev = SpeechEvent {
            role: AvatarRole::Trainer,
            text: "sit".to_string(),
            started_at: t0,
            ended_at: t0 + Duration::milliseconds(400),
        };
        assert_eq!(ev.timestamp(), t0 + Duration::milliseconds(400));
        assert_eq!(
            EngineEvent::Speech(ev).timestamp(),
            t0 + Duration::milliseconds(400)
        );
    }

    #[test]
    fn engine_event_round_trips_through_json() {
        let ev = EngineEvent::Sensor(SensorEvent::boolean(
            AvatarRole::Pet,
            "Trainer/EyeLeft",
            true,
            Utc::now(),
        ));
        let json = serde_json::to_string(&ev).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}

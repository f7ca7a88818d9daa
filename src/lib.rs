//! # Leash - reactive conditioning engine for avatar companion sessions
//!
//! Leash fuses two real-time streams — avatar-parameter updates from a
//! rendering client and speech-transcription events — and decides when to
//! issue a stimulus command to a remote device API. Monitors own their
//! state exclusively and are deterministic over timestamped events; all
//! delivery policy (mode toggles, cooldowns, intensity mapping) is
//! centralized in the coordinator.
//!
//! ## Core Concepts
//!
//! - **Event Bus**: merges producer streams; fan-out with per-subscriber
//!   buffering so a slow monitor never stalls the rest
//! - **Monitor**: a per-mode state machine (meter, command window,
//!   vocabulary match, stretch threshold) emitting trigger signals
//! - **Coordinator**: fan-in point applying toggles, per-target
//!   cooldowns and difficulty before the stimulus sink is called
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leash::{Session, SessionConfig, SensorEvent, AvatarRole};
//!
//! let config = SessionConfig::from_json_str(&profile_json)?;
//! let session = Session::start(config, Arc::new(http_sink))?;
//!
//! let sensors = session.sensor_producer();
//! sensors.publish(SensorEvent::boolean(
//!     AvatarRole::Pet,
//!     "Trainer/EyeLeft",
//!     true,
//!     timestamp,
//! ));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod monitor;
pub mod session;
pub mod sink;
pub mod status;
pub mod trigger;
pub mod vocab;

// Re-export primary types at crate root for convenience
pub use bus::{EventBus, EventInterest, SubscriptionId};
pub use config::{
    CommandConfig, CommandSpec, CompletionCondition, DifficultyScaling, IntensityBand,
    IntensityConfig, MeterConfig, ModesConfig, QueueConfig, RearmPolicy, SessionConfig,
    StimulusTarget, StretchConfig, StretchTarget, VocabMonitorConfig,
};
pub use coordinator::ModeToggles;
pub use error::{ConfigError, EngineError, EngineResult, SinkError};
pub use event::{AvatarRole, EngineEvent, SensorEvent, SensorValue, SpeechEvent};
pub use session::{SensorProducer, Session, SpeechProducer};
pub use sink::{StimulusCommand, StimulusSink};
pub use status::{StatusEvent, StatusStream};
pub use trigger::{TriggerKind, TriggerSignal};
pub use vocab::{MatchMode, Vocabulary};

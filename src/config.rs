//! Session configuration consumed by the engine.
//!
//! Configuration is supplied once per session and is immutable thereafter,
//! with one exception: per-mode enable flags are mirrored into runtime
//! toggles that the operator can flip mid-session (enforcement lives in
//! the coordinator, so no monitor restart is needed).
//!
//! Validation is fail-fast and total: `SessionConfig::validate` returns
//! the first error found, and `Session::start` runs it before spawning
//! any worker.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::AvatarRole;
use crate::trigger::TriggerKind;
use crate::vocab::MatchMode;

fn check_finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "must be finite".to_string(),
        })
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "must be non-negative".to_string(),
        });
    }
    Ok(())
}

/// Difficulty scaling applied on top of base rates and windows.
///
/// Each factor is clamped into `[0, 2]` by validation, matching the range
/// the operator-facing sliders expose.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyScaling {
    /// Multiplies meter fill and drain rates.
    pub rate_scale: f64,
    /// Multiplies command completion windows.
    pub delay_scale: f64,
    /// Multiplies cooldown intervals.
    pub cooldown_scale: f64,
    /// Multiplies stimulus durations.
    pub duration_scale: f64,
    /// Multiplies stimulus intensity.
    pub strength_scale: f64,
}

impl Default for DifficultyScaling {
    fn default() -> Self {
        Self {
            rate_scale: 1.0,
            delay_scale: 1.0,
            cooldown_scale: 1.0,
            duration_scale: 1.0,
            strength_scale: 1.0,
        }
    }
}

impl DifficultyScaling {
    /// A forgiving profile: slower meters, longer windows, softer output.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            rate_scale: 0.5,
            delay_scale: 1.5,
            cooldown_scale: 1.5,
            duration_scale: 0.5,
            strength_scale: 0.5,
        }
    }

    /// A demanding profile: faster meters, tighter windows, harder output.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            rate_scale: 1.5,
            delay_scale: 0.5,
            cooldown_scale: 0.5,
            duration_scale: 1.25,
            strength_scale: 1.5,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("difficulty.rate_scale", self.rate_scale),
            ("difficulty.delay_scale", self.delay_scale),
            ("difficulty.cooldown_scale", self.cooldown_scale),
            ("difficulty.duration_scale", self.duration_scale),
            ("difficulty.strength_scale", self.strength_scale),
        ] {
            check_finite(field, value)?;
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value,
                    reason: "must be within [0, 2]".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Initial per-mode enable flags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub focus: bool,
    pub proximity: bool,
    pub command: bool,
    pub scold: bool,
    pub self_reference: bool,
    pub stretch: bool,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            focus: true,
            proximity: true,
            command: true,
            scold: true,
            self_reference: true,
            stretch: true,
        }
    }
}

impl ModesConfig {
    /// Whether the given kind starts enabled.
    #[must_use]
    pub const fn is_enabled(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Focus => self.focus,
            TriggerKind::Proximity => self.proximity,
            TriggerKind::Command => self.command,
            TriggerKind::Scold => self.scold,
            TriggerKind::SelfReference => self.self_reference,
            TriggerKind::Stretch => self.stretch,
        }
    }
}

fn default_pet() -> AvatarRole {
    AvatarRole::Pet
}

fn default_trainer() -> AvatarRole {
    AvatarRole::Trainer
}

/// Boolean-meter configuration (focus and proximity monitors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Boolean parameters combined with OR; any update to one is a tick.
    pub parameters: Vec<String>,
    /// Which avatar's transport carries the watched parameters.
    #[serde(default = "default_pet")]
    pub source: AvatarRole,
    /// The avatar whose device receives the stimulus.
    #[serde(default = "default_pet")]
    pub target: AvatarRole,
    /// Meter units gained per second while the condition holds.
    pub fill_rate: f64,
    /// Meter units lost per second while the condition does not hold.
    pub drain_rate: f64,
    /// Upper bound of the meter; it starts full.
    pub max: f64,
    /// Level restored after a trigger; must be in `(0, max]` so a single
    /// zero-crossing cannot storm.
    pub recovery_level: f64,
    /// Gap between updates beyond which the meter freezes instead of
    /// draining, in milliseconds.
    #[serde(default = "MeterConfig::default_staleness_ms")]
    pub staleness_ms: u64,
    /// Immediate level reduction when the penalty vocabulary matches
    /// speech from `penalty_role`. Zero disables the penalty path.
    #[serde(default)]
    pub speech_penalty: f64,
    /// Words that incur the speech penalty (e.g. the pet's names).
    #[serde(default)]
    pub penalty_words: Vec<String>,
    /// Speech role the penalty vocabulary listens to.
    #[serde(default = "default_trainer")]
    pub penalty_role: AvatarRole,
}

impl MeterConfig {
    const fn default_staleness_ms() -> u64 {
        2_000
    }

    fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if self.parameters.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyVocabulary {
                context: format!("{context}.parameters"),
            });
        }
        check_non_negative(&format!("{context}.fill_rate"), self.fill_rate)?;
        check_non_negative(&format!("{context}.drain_rate"), self.drain_rate)?;
        check_finite(&format!("{context}.max"), self.max)?;
        if self.max <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{context}.max"),
                value: self.max,
                reason: "must be positive".to_string(),
            });
        }
        check_finite(&format!("{context}.recovery_level"), self.recovery_level)?;
        if self.recovery_level <= 0.0 || self.recovery_level > self.max {
            return Err(ConfigError::InvalidValue {
                field: format!("{context}.recovery_level"),
                value: self.recovery_level,
                reason: "must be within (0, max]".to_string(),
            });
        }
        if self.staleness_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: format!("{context}.staleness_ms"),
            });
        }
        check_non_negative(&format!("{context}.speech_penalty"), self.speech_penalty)?;
        if self.speech_penalty > 0.0 && self.penalty_words.is_empty() {
            return Err(ConfigError::EmptyVocabulary {
                context: format!("{context}.penalty_words"),
            });
        }
        Ok(())
    }
}

/// Policy for a command word recognised while a session is already armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Keep the in-flight window; the new word is dropped. Prevents rapid
    /// repeated speech from truncating an active timeout.
    #[default]
    Ignore,
    /// Abandon the in-flight window and arm the new command.
    Replace,
}

/// Conjunction over boolean sensor parameters.
///
/// The condition holds when every `all_of` parameter last read true and
/// every `none_of` parameter last read false. Unseen parameters read
/// false.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCondition {
    #[serde(default)]
    pub all_of: Vec<String>,
    #[serde(default)]
    pub none_of: Vec<String>,
}

impl CompletionCondition {
    /// Every parameter the condition reads.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.all_of
            .iter()
            .chain(self.none_of.iter())
            .map(String::as_str)
    }
}

/// One voice command: recognition phrases plus its completion condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Canonical name, used in logs and status events.
    pub name: String,
    /// Spoken variants that arm the command ("paw", "poor", "pour"...).
    pub phrases: Vec<String>,
    /// Sensor condition that completes it.
    pub completion: CompletionCondition,
}

impl CommandSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidCommand {
                name: self.name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        if self.phrases.is_empty() {
            return Err(ConfigError::InvalidCommand {
                name: self.name.clone(),
                reason: "no recognition phrases".to_string(),
            });
        }
        if self.completion.all_of.is_empty() && self.completion.none_of.is_empty() {
            return Err(ConfigError::InvalidCommand {
                name: self.name.clone(),
                reason: "completion condition reads no parameters".to_string(),
            });
        }
        Ok(())
    }
}

/// Command monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Speech role that issues commands.
    #[serde(default = "default_trainer")]
    pub speaker: AvatarRole,
    /// Avatar whose sensor parameters complete commands.
    #[serde(default = "default_pet")]
    pub subject: AvatarRole,
    /// The avatar whose device receives the stimulus on expiry.
    #[serde(default = "default_pet")]
    pub target: AvatarRole,
    /// Configured commands.
    pub commands: Vec<CommandSpec>,
    /// Base completion window in milliseconds, scaled by `delay_scale`.
    pub timeout_ms: u64,
    /// Behaviour for a command word recognised while armed.
    #[serde(default)]
    pub rearm: RearmPolicy,
}

impl CommandConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.commands.is_empty() {
            return Err(ConfigError::EmptyVocabulary {
                context: "command.commands".to_string(),
            });
        }
        for spec in &self.commands {
            spec.validate()?;
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "command.timeout_ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Vocabulary monitor configuration (scold, self-reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabMonitorConfig {
    /// Speech role the vocabulary listens to.
    pub role: AvatarRole,
    /// The avatar whose device receives the stimulus.
    #[serde(default = "default_pet")]
    pub target: AvatarRole,
    /// Watched words or phrases.
    pub words: Vec<String>,
    /// Whole-word or substring comparison.
    #[serde(default = "VocabMonitorConfig::default_match_mode")]
    pub match_mode: MatchMode,
}

impl VocabMonitorConfig {
    const fn default_match_mode() -> MatchMode {
        MatchMode::WholeWord
    }

    /// Default self-reference configuration: the pet's first-person
    /// pronouns, whole-word matched.
    #[must_use]
    pub fn self_reference_default() -> Self {
        Self {
            role: AvatarRole::Pet,
            target: AvatarRole::Pet,
            words: [
                "i", "im", "i'm", "ive", "i've", "ill", "i'll", "me", "my", "mine", "myself",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            match_mode: MatchMode::WholeWord,
        }
    }

    fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if self.words.iter().all(|w| w.trim().is_empty()) {
            return Err(ConfigError::EmptyVocabulary {
                context: format!("{context}.words"),
            });
        }
        Ok(())
    }
}

/// One continuous parameter watched by the stretch monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchTarget {
    /// The continuous parameter (e.g. "LeftEar_Stretch").
    pub parameter: String,
    /// Optional boolean guard; the trigger only fires while the guard
    /// last read true (e.g. "LeftEar_IsGrabbed").
    #[serde(default)]
    pub guard: Option<String>,
}

/// Stretch monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchConfig {
    /// Which avatar's transport carries the watched parameters.
    #[serde(default = "default_pet")]
    pub source: AvatarRole,
    /// The avatar whose device receives the stimulus.
    #[serde(default = "default_pet")]
    pub target: AvatarRole,
    /// Watched parameters with optional guards.
    pub targets: Vec<StretchTarget>,
    /// Values above this fire (subject to guard and cooldown).
    pub threshold: f64,
    /// Value at which severity saturates to 1.0.
    pub max: f64,
    /// Per-monitor cooldown in milliseconds, scaled by `cooldown_scale`.
    pub cooldown_ms: u64,
}

impl StretchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty()
            || self.targets.iter().all(|t| t.parameter.trim().is_empty())
        {
            return Err(ConfigError::EmptyVocabulary {
                context: "stretch.targets".to_string(),
            });
        }
        check_finite("stretch.threshold", self.threshold)?;
        check_finite("stretch.max", self.max)?;
        if self.max <= self.threshold {
            return Err(ConfigError::InvalidValue {
                field: "stretch.max".to_string(),
                value: self.max,
                reason: "must exceed threshold".to_string(),
            });
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "stretch.cooldown_ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Device credentials for one avatar.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusTarget {
    pub role: AvatarRole,
    pub user_id: String,
    pub api_key: String,
}

impl StimulusTarget {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                role: self.role.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Intensity band and base duration for one trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityBand {
    /// Floor intensity in `[0, 100]`.
    pub min: u8,
    /// Ceiling intensity in `[0, 100]`.
    pub max: u8,
    /// Base stimulus duration in milliseconds, scaled by
    /// `duration_scale`.
    pub duration_ms: u64,
}

impl IntensityBand {
    fn validate(&self, kind: TriggerKind) -> Result<(), ConfigError> {
        if self.min > self.max || self.max > 100 {
            return Err(ConfigError::InvalidIntensityBand {
                kind: kind.as_str().to_string(),
                min: self.min,
                max: self.max,
            });
        }
        if self.duration_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: format!("intensity.{}.duration_ms", kind.as_str()),
            });
        }
        Ok(())
    }
}

/// Per-kind intensity mapping.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConfig {
    pub focus: IntensityBand,
    pub proximity: IntensityBand,
    pub command: IntensityBand,
    pub scold: IntensityBand,
    pub self_reference: IntensityBand,
    pub stretch: IntensityBand,
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            focus: IntensityBand {
                min: 10,
                max: 50,
                duration_ms: 200,
            },
            proximity: IntensityBand {
                min: 10,
                max: 50,
                duration_ms: 200,
            },
            command: IntensityBand {
                min: 35,
                max: 35,
                duration_ms: 500,
            },
            scold: IntensityBand {
                min: 30,
                max: 30,
                duration_ms: 500,
            },
            self_reference: IntensityBand {
                min: 20,
                max: 20,
                duration_ms: 500,
            },
            stretch: IntensityBand {
                min: 20,
                max: 40,
                duration_ms: 500,
            },
        }
    }
}

impl IntensityConfig {
    /// The band for a trigger kind.
    #[must_use]
    pub const fn band(&self, kind: TriggerKind) -> IntensityBand {
        match kind {
            TriggerKind::Focus => self.focus,
            TriggerKind::Proximity => self.proximity,
            TriggerKind::Command => self.command,
            TriggerKind::Scold => self.scold,
            TriggerKind::SelfReference => self.self_reference,
            TriggerKind::Stretch => self.stretch,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for kind in TriggerKind::ALL {
            self.band(kind).validate(kind)?;
        }
        Ok(())
    }
}

/// Queue capacities for the engine's bounded channels.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max queued events before publishes are dropped (counted).
    pub ingest_capacity: usize,
    /// Max queued control messages (subscribe/unsubscribe).
    pub control_capacity: usize,
    /// Per-monitor event buffer.
    pub subscriber_capacity: usize,
    /// Fan-in buffer between monitors and the coordinator.
    pub signal_capacity: usize,
    /// Operator-facing status buffer.
    pub status_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 4096,
            control_capacity: 64,
            subscriber_capacity: 1024,
            signal_capacity: 256,
            status_capacity: 1024,
        }
    }
}

/// Full session configuration.
///
/// Monitors are built only for the sections that are present; the mode
/// toggles additionally gate delivery at the coordinator.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub difficulty: DifficultyScaling,
    pub modes: ModesConfig,
    pub focus: Option<MeterConfig>,
    pub proximity: Option<MeterConfig>,
    pub command: Option<CommandConfig>,
    pub scold: Option<VocabMonitorConfig>,
    pub self_reference: Option<VocabMonitorConfig>,
    pub stretch: Option<StretchConfig>,
    pub targets: Vec<StimulusTarget>,
    /// Minimum interval between deliveries to the same target, in
    /// milliseconds, scaled by `cooldown_scale`.
    pub min_interval_ms: u64,
    pub intensity: IntensityConfig,
    pub queues: QueueConfig,
}

impl SessionConfig {
    /// Parses a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Roles that any configured monitor directs stimuli at.
    fn referenced_targets(&self) -> Vec<AvatarRole> {
        let mut roles = Vec::new();
        let mut push = |role: AvatarRole| {
            if !roles.contains(&role) {
                roles.push(role);
            }
        };
        if let Some(cfg) = &self.focus {
            push(cfg.target);
        }
        if let Some(cfg) = &self.proximity {
            push(cfg.target);
        }
        if let Some(cfg) = &self.command {
            push(cfg.target);
        }
        if let Some(cfg) = &self.scold {
            push(cfg.target);
        }
        if let Some(cfg) = &self.self_reference {
            push(cfg.target);
        }
        if let Some(cfg) = &self.stretch {
            push(cfg.target);
        }
        roles
    }

    /// Validates the whole configuration, returning the first error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.difficulty.validate()?;
        self.intensity.validate()?;

        if let Some(cfg) = &self.focus {
            cfg.validate("focus")?;
        }
        if let Some(cfg) = &self.proximity {
            cfg.validate("proximity")?;
        }
        if let Some(cfg) = &self.command {
            cfg.validate()?;
        }
        if let Some(cfg) = &self.scold {
            cfg.validate("scold")?;
        }
        if let Some(cfg) = &self.self_reference {
            cfg.validate("self_reference")?;
        }
        if let Some(cfg) = &self.stretch {
            cfg.validate()?;
        }

        if self.min_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "min_interval_ms".to_string(),
            });
        }

        for target in &self.targets {
            target.validate()?;
        }
        for role in self.referenced_targets() {
            if !self.targets.iter().any(|t| t.role == role) {
                return Err(ConfigError::MissingCredential {
                    role: role.as_str().to_string(),
                });
            }
        }

        Ok(())
    }
}

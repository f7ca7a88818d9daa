//! Command window state machine.
//!
//! `Idle → Armed → {Completed | Expired} → Idle`. A speech event matching
//! a command phrase arms a completion window; a sensor state satisfying
//! the command's condition inside the window completes it silently, and
//! an elapsed window emits one trigger.
//!
//! Race rule: a completion event timestamped at or before the deadline
//! always wins, even when it is processed after the deadline instant.
//! The worker harness additionally drains queued events before
//! delivering a deadline wake-up, so the resolution is deterministic.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::bus::EventInterest;
use crate::config::{CommandConfig, CompletionCondition, DifficultyScaling, RearmPolicy};
use crate::error::ConfigError;
use crate::event::{AvatarRole, EngineEvent};
use crate::status::StatusEvent;
use crate::trigger::{TriggerKind, TriggerSignal};
use crate::vocab::{MatchMode, Vocabulary};

use super::{Monitor, MonitorOutput};

#[derive(Debug)]
struct CompiledCommand {
    name: String,
    vocab: Vocabulary,
    completion: CompletionCondition,
}

/// An armed completion window.
#[derive(Debug, Clone, PartialEq)]
struct CommandSession {
    command_idx: usize,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

/// The command monitor.
#[derive(Debug)]
pub struct CommandMonitor {
    speaker: AvatarRole,
    subject: AvatarRole,
    target: AvatarRole,
    commands: Vec<CompiledCommand>,
    timeout: Duration,
    rearm: RearmPolicy,

    session: Option<CommandSession>,
    values: HashMap<String, bool>,
}

impl CommandMonitor {
    /// Builds the monitor from validated config, compiling each
    /// command's phrase list. The completion window is the configured
    /// timeout scaled by `delay_scale`.
    pub fn new(cfg: &CommandConfig, difficulty: &DifficultyScaling) -> Result<Self, ConfigError> {
        let mut commands = Vec::with_capacity(cfg.commands.len());
        for spec in &cfg.commands {
            commands.push(CompiledCommand {
                name: spec.name.clone(),
                vocab: Vocabulary::compile(
                    &spec.phrases,
                    MatchMode::WholeWord,
                    &format!("command.{}", spec.name),
                )?,
                completion: spec.completion.clone(),
            });
        }

        let timeout_ms = (cfg.timeout_ms as f64 * difficulty.delay_scale).max(1.0);
        Ok(Self {
            speaker: cfg.speaker,
            subject: cfg.subject,
            target: cfg.target,
            commands,
            timeout: Duration::milliseconds(timeout_ms as i64),
            rearm: cfg.rearm,
            session: None,
            values: HashMap::new(),
        })
    }

    /// True while a completion window is open.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    fn condition_holds(&self, condition: &CompletionCondition) -> bool {
        let read = |p: &String| self.values.get(p).copied().unwrap_or(false);
        condition.all_of.iter().all(read) && !condition.none_of.iter().any(read)
    }

    /// Declares expiry if the given instant is past the deadline.
    /// Exactly one terminal transition: the session is taken before the
    /// trigger is emitted.
    fn expire_if_due(&mut self, now: DateTime<Utc>, output: &mut MonitorOutput) {
        let due = self
            .session
            .as_ref()
            .is_some_and(|session| now > session.deadline);
        if !due {
            return;
        }
        let session = self.session.take().expect("session checked above");
        let name = &self.commands[session.command_idx].name;
        debug!(command = name.as_str(), "command window expired");
        output.signals.push(TriggerSignal::new(
            TriggerKind::Command,
            self.target,
            1.0,
            session.deadline,
        ));
    }

    fn try_complete(&mut self, at: DateTime<Utc>, output: &mut MonitorOutput) {
        let Some(session) = &self.session else {
            return;
        };
        if at > session.deadline {
            return;
        }
        let command = &self.commands[session.command_idx];
        if !self.condition_holds(&command.completion) {
            return;
        }
        let session = self.session.take().expect("session checked above");
        let name = self.commands[session.command_idx].name.clone();
        let elapsed = (at - session.started_at).num_milliseconds().max(0) as u64;
        debug!(command = name.as_str(), elapsed_ms = elapsed, "command completed");
        output.status.push(StatusEvent::CommandCompleted {
            name,
            elapsed_ms: elapsed,
        });
    }

    fn arm(&mut self, command_idx: usize, at: DateTime<Utc>, output: &mut MonitorOutput) {
        let deadline = at + self.timeout;
        let name = self.commands[command_idx].name.clone();
        debug!(command = name.as_str(), %deadline, "command window opened");
        self.session = Some(CommandSession {
            command_idx,
            started_at: at,
            deadline,
        });
        output.status.push(StatusEvent::CommandStarted { name, deadline });
        // The subject may already satisfy the condition; complete at once.
        self.try_complete(at, output);
    }
}

impl Monitor for CommandMonitor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn interest(&self) -> EventInterest {
        let mut interest = EventInterest::none().speech(self.speaker);
        for command in &self.commands {
            for parameter in command.completion.parameters() {
                interest = interest.sensor(self.subject, parameter.to_string());
            }
        }
        interest
    }

    fn on_event(&mut self, event: &EngineEvent) -> MonitorOutput {
        let mut output = MonitorOutput::default();
        match event {
            EngineEvent::Sensor(ev) => {
                if ev.source != self.subject {
                    return output;
                }
                let Some(value) = ev.value.as_bool() else {
                    return output;
                };
                self.values.insert(ev.parameter.clone(), value);
                // Completion is checked before expiry: an event stamped at
                // the deadline still completes (the tie goes to the pet).
                self.try_complete(ev.timestamp, &mut output);
                self.expire_if_due(ev.timestamp, &mut output);
            }
            EngineEvent::Speech(ev) => {
                if ev.role != self.speaker {
                    return output;
                }
                let at = ev.timestamp();
                self.expire_if_due(at, &mut output);

                let matched = self
                    .commands
                    .iter()
                    .position(|c| c.vocab.matches(&ev.text));
                let Some(command_idx) = matched else {
                    return output;
                };

                match (&self.session, self.rearm) {
                    (Some(_), RearmPolicy::Ignore) => {
                        // An armed window is never truncated by repeated
                        // speech.
                        debug!("command word ignored while armed");
                    }
                    (Some(_), RearmPolicy::Replace) | (None, _) => {
                        self.arm(command_idx, at, &mut output);
                    }
                }
            }
        }
        output
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.deadline)
    }

    fn on_deadline(&mut self, deadline: DateTime<Utc>) -> MonitorOutput {
        let mut output = MonitorOutput::default();
        // The wake-up carries the deadline itself; strictly past it the
        // window is expired. `>` keeps an exactly-at-deadline completion
        // (processed earlier from the queue) authoritative.
        self.expire_if_due(deadline + Duration::milliseconds(1), &mut output);
        output
    }
}

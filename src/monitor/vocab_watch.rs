//! Stateless vocabulary matchers (scold, self-reference).
//!
//! On each speech event from the configured role, the text is tested
//! against the vocabulary; a match emits one trigger immediately. There
//! is deliberately no debounce here: cooldown policy lives centrally in
//! the coordinator.

use tracing::debug;

use crate::bus::EventInterest;
use crate::config::VocabMonitorConfig;
use crate::error::ConfigError;
use crate::event::{AvatarRole, EngineEvent};
use crate::trigger::{TriggerKind, TriggerSignal};
use crate::vocab::Vocabulary;

use super::{Monitor, MonitorOutput};

/// A scold or self-reference monitor.
#[derive(Debug)]
pub struct VocabWatchMonitor {
    kind: TriggerKind,
    role: AvatarRole,
    target: AvatarRole,
    vocab: Vocabulary,
}

impl VocabWatchMonitor {
    /// Builds a matcher for the given kind from validated config.
    pub fn new(kind: TriggerKind, cfg: &VocabMonitorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            kind,
            role: cfg.role,
            target: cfg.target,
            vocab: Vocabulary::compile(&cfg.words, cfg.match_mode, kind.as_str())?,
        })
    }
}

impl Monitor for VocabWatchMonitor {
    fn name(&self) -> &'static str {
        match self.kind {
            TriggerKind::Scold => "scold",
            TriggerKind::SelfReference => "self-reference",
            _ => "vocab-watch",
        }
    }

    fn interest(&self) -> EventInterest {
        EventInterest::none().speech(self.role)
    }

    fn on_event(&mut self, event: &EngineEvent) -> MonitorOutput {
        let mut output = MonitorOutput::default();
        let EngineEvent::Speech(ev) = event else {
            return output;
        };
        if ev.role != self.role {
            return output;
        }
        let Some(matched) = self.vocab.find(&ev.text) else {
            return output;
        };

        debug!(kind = self.kind.as_str(), word = matched, "vocabulary match");
        output.signals.push(TriggerSignal::new(
            self.kind,
            self.target,
            1.0,
            ev.timestamp(),
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SpeechEvent;
    use crate::vocab::MatchMode;
    use chrono::{TimeZone, Utc};

    fn speech(role: AvatarRole, text: &str) -> EngineEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        EngineEvent::Speech(SpeechEvent {
            role,
            text: text.to_string(),
            started_at: t0,
            ended_at: t0 + chrono::Duration::seconds(1),
        })
    }

    fn scold_monitor(mode: MatchMode) -> VocabWatchMonitor {
        VocabWatchMonitor::new(
            TriggerKind::Scold,
            &VocabMonitorConfig {
                role: AvatarRole::Trainer,
                target: AvatarRole::Pet,
                words: vec!["bad".to_string(), "no".to_string()],
                match_mode: mode,
            },
        )
        .unwrap()
    }

    #[test]
    fn match_emits_one_trigger() {
        let mut m = scold_monitor(MatchMode::WholeWord);
        let out = m.on_event(&speech(AvatarRole::Trainer, "bad dog"));
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].kind, TriggerKind::Scold);
        assert!((out.signals[0].severity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn whole_word_does_not_match_badge() {
        let mut m = scold_monitor(MatchMode::WholeWord);
        let out = m.on_event(&speech(AvatarRole::Trainer, "nice badge"));
        assert!(out.signals.is_empty());
    }

    #[test]
    fn wrong_role_is_ignored() {
        let mut m = scold_monitor(MatchMode::WholeWord);
        let out = m.on_event(&speech(AvatarRole::Pet, "bad dog"));
        assert!(out.signals.is_empty());
    }

    #[test]
    fn self_reference_defaults_catch_first_person() {
        let mut m = VocabWatchMonitor::new(
            TriggerKind::SelfReference,
            &VocabMonitorConfig::self_reference_default(),
        )
        .unwrap();

        let out = m.on_event(&speech(AvatarRole::Pet, "I'm going over there"));
        assert_eq!(out.signals.len(), 1);

        let out = m.on_event(&speech(AvatarRole::Pet, "this one wants treats"));
        assert!(out.signals.is_empty());
    }

    #[test]
    fn no_debounce_at_this_layer() {
        let mut m = scold_monitor(MatchMode::WholeWord);
        for _ in 0..3 {
            let out = m.on_event(&speech(AvatarRole::Trainer, "no"));
            assert_eq!(out.signals.len(), 1);
        }
    }
}

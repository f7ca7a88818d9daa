//! Boolean fill/drain meters (focus, proximity).
//!
//! A meter is a bounded scalar driven by a set of OR-combined boolean
//! parameters: while the combined condition holds it fills, otherwise it
//! drains. `dt` is measured between consecutive watched updates, so a
//! transport that goes quiet freezes the meter instead of draining it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::bus::EventInterest;
use crate::config::{DifficultyScaling, MeterConfig};
use crate::error::ConfigError;
use crate::event::{AvatarRole, EngineEvent};
use crate::status::StatusEvent;
use crate::trigger::{TriggerKind, TriggerSignal};
use crate::vocab::{MatchMode, Vocabulary};

use super::{Monitor, MonitorOutput};

/// A focus or proximity meter monitor.
#[derive(Debug)]
pub struct MeterMonitor {
    kind: TriggerKind,
    source: AvatarRole,
    target: AvatarRole,
    watched: Vec<String>,
    fill_rate: f64,
    drain_rate: f64,
    max: f64,
    recovery_level: f64,
    staleness: Duration,
    penalty: Option<Penalty>,

    level: f64,
    last_update: Option<DateTime<Utc>>,
    values: HashMap<String, bool>,
    stall_reported: bool,
}

#[derive(Debug)]
struct Penalty {
    role: AvatarRole,
    amount: f64,
    vocab: Vocabulary,
}

impl MeterMonitor {
    /// Builds a meter from validated config.
    ///
    /// `origin` anchors the first `dt` measurement: the interval between
    /// session start and the first watched update counts, which also
    /// keeps replays deterministic when the caller fixes the origin.
    pub fn new(
        kind: TriggerKind,
        cfg: &MeterConfig,
        difficulty: &DifficultyScaling,
        origin: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let penalty = if cfg.speech_penalty > 0.0 {
            Some(Penalty {
                role: cfg.penalty_role,
                amount: cfg.speech_penalty,
                vocab: Vocabulary::compile(
                    &cfg.penalty_words,
                    MatchMode::WholeWord,
                    &format!("{}.penalty_words", kind.as_str()),
                )?,
            })
        } else {
            None
        };

        Ok(Self {
            kind,
            source: cfg.source,
            target: cfg.target,
            watched: cfg.parameters.clone(),
            fill_rate: cfg.fill_rate * difficulty.rate_scale,
            drain_rate: cfg.drain_rate * difficulty.rate_scale,
            max: cfg.max,
            recovery_level: cfg.recovery_level,
            staleness: Duration::milliseconds(
                i64::try_from(cfg.staleness_ms).unwrap_or(i64::MAX),
            ),
            penalty,
            level: cfg.max,
            last_update: Some(origin),
            values: HashMap::new(),
            stall_reported: false,
        })
    }

    /// Current meter level (exposed for diagnostics and tests).
    #[must_use]
    pub const fn level(&self) -> f64 {
        self.level
    }

    fn engaged(&self) -> bool {
        self.watched
            .iter()
            .any(|p| self.values.get(p).copied().unwrap_or(false))
    }

    fn apply_elapsed(&mut self, now: DateTime<Utc>, output: &mut MonitorOutput) {
        let Some(prev) = self.last_update else {
            self.last_update = Some(now);
            return;
        };

        let gap = now - prev;
        if gap > self.staleness {
            // Signal went quiet: freeze rather than guess, and tell the
            // operator once per stall.
            if !self.stall_reported {
                self.stall_reported = true;
                output.status.push(StatusEvent::SignalLost {
                    role: self.source,
                    parameter: self.watched[0].clone(),
                    last_seen: prev,
                });
                debug!(
                    kind = self.kind.as_str(),
                    gap_ms = gap.num_milliseconds(),
                    "meter input stale, freezing"
                );
            }
            self.last_update = Some(now);
            return;
        }
        self.stall_reported = false;

        let dt = gap.num_milliseconds().max(0) as f64 / 1_000.0;
        let delta = if self.engaged() {
            self.fill_rate * dt
        } else {
            -self.drain_rate * dt
        };
        self.level = (self.level + delta).clamp(0.0, self.max);
        self.last_update = Some(now);
    }

    fn check_zero_crossing(&mut self, at: DateTime<Utc>, output: &mut MonitorOutput) {
        if self.level > 0.0 {
            return;
        }
        // One signal per crossing: the reset lifts the level off zero so
        // subsequent updates start a fresh descent.
        output.signals.push(TriggerSignal::new(
            self.kind,
            self.target,
            1.0,
            at,
        ));
        self.level = self.recovery_level;
    }
}

impl Monitor for MeterMonitor {
    fn name(&self) -> &'static str {
        match self.kind {
            TriggerKind::Focus => "meter-focus",
            TriggerKind::Proximity => "meter-proximity",
            _ => "meter",
        }
    }

    fn interest(&self) -> EventInterest {
        let mut interest = EventInterest::none();
        for parameter in &self.watched {
            interest = interest.sensor(self.source, parameter.clone());
        }
        if let Some(penalty) = &self.penalty {
            interest = interest.speech(penalty.role);
        }
        interest
    }

    fn on_event(&mut self, event: &EngineEvent) -> MonitorOutput {
        let mut output = MonitorOutput::default();
        match event {
            EngineEvent::Sensor(ev) => {
                if ev.source != self.source || !self.watched.contains(&ev.parameter) {
                    return output;
                }
                let Some(value) = ev.value.as_bool() else {
                    return output;
                };
                // The elapsed interval is charged at the previous state;
                // the new reading takes effect from this tick onward.
                self.apply_elapsed(ev.timestamp, &mut output);
                self.values.insert(ev.parameter.clone(), value);
                self.check_zero_crossing(ev.timestamp, &mut output);
            }
            EngineEvent::Speech(ev) => {
                let Some(penalty) = &self.penalty else {
                    return output;
                };
                if ev.role != penalty.role || !penalty.vocab.matches(&ev.text) {
                    return output;
                }
                self.level = (self.level - penalty.amount).clamp(0.0, self.max);
                self.check_zero_crossing(ev.timestamp(), &mut output);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SensorEvent, SpeechEvent};
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn meter_cfg(fill: f64, drain: f64, max: f64, recovery: f64) -> MeterConfig {
        MeterConfig {
            parameters: vec!["Trainer/EyeLeft".to_string()],
            source: AvatarRole::Pet,
            target: AvatarRole::Pet,
            fill_rate: fill,
            drain_rate: drain,
            max,
            recovery_level: recovery,
            staleness_ms: 60_000,
            speech_penalty: 0.0,
            penalty_words: Vec::new(),
            penalty_role: AvatarRole::Trainer,
        }
    }

    fn monitor(cfg: &MeterConfig) -> MeterMonitor {
        MeterMonitor::new(
            TriggerKind::Focus,
            cfg,
            &DifficultyScaling::default(),
            origin(),
        )
        .unwrap()
    }

    fn bool_update(monitor_cfg: &MeterConfig, value: bool, secs: i64) -> EngineEvent {
        EngineEvent::Sensor(SensorEvent::boolean(
            monitor_cfg.source,
            monitor_cfg.parameters[0].clone(),
            value,
            origin() + Duration::seconds(secs),
        ))
    }

    #[test]
    fn level_stays_within_bounds() {
        let cfg = meter_cfg(5.0, 5.0, 1.0, 0.5);
        let mut m = monitor(&cfg);

        // Long engaged stretch cannot overflow.
        m.on_event(&bool_update(&cfg, true, 1));
        for t in 2..20 {
            m.on_event(&bool_update(&cfg, true, t));
            assert!(m.level() <= 1.0 && m.level() >= 0.0);
        }
    }

    #[test]
    fn exactly_one_trigger_per_zero_crossing() {
        // fill=0, drain=1, max=10: ten false updates 1s apart drain the
        // meter to zero on the tenth.
        let cfg = meter_cfg(0.0, 1.0, 10.0, 4.0);
        let mut m = monitor(&cfg);

        let mut signals = Vec::new();
        for t in 1..=10 {
            let out = m.on_event(&bool_update(&cfg, false, t));
            signals.extend(out.signals);
        }

        assert_eq!(signals.len(), 1, "expected a single zero-crossing trigger");
        assert_eq!(signals[0].kind, TriggerKind::Focus);
        assert!((signals[0].severity - 1.0).abs() < f64::EPSILON);
        assert!((m.level() - 4.0).abs() < 1e-9, "level resets to recovery");

        // Further drain starts a fresh descent, no storm at zero.
        let out = m.on_event(&bool_update(&cfg, false, 11));
        assert!(out.signals.is_empty());
        assert!((m.level() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn stale_gap_freezes_instead_of_draining() {
        let cfg = MeterConfig {
            staleness_ms: 2_000,
            ..meter_cfg(0.0, 1.0, 10.0, 5.0)
        };
        let mut m = monitor(&cfg);

        m.on_event(&bool_update(&cfg, false, 1));
        let level_before = m.level();

        // A 30s gap exceeds the 2s staleness threshold: no drain, one
        // SignalLost status.
        let out = m.on_event(&bool_update(&cfg, false, 31));
        assert!((m.level() - level_before).abs() < 1e-9);
        assert_eq!(out.status.len(), 1);
        assert!(matches!(out.status[0], StatusEvent::SignalLost { .. }));

        // Updates resume: draining continues from the frozen level.
        let out = m.on_event(&bool_update(&cfg, false, 32));
        assert!(out.status.is_empty());
        assert!((m.level() - (level_before - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn fill_and_drain_follow_combined_state() {
        let cfg = meter_cfg(1.0, 1.0, 10.0, 5.0);
        let mut m = monitor(&cfg);

        // Drain 3s while disengaged (origin anchors the first interval).
        m.on_event(&bool_update(&cfg, true, 3));
        assert!((m.level() - 7.0).abs() < 1e-9);

        // Engaged for 2s: fills back.
        m.on_event(&bool_update(&cfg, false, 5));
        assert!((m.level() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn speech_penalty_reduces_level() {
        let cfg = MeterConfig {
            speech_penalty: 2.5,
            penalty_words: vec!["rex".to_string()],
            ..meter_cfg(0.0, 1.0, 10.0, 5.0)
        };
        let mut m = monitor(&cfg);

        let out = m.on_event(&EngineEvent::Speech(SpeechEvent {
            role: AvatarRole::Trainer,
            text: "Rex! Over here".to_string(),
            started_at: origin() + Duration::seconds(1),
            ended_at: origin() + Duration::seconds(2),
        }));
        assert!(out.signals.is_empty());
        assert!((m.level() - 7.5).abs() < 1e-9);

        // Unrelated speech does nothing.
        let out = m.on_event(&EngineEvent::Speech(SpeechEvent {
            role: AvatarRole::Trainer,
            text: "good job".to_string(),
            started_at: origin() + Duration::seconds(3),
            ended_at: origin() + Duration::seconds(4),
        }));
        assert!((m.level() - 7.5).abs() < 1e-9);
        assert!(out.signals.is_empty());
    }

    #[test]
    fn replay_is_deterministic() {
        let cfg = meter_cfg(0.5, 1.0, 10.0, 4.0);
        let sequence: Vec<EngineEvent> = (1..=30)
            .map(|t| bool_update(&cfg, t % 3 == 0, t))
            .collect();

        let run = |events: &[EngineEvent]| {
            let mut m = monitor(&cfg);
            let mut signals = Vec::new();
            for ev in events {
                signals.extend(m.on_event(ev).signals);
            }
            (signals, m.level())
        };

        let first = run(&sequence);
        let second = run(&sequence);
        assert_eq!(first.0, second.0);
        assert!((first.1 - second.1).abs() < f64::EPSILON);
    }
}

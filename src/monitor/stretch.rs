//! Continuous threshold watcher with per-monitor cooldown.
//!
//! Watches float parameters (ear/tail stretch, depth) and fires when a
//! reading exceeds the threshold, with severity proportional to how far
//! past the threshold it landed. This is the one monitor whose severity
//! is not binary.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::bus::EventInterest;
use crate::config::{DifficultyScaling, StretchConfig};
use crate::event::{AvatarRole, EngineEvent};
use crate::trigger::{TriggerKind, TriggerSignal};

use super::{Monitor, MonitorOutput};

/// The stretch monitor.
#[derive(Debug)]
pub struct StretchMonitor {
    source: AvatarRole,
    target_role: AvatarRole,
    watched: Vec<WatchedParameter>,
    threshold: f64,
    max: f64,
    cooldown: Duration,

    cooldown_until: Option<DateTime<Utc>>,
    guards: HashMap<String, bool>,
}

#[derive(Debug)]
struct WatchedParameter {
    parameter: String,
    guard: Option<String>,
}

impl StretchMonitor {
    /// Builds the monitor from validated config. The cooldown is the
    /// configured interval scaled by `cooldown_scale`.
    #[must_use]
    pub fn new(cfg: &StretchConfig, difficulty: &DifficultyScaling) -> Self {
        let cooldown_ms = (cfg.cooldown_ms as f64 * difficulty.cooldown_scale).max(1.0);
        Self {
            source: cfg.source,
            target_role: cfg.target,
            watched: cfg
                .targets
                .iter()
                .map(|t| WatchedParameter {
                    parameter: t.parameter.clone(),
                    guard: t.guard.clone(),
                })
                .collect(),
            threshold: cfg.threshold,
            max: cfg.max,
            cooldown: Duration::milliseconds(cooldown_ms as i64),
            cooldown_until: None,
            guards: HashMap::new(),
        }
    }

    fn severity(&self, value: f64) -> f64 {
        ((value - self.threshold) / (self.max - self.threshold)).clamp(0.0, 1.0)
    }

    fn guard_open(&self, watched: &WatchedParameter) -> bool {
        match &watched.guard {
            Some(guard) => self.guards.get(guard).copied().unwrap_or(false),
            None => true,
        }
    }
}

impl Monitor for StretchMonitor {
    fn name(&self) -> &'static str {
        "stretch"
    }

    fn interest(&self) -> EventInterest {
        let mut interest = EventInterest::none();
        for watched in &self.watched {
            interest = interest.sensor(self.source, watched.parameter.clone());
            if let Some(guard) = &watched.guard {
                interest = interest.sensor(self.source, guard.clone());
            }
        }
        interest
    }

    fn on_event(&mut self, event: &EngineEvent) -> MonitorOutput {
        let mut output = MonitorOutput::default();
        let EngineEvent::Sensor(ev) = event else {
            return output;
        };
        if ev.source != self.source {
            return output;
        }

        // Guard parameters are boolean and tracked by name.
        if let Some(value) = ev.value.as_bool() {
            if self
                .watched
                .iter()
                .any(|w| w.guard.as_deref() == Some(ev.parameter.as_str()))
            {
                self.guards.insert(ev.parameter.clone(), value);
            }
            return output;
        }

        let Some(value) = ev.value.as_float() else {
            return output;
        };
        let Some(watched) = self.watched.iter().find(|w| w.parameter == ev.parameter) else {
            return output;
        };

        if value <= self.threshold || !self.guard_open(watched) {
            return output;
        }
        if self
            .cooldown_until
            .is_some_and(|until| ev.timestamp < until)
        {
            return output;
        }

        let severity = self.severity(value);
        debug!(
            parameter = ev.parameter.as_str(),
            value,
            severity,
            "stretch threshold exceeded"
        );
        output.signals.push(TriggerSignal::new(
            TriggerKind::Stretch,
            self.target_role,
            severity,
            ev.timestamp,
        ));
        self.cooldown_until = Some(ev.timestamp + self.cooldown);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StretchTarget;
    use crate::event::SensorEvent;
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn config() -> StretchConfig {
        StretchConfig {
            source: AvatarRole::Pet,
            target: AvatarRole::Pet,
            targets: vec![
                StretchTarget {
                    parameter: "LeftEar_Stretch".to_string(),
                    guard: Some("LeftEar_IsGrabbed".to_string()),
                },
                StretchTarget {
                    parameter: "Tail_Stretch".to_string(),
                    guard: None,
                },
            ],
            threshold: 0.5,
            max: 1.0,
            cooldown_ms: 2_000,
        }
    }

    fn monitor() -> StretchMonitor {
        StretchMonitor::new(&config(), &DifficultyScaling::default())
    }

    fn float(parameter: &str, value: f64, at_ms: i64) -> EngineEvent {
        EngineEvent::Sensor(SensorEvent::continuous(
            AvatarRole::Pet,
            parameter,
            value,
            origin() + Duration::milliseconds(at_ms),
        ))
    }

    fn boolean(parameter: &str, value: bool, at_ms: i64) -> EngineEvent {
        EngineEvent::Sensor(SensorEvent::boolean(
            AvatarRole::Pet,
            parameter,
            value,
            origin() + Duration::milliseconds(at_ms),
        ))
    }

    #[test]
    fn severity_scales_with_overshoot() {
        let mut m = monitor();
        let out = m.on_event(&float("Tail_Stretch", 0.75, 0));
        assert_eq!(out.signals.len(), 1);
        assert!((out.signals[0].severity - 0.5).abs() < 1e-9);

        let mut m = monitor();
        let out = m.on_event(&float("Tail_Stretch", 2.0, 0));
        assert!((out.signals[0].severity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn below_threshold_is_silent() {
        let mut m = monitor();
        let out = m.on_event(&float("Tail_Stretch", 0.5, 0));
        assert!(out.signals.is_empty());
    }

    #[test]
    fn cooldown_suppresses_repeat_fires() {
        let mut m = monitor();
        assert_eq!(m.on_event(&float("Tail_Stretch", 0.9, 0)).signals.len(), 1);
        assert!(m.on_event(&float("Tail_Stretch", 0.9, 500)).signals.is_empty());
        assert!(m.on_event(&float("Tail_Stretch", 0.9, 1_999)).signals.is_empty());
        assert_eq!(
            m.on_event(&float("Tail_Stretch", 0.9, 2_000)).signals.len(),
            1,
            "cooldown elapsed"
        );
    }

    #[test]
    fn guarded_parameter_requires_grab() {
        let mut m = monitor();

        // Stretched but not grabbed: the avatar physics can report
        // residual stretch, which must not fire.
        assert!(m.on_event(&float("LeftEar_Stretch", 0.9, 0)).signals.is_empty());

        m.on_event(&boolean("LeftEar_IsGrabbed", true, 100));
        assert_eq!(
            m.on_event(&float("LeftEar_Stretch", 0.9, 200)).signals.len(),
            1
        );

        m.on_event(&boolean("LeftEar_IsGrabbed", false, 2_500));
        assert!(m.on_event(&float("LeftEar_Stretch", 0.9, 3_000)).signals.is_empty());
    }
}

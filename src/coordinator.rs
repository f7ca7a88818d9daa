//! Trigger coordinator: fan-in, toggles, cooldowns, sink dispatch.
//!
//! All delivery policy lives here so the monitors can stay simple:
//! they emit signals unconditionally, and the coordinator decides which
//! ones become stimulus commands. Toggling a mode mid-session therefore
//! needs no monitor restart, and cooldown check-and-update is atomic per
//! target because a single worker owns the cooldown table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{DifficultyScaling, IntensityConfig, ModesConfig, StimulusTarget};
use crate::event::AvatarRole;
use crate::sink::{StimulusCommand, StimulusSink};
use crate::status::StatusEvent;
use crate::trigger::{TriggerKind, TriggerSignal};

/// Runtime per-mode enable flags, shared with the operator layer.
///
/// Monitors emit signals regardless of these flags; enforcement is
/// centralized here so flipping a flag takes effect on the next signal.
#[derive(Debug)]
pub struct ModeToggles {
    flags: [AtomicBool; 6],
}

impl ModeToggles {
    /// Initializes flags from the session config.
    #[must_use]
    pub fn new(modes: &ModesConfig) -> Self {
        let flags = std::array::from_fn(|_| AtomicBool::new(false));
        let toggles = Self { flags };
        for kind in TriggerKind::ALL {
            toggles.set(kind, modes.is_enabled(kind));
        }
        toggles
    }

    /// Enables or disables a trigger kind.
    pub fn set(&self, kind: TriggerKind, enabled: bool) {
        self.flags[kind.index()].store(enabled, Ordering::Release);
    }

    /// Whether a trigger kind is currently enabled.
    #[must_use]
    pub fn is_enabled(&self, kind: TriggerKind) -> bool {
        self.flags[kind.index()].load(Ordering::Acquire)
    }
}

/// Policy inputs the coordinator worker needs.
pub(crate) struct CoordinatorSettings {
    pub intensity: IntensityConfig,
    pub min_interval: Duration,
    pub strength_scale: f64,
    pub duration_scale: f64,
    pub targets: HashMap<AvatarRole, StimulusTarget>,
}

impl CoordinatorSettings {
    pub(crate) fn new(
        intensity: IntensityConfig,
        min_interval_ms: u64,
        difficulty: &DifficultyScaling,
        targets: &[StimulusTarget],
    ) -> Self {
        let scaled_ms = (min_interval_ms as f64 * difficulty.cooldown_scale).max(1.0);
        Self {
            intensity,
            min_interval: Duration::milliseconds(scaled_ms as i64),
            strength_scale: difficulty.strength_scale,
            duration_scale: difficulty.duration_scale,
            targets: targets.iter().map(|t| (t.role, t.clone())).collect(),
        }
    }

    /// Maps `(kind, severity)` to a concrete command.
    ///
    /// Severity scales within the kind's band: full severity reaches the
    /// band ceiling (before strength scaling), low severity sinks to the
    /// band floor.
    fn command_for(&self, signal: &TriggerSignal) -> Option<StimulusCommand> {
        let band = self.intensity.band(signal.kind);
        let raw = signal.severity * f64::from(band.max) * self.strength_scale;
        let intensity = raw
            .round()
            .clamp(f64::from(band.min), f64::from(band.max)) as u8;

        let duration_ms = (band.duration_ms as f64 * self.duration_scale).max(1.0) as u64;
        StimulusCommand::new(intensity, StdDuration::from_millis(duration_ms)).ok()
    }
}

/// Per-target cooldown bookkeeping.
///
/// Owned by the coordinator worker exclusively; the single consumer
/// serializes check-and-update, so two near-simultaneous signals can
/// never both pass the same window.
#[derive(Debug, Default)]
struct CooldownTable {
    last_fire: HashMap<AvatarRole, DateTime<Utc>>,
}

impl CooldownTable {
    /// Atomically checks the window and, when open, claims it.
    fn try_claim(
        &mut self,
        target: AvatarRole,
        at: DateTime<Utc>,
        min_interval: Duration,
    ) -> bool {
        if let Some(last) = self.last_fire.get(&target) {
            if at - *last < min_interval {
                return false;
            }
        }
        self.last_fire.insert(target, at);
        true
    }
}

/// Spawns the coordinator worker.
///
/// The worker exits when every signal sender is gone. Once `stopped` is
/// set, remaining in-flight signals are discarded without reaching the
/// sink.
pub(crate) fn spawn_coordinator(
    settings: CoordinatorSettings,
    toggles: Arc<ModeToggles>,
    sink: Arc<dyn StimulusSink>,
    signal_rx: Receiver<TriggerSignal>,
    status_tx: Sender<StatusEvent>,
    stopped: Arc<AtomicBool>,
    suppressed: Arc<AtomicU64>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("leash-coordinator".to_string())
        .spawn(move || {
            let mut cooldowns = CooldownTable::default();

            while let Ok(signal) = signal_rx.recv() {
                if stopped.load(Ordering::Acquire) {
                    continue;
                }
                dispatch(
                    &settings,
                    &toggles,
                    sink.as_ref(),
                    &status_tx,
                    &mut cooldowns,
                    &suppressed,
                    &signal,
                );
            }
            debug!("coordinator worker stopped");
        })
        .expect("failed to spawn leash coordinator worker")
}

fn dispatch(
    settings: &CoordinatorSettings,
    toggles: &ModeToggles,
    sink: &dyn StimulusSink,
    status_tx: &Sender<StatusEvent>,
    cooldowns: &mut CooldownTable,
    suppressed: &AtomicU64,
    signal: &TriggerSignal,
) {
    if !toggles.is_enabled(signal.kind) {
        debug!(kind = signal.kind.as_str(), "trigger discarded: mode disabled");
        suppressed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if !cooldowns.try_claim(signal.role, signal.at, settings.min_interval) {
        debug!(
            kind = signal.kind.as_str(),
            role = signal.role.as_str(),
            "trigger discarded: cooldown"
        );
        suppressed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let Some(target) = settings.targets.get(&signal.role) else {
        // Validation guarantees a target per referenced role; an absent
        // entry here means the config and monitors disagree.
        warn!(role = signal.role.as_str(), "no stimulus target for role");
        return;
    };

    let Some(command) = settings.command_for(signal) else {
        warn!(kind = signal.kind.as_str(), "unmappable trigger signal");
        return;
    };

    match sink.deliver(target, command) {
        Ok(()) => {
            info!(
                kind = signal.kind.as_str(),
                role = signal.role.as_str(),
                intensity = command.intensity,
                duration_ms = command.duration.as_millis() as u64,
                "stimulus delivered"
            );
            let _ = status_tx.try_send(StatusEvent::StimulusDelivered {
                kind: signal.kind,
                role: signal.role,
                intensity: command.intensity,
                duration_ms: command.duration.as_millis() as u64,
                at: signal.at,
            });
        }
        Err(err) => {
            // Never retried here: re-sending a physical stimulus without
            // operator awareness is unsafe. Surface and move on.
            warn!(
                kind = signal.kind.as_str(),
                role = signal.role.as_str(),
                error = %err,
                "stimulus delivery failed"
            );
            let _ = status_tx.try_send(StatusEvent::SinkFailure {
                kind: signal.kind,
                role: signal.role,
                message: err.to_string(),
                at: signal.at,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntensityBand;
    use crate::error::SinkError;
    use chrono::TimeZone;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(AvatarRole, StimulusCommand)>>,
        fail: AtomicBool,
    }

    impl StimulusSink for RecordingSink {
        fn deliver(
            &self,
            target: &StimulusTarget,
            command: StimulusCommand,
        ) -> Result<(), SinkError> {
            if self.fail.load(Ordering::Acquire) {
                return Err(SinkError::Unreachable {
                    message: "device offline".to_string(),
                });
            }
            self.delivered.lock().unwrap().push((target.role, command));
            Ok(())
        }
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings::new(
            IntensityConfig::default(),
            1_000,
            &DifficultyScaling::default(),
            &[StimulusTarget {
                role: AvatarRole::Pet,
                user_id: "pet-device".to_string(),
                api_key: "key".to_string(),
            }],
        )
    }

    fn signal(kind: TriggerKind, severity: f64, at_ms: i64) -> TriggerSignal {
        TriggerSignal::new(
            kind,
            AvatarRole::Pet,
            severity,
            origin() + Duration::milliseconds(at_ms),
        )
    }

    struct Harness {
        sink: Arc<RecordingSink>,
        toggles: Arc<ModeToggles>,
        settings: CoordinatorSettings,
        cooldowns: CooldownTable,
        status_tx: Sender<StatusEvent>,
        status_rx: Receiver<StatusEvent>,
        suppressed: Arc<AtomicU64>,
    }

    impl Harness {
        fn new() -> Self {
            let (status_tx, status_rx) = bounded(64);
            Self {
                sink: Arc::new(RecordingSink::default()),
                toggles: Arc::new(ModeToggles::new(&ModesConfig::default())),
                settings: settings(),
                cooldowns: CooldownTable::default(),
                status_tx,
                status_rx,
                suppressed: Arc::new(AtomicU64::new(0)),
            }
        }

        fn dispatch(&mut self, signal: &TriggerSignal) {
            dispatch(
                &self.settings,
                &self.toggles,
                self.sink.as_ref(),
                &self.status_tx,
                &mut self.cooldowns,
                &self.suppressed,
                signal,
            );
        }

        fn delivered(&self) -> Vec<(AvatarRole, StimulusCommand)> {
            self.sink.delivered.lock().unwrap().clone()
        }
    }

    #[test]
    fn cooldown_coalesces_bursts() {
        let mut h = Harness::new();

        h.dispatch(&signal(TriggerKind::Scold, 1.0, 0));
        h.dispatch(&signal(TriggerKind::Scold, 1.0, 100));

        assert_eq!(h.delivered().len(), 1, "second trigger within min_interval");
        assert_eq!(h.suppressed.load(Ordering::Relaxed), 1);

        h.dispatch(&signal(TriggerKind::Scold, 1.0, 1_000));
        assert_eq!(h.delivered().len(), 2, "window reopened at min_interval");
    }

    #[test]
    fn disabled_mode_is_discarded_centrally() {
        let mut h = Harness::new();
        h.toggles.set(TriggerKind::Scold, false);

        h.dispatch(&signal(TriggerKind::Scold, 1.0, 0));
        assert!(h.delivered().is_empty());
        assert_eq!(h.suppressed.load(Ordering::Relaxed), 1);

        // Re-enabling needs no restart: the next signal goes through.
        h.toggles.set(TriggerKind::Scold, true);
        h.dispatch(&signal(TriggerKind::Scold, 1.0, 100));
        assert_eq!(h.delivered().len(), 1);
    }

    #[test]
    fn severity_maps_into_band() {
        let mut h = Harness::new();
        h.settings.intensity.stretch = IntensityBand {
            min: 20,
            max: 40,
            duration_ms: 500,
        };

        h.dispatch(&signal(TriggerKind::Stretch, 1.0, 0));
        h.dispatch(&signal(TriggerKind::Stretch, 0.5, 2_000));
        h.dispatch(&signal(TriggerKind::Stretch, 0.0, 4_000));

        let delivered = h.delivered();
        assert_eq!(delivered[0].1.intensity, 40, "full severity hits the ceiling");
        assert_eq!(delivered[1].1.intensity, 20, "half severity clamps to floor");
        assert_eq!(delivered[2].1.intensity, 20, "zero severity sits on the floor");
    }

    #[test]
    fn strength_scale_shapes_output_within_band() {
        let mut h = Harness::new();
        h.settings.strength_scale = 0.5;
        h.settings.intensity.focus = IntensityBand {
            min: 0,
            max: 50,
            duration_ms: 200,
        };

        h.dispatch(&signal(TriggerKind::Focus, 1.0, 0));
        assert_eq!(h.delivered()[0].1.intensity, 25);
    }

    #[test]
    fn sink_failure_is_surfaced_not_retried() {
        let mut h = Harness::new();
        h.sink.fail.store(true, Ordering::Release);

        h.dispatch(&signal(TriggerKind::Command, 1.0, 0));
        assert!(h.delivered().is_empty());

        let status: Vec<StatusEvent> = h.status_rx.try_iter().collect();
        assert_eq!(status.len(), 1);
        let StatusEvent::SinkFailure { message, kind, .. } = &status[0] else {
            panic!("expected SinkFailure, got {:?}", status[0]);
        };
        assert_eq!(*kind, TriggerKind::Command);
        assert!(message.contains("device offline"));

        // The failed attempt still consumed the window: no silent
        // immediate re-fire.
        h.sink.fail.store(false, Ordering::Release);
        h.dispatch(&signal(TriggerKind::Command, 1.0, 100));
        assert!(h.delivered().is_empty());
    }

    #[test]
    fn worker_discards_signals_after_stop() {
        let (signal_tx, signal_rx) = bounded::<TriggerSignal>(16);
        let (status_tx, status_rx) = bounded::<StatusEvent>(16);
        let sink = Arc::new(RecordingSink::default());
        let stopped = Arc::new(AtomicBool::new(false));

        let handle = spawn_coordinator(
            settings(),
            Arc::new(ModeToggles::new(&ModesConfig::default())),
            Arc::clone(&sink) as Arc<dyn StimulusSink>,
            signal_rx,
            status_tx,
            Arc::clone(&stopped),
            Arc::new(AtomicU64::new(0)),
        );

        stopped.store(true, Ordering::Release);
        signal_tx.send(signal(TriggerKind::Scold, 1.0, 0)).unwrap();
        drop(signal_tx);
        handle.join().unwrap();

        assert!(sink.delivered.lock().unwrap().is_empty());
        assert!(status_rx.try_iter().next().is_none());
    }
}

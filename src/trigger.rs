//! Trigger signal types emitted by monitors.
//!
//! A trigger is a decision event indicating a stimulus should be
//! considered. Signals are transient: the coordinator consumes them
//! immediately, applying toggles and cooldowns centrally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AvatarRole;

/// The monitor kinds that can request a stimulus.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Focus,
    Proximity,
    Command,
    Scold,
    SelfReference,
    Stretch,
}

impl TriggerKind {
    /// Every kind, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Focus,
        Self::Proximity,
        Self::Command,
        Self::Scold,
        Self::SelfReference,
        Self::Stretch,
    ];

    /// Stable lowercase name, used in logs and configuration keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Proximity => "proximity",
            Self::Command => "command",
            Self::Scold => "scold",
            Self::SelfReference => "self_reference",
            Self::Stretch => "stretch",
        }
    }

    /// Index into per-kind tables (toggle flags, intensity bands).
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Focus => 0,
            Self::Proximity => 1,
            Self::Command => 2,
            Self::Scold => 3,
            Self::SelfReference => 4,
            Self::Stretch => 5,
        }
    }
}

/// A trigger signal emitted by a monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSignal {
    /// Which monitor kind raised the signal.
    pub kind: TriggerKind,
    /// The avatar whose device should receive the stimulus.
    pub role: AvatarRole,
    /// Severity in `[0, 1]`; scales stimulus intensity. Binary monitors
    /// always emit `1.0`.
    pub severity: f64,
    /// Event time the decision was made at (not arrival time).
    pub at: DateTime<Utc>,
}

impl TriggerSignal {
    /// Creates a signal, clamping severity into `[0, 1]`.
    #[must_use]
    pub fn new(kind: TriggerKind, role: AvatarRole, severity: f64, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            role,
            severity: severity.clamp(0.0, 1.0),
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_clamped() {
        let now = Utc::now();
        let high = TriggerSignal::new(TriggerKind::Stretch, AvatarRole::Pet, 1.7, now);
        assert!((high.severity - 1.0).abs() < f64::EPSILON);

        let low = TriggerSignal::new(TriggerKind::Stretch, AvatarRole::Pet, -0.3, now);
        assert!(low.severity.abs() < f64::EPSILON);
    }

    #[test]
    fn kind_indexes_are_distinct() {
        let mut seen = [false; 6];
        for kind in TriggerKind::ALL {
            let idx = kind.index();
            assert!(!seen[idx], "duplicate index for {kind:?}");
            seen[idx] = true;
        }
    }
}

//! Gaze focus tracking: dwell detection and grace-period hysteresis.
//!
//! Turns a per-tick stream of gaze samples and hit-test results into a
//! clean focus lifecycle for a single tracked subject:
//!
//! ```text
//! Idle ──hit──▶ Dwelling ──dwell elapsed──▶ Highlighted
//!   ▲              │                            │
//!   └── grace ─────┴──────── exceeded ──────────┘
//! ```
//!
//! A missed sample never ends focus by itself; focus ends only once no hit
//! has landed on the target for longer than the grace period. Invalid
//! samples, missing hit results and hits without a target all count as a
//! miss for that tick.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{DWELL_THRESHOLD_SECS, EPSILON, UNFOCUS_GRACE_SECS};
use crate::vec3::Vec3;

// ── Inputs ──────────────────────────────────────────────────

/// Identity of a hit-testable target. Accepts string or integer ids on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawTargetId", into = "String")]
pub struct TargetId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTargetId {
    Text(String),
    Number(u64),
}

impl From<RawTargetId> for TargetId {
    fn from(raw: RawTargetId) -> Self {
        match raw {
            RawTargetId::Text(s) => Self(s),
            RawTargetId::Number(n) => Self(n.to_string()),
        }
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for TargetId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One gaze ray as reported by the eye tracker for a tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub origin: Vec3,
    pub direction: Vec3,
    pub timestamp: f64,
    pub valid: bool,
}

impl GazeSample {
    /// Valid sample; `direction` is normalized.
    pub fn new(origin: Vec3, direction: Vec3, timestamp: f64) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
            timestamp,
            valid: true,
        }
    }

    /// Sample reported while tracking was lost (blink, glare, out of range).
    pub fn invalid(timestamp: f64) -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::FORWARD,
            timestamp,
            valid: false,
        }
    }
}

/// Result of hit-testing a gaze sample against the scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    #[serde(default)]
    pub target: Option<TargetId>,
    pub point: Vec3,
}

impl HitResult {
    pub fn on(target: impl Into<TargetId>, point: Vec3) -> Self {
        Self {
            target: Some(target.into()),
            point,
        }
    }

    /// The ray hit geometry that is not a trackable target.
    pub fn untargeted(point: Vec3) -> Self {
        Self {
            target: None,
            point,
        }
    }
}

// ── Config ──────────────────────────────────────────────────

/// Timing configuration for focus detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Seconds of continuous focus before a target is highlighted.
    pub dwell_threshold_secs: f64,
    /// Seconds without a hit tolerated before focus ends.
    pub unfocus_grace_secs: f64,
    /// Hits farther than this from the gaze origin count as misses.
    pub max_hit_distance: Option<f32>,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            dwell_threshold_secs: DWELL_THRESHOLD_SECS,
            unfocus_grace_secs: UNFOCUS_GRACE_SECS,
            max_hit_distance: None,
        }
    }
}

// ── Outputs ─────────────────────────────────────────────────

/// Focus lifecycle event for a single target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "target", rename_all = "snake_case")]
pub enum FocusEvent {
    FocusStarted(TargetId),
    Highlighted(TargetId),
    FocusEnded(TargetId),
}

impl FocusEvent {
    pub fn target(&self) -> &TargetId {
        match self {
            FocusEvent::FocusStarted(id)
            | FocusEvent::Highlighted(id)
            | FocusEvent::FocusEnded(id) => id,
        }
    }
}

/// What a single `update` changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FocusUpdate {
    Unchanged,
    Started(TargetId),
    Highlighted(TargetId),
    Ended(TargetId),
    /// Gaze jumped straight from one target to another: the old session
    /// ended and the new one started on the same tick.
    Switched { ended: TargetId, started: TargetId },
}

impl FocusUpdate {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FocusUpdate::Unchanged)
    }

    /// Flatten into lifecycle events in emission order.
    pub fn events(self) -> Vec<FocusEvent> {
        match self {
            FocusUpdate::Unchanged => Vec::new(),
            FocusUpdate::Started(id) => vec![FocusEvent::FocusStarted(id)],
            FocusUpdate::Highlighted(id) => vec![FocusEvent::Highlighted(id)],
            FocusUpdate::Ended(id) => vec![FocusEvent::FocusEnded(id)],
            FocusUpdate::Switched { ended, started } => vec![
                FocusEvent::FocusEnded(ended),
                FocusEvent::FocusStarted(started),
            ],
        }
    }
}

/// Coarse phase of the tracker, derived from `FocusState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusPhase {
    Idle,
    Dwelling,
    Highlighted,
}

impl FocusPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusPhase::Idle => "idle",
            FocusPhase::Dwelling => "dwelling",
            FocusPhase::Highlighted => "highlighted",
        }
    }
}

/// Mutable focus state for one subject.
///
/// `dwell_reached` is only ever true while `current_target` is set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FocusState {
    pub current_target: Option<TargetId>,
    pub focus_start_time: f64,
    pub last_hit_time: f64,
    pub dwell_reached: bool,
}

// ── Tracker ─────────────────────────────────────────────────

/// Focus state machine for a single tracked subject.
#[derive(Clone, Debug, Default)]
pub struct GazeFocusTracker {
    config: GazeConfig,
    state: FocusState,
}

impl GazeFocusTracker {
    pub fn new(config: GazeConfig) -> Self {
        Self {
            config,
            state: FocusState::default(),
        }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn current_target(&self) -> Option<&TargetId> {
        self.state.current_target.as_ref()
    }

    pub fn phase(&self) -> FocusPhase {
        match (&self.state.current_target, self.state.dwell_reached) {
            (None, _) => FocusPhase::Idle,
            (Some(_), false) => FocusPhase::Dwelling,
            (Some(_), true) => FocusPhase::Highlighted,
        }
    }

    /// Seconds the current target has been focused, 0 when idle.
    pub fn focus_duration(&self, now: f64) -> f64 {
        if self.state.current_target.is_some() {
            (now - self.state.focus_start_time).max(0.0)
        } else {
            0.0
        }
    }

    /// Advance the state machine by one tick.
    pub fn update(&mut self, sample: &GazeSample, hit: Option<&HitResult>, now: f64) -> FocusUpdate {
        match self.resolve_target(sample, hit) {
            Some(target) => self.on_hit(target, now),
            None => self.on_miss(now),
        }
    }

    /// Drop any active focus immediately, bypassing the grace period.
    pub fn reset(&mut self) -> FocusUpdate {
        match self.state.current_target.take() {
            Some(id) => {
                debug!("focus reset: {id}");
                self.state = FocusState::default();
                FocusUpdate::Ended(id)
            }
            None => FocusUpdate::Unchanged,
        }
    }

    /// The target hit this tick, if the sample counts as a hit at all.
    fn resolve_target(&self, sample: &GazeSample, hit: Option<&HitResult>) -> Option<TargetId> {
        if !sample.valid {
            return None;
        }
        let hit = hit?;
        let target = hit.target.as_ref()?;

        if let Some(max) = self.config.max_hit_distance {
            let distance = sample.origin.distance(hit.point);
            if distance > max {
                debug!("ignoring hit on {target}: {distance:.2} beyond {max:.2}");
                return None;
            }
        }

        Some(target.clone())
    }

    fn on_hit(&mut self, target: TargetId, now: f64) -> FocusUpdate {
        let same = self.state.current_target.as_ref() == Some(&target);

        if same {
            self.state.last_hit_time = now;
            let dwelled = now - self.state.focus_start_time;
            if !self.state.dwell_reached
                && dwelled >= self.config.dwell_threshold_secs - EPSILON
            {
                self.state.dwell_reached = true;
                debug!("highlighted {target} after {dwelled:.3}s");
                return FocusUpdate::Highlighted(target);
            }
            return FocusUpdate::Unchanged;
        }

        let previous = self.state.current_target.take();
        self.begin_focus(target.clone(), now);

        match previous {
            Some(ended) => {
                debug!("focus switched {ended} -> {target}");
                FocusUpdate::Switched {
                    ended,
                    started: target,
                }
            }
            None => {
                debug!("focus started on {target}");
                FocusUpdate::Started(target)
            }
        }
    }

    fn on_miss(&mut self, now: f64) -> FocusUpdate {
        if self.state.current_target.is_none() {
            return FocusUpdate::Unchanged;
        }

        let lost_for = now - self.state.last_hit_time;
        if lost_for <= self.config.unfocus_grace_secs + EPSILON {
            return FocusUpdate::Unchanged;
        }

        let ended = self.state.current_target.take();
        self.state = FocusState::default();
        match ended {
            Some(id) => {
                debug!("focus ended on {id} after {lost_for:.3}s without a hit");
                FocusUpdate::Ended(id)
            }
            None => FocusUpdate::Unchanged,
        }
    }

    fn begin_focus(&mut self, target: TargetId, now: f64) {
        self.state = FocusState {
            current_target: Some(target),
            focus_start_time: now,
            last_hit_time: now,
            dwell_reached: false,
        };
    }
}

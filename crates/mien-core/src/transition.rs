//! Expression transition engine: timed blends with a FIFO request queue.
//!
//! A transition is resumable state advanced by `tick(dt)`, one call per
//! frame. While a transition is in flight, new requests either queue behind
//! it or preempt it. Preemption restarts from whatever the face is showing
//! right now, so the output never jumps.
//!
//! Blending happens on raw (unclamped) vectors. Channel clamping is applied to
//! the output only, which keeps a mid-blend start snapshot exact.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{CHANNEL_MAX, CHANNEL_MIN, DEFAULT_TRANSITION_SECS};
use crate::easing::Easing;
use crate::expression::{ExpressionRequest, ExpressionTable, ExpressionType, FeatureVector};

/// Blending policy and numeric bounds for the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Duration used by requests that do not specify one.
    pub default_transition_secs: f32,
    /// Default policy for `request`: queue behind an active transition (true)
    /// or preempt it (false).
    pub allow_expression_blending: bool,
    pub easing: Easing,
    /// Queue capacity; requests arriving at a full queue are dropped.
    pub max_queue: Option<usize>,
    pub channel_min: f32,
    pub channel_max: f32,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            default_transition_secs: DEFAULT_TRANSITION_SECS,
            allow_expression_blending: true,
            easing: Easing::default(),
            max_queue: None,
            channel_min: CHANNEL_MIN,
            channel_max: CHANNEL_MAX,
        }
    }
}

impl ExpressionConfig {
    /// Channel bounds usable by `f32::clamp`: non-finite bounds fall back to
    /// the defaults and an inverted range is swapped.
    pub fn channel_range(&self) -> (f32, f32) {
        let (lo, hi) = (self.channel_min, self.channel_max);
        if !(lo.is_finite() && hi.is_finite()) {
            (CHANNEL_MIN, CHANNEL_MAX)
        } else if lo > hi {
            (hi, lo)
        } else {
            (lo, hi)
        }
    }
}

/// What happened to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// No transition was active; this one began immediately.
    Started,
    /// Appended to the queue at the given 1-based position.
    Queued { position: usize },
    /// Replaced the in-flight transition toward `abandoned`.
    Preempted { abandoned: ExpressionType },
    /// Queue full; request discarded.
    Dropped,
}

/// Output of one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Feature vector to render this frame, clamped to the channel range.
    pub features: FeatureVector,
    /// Progress of the in-flight transition, `None` when settled.
    pub progress: Option<f32>,
    /// Set on the tick a transition commits.
    pub changed: Option<ExpressionType>,
}

#[derive(Clone, Debug)]
struct Transition {
    target: ExpressionRequest,
    target_features: FeatureVector,
    start_snapshot: FeatureVector,
    progress: f32,
}

/// Owns one character's expression state.
#[derive(Clone, Debug)]
pub struct ExpressionTransitionEngine {
    table: ExpressionTable,
    config: ExpressionConfig,
    baseline: FeatureVector,
    current: ExpressionRequest,
    /// Raw target vector of `current`.
    settled: FeatureVector,
    /// Raw vector produced by the most recent tick.
    rendered: FeatureVector,
    transition: Option<Transition>,
    queue: VecDeque<ExpressionRequest>,
}

impl ExpressionTransitionEngine {
    /// Engine whose rest pose has every known channel at 0.
    pub fn new(table: ExpressionTable, config: ExpressionConfig) -> Self {
        let baseline = table.zero_baseline();
        Self::with_baseline(table, config, baseline)
    }

    /// Engine with an explicit rest pose, captured once and never modified.
    /// Channels missing from `baseline` rest at 0.
    pub fn with_baseline(
        table: ExpressionTable,
        config: ExpressionConfig,
        baseline: FeatureVector,
    ) -> Self {
        let mut config = config;
        let range = config.channel_range();
        if range != (config.channel_min, config.channel_max) {
            warn!(
                "channel range [{}, {}] unusable, clamping to [{}, {}]",
                config.channel_min, config.channel_max, range.0, range.1
            );
            (config.channel_min, config.channel_max) = range;
        }
        let baseline = table.zero_baseline().overlay(&baseline);
        Self {
            table,
            config,
            current: ExpressionRequest::neutral(),
            settled: baseline.clone(),
            rendered: baseline.clone(),
            baseline,
            transition: None,
            queue: VecDeque::new(),
        }
    }

    /// Submit with the configured default policy.
    pub fn request(&mut self, req: ExpressionRequest) -> RequestOutcome {
        let allow_queue = self.config.allow_expression_blending;
        self.request_expression(req, allow_queue)
    }

    /// Convenience for callers that think in (kind, intensity, duration).
    pub fn set_expression(
        &mut self,
        kind: ExpressionType,
        intensity: f32,
        duration_secs: Option<f32>,
    ) -> RequestOutcome {
        let duration = duration_secs.unwrap_or(self.config.default_transition_secs);
        self.request(ExpressionRequest::new(kind, intensity, duration))
    }

    pub fn request_expression(&mut self, req: ExpressionRequest, allow_queue: bool) -> RequestOutcome {
        let req = req.clamped();

        let Some(active) = &self.transition else {
            debug!("starting transition to {} ({:.2})", req.kind, req.intensity);
            self.begin(req);
            return RequestOutcome::Started;
        };

        if allow_queue {
            if let Some(max) = self.config.max_queue
                && self.queue.len() >= max
            {
                warn!("expression queue full ({max}), dropping {}", req.kind);
                return RequestOutcome::Dropped;
            }
            debug!("queued {} behind {}", req.kind, active.target.kind);
            self.queue.push_back(req);
            return RequestOutcome::Queued {
                position: self.queue.len(),
            };
        }

        let abandoned = active.target.kind.clone();
        debug!(
            "preempting {abandoned} at {:.2} with {}",
            active.progress, req.kind
        );
        self.begin(req);
        RequestOutcome::Preempted { abandoned }
    }

    /// Advance the in-flight transition by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> Frame {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let (min, max) = (self.config.channel_min, self.config.channel_max);

        let Some(active) = self.transition.as_mut() else {
            return Frame {
                features: self.settled.clamped(min, max),
                progress: None,
                changed: None,
            };
        };

        let duration = active.target.duration_secs;
        active.progress = if duration > 0.0 {
            (active.progress + dt / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let progress = active.progress;

        let raw = if progress >= 1.0 {
            active.target_features.clone()
        } else {
            let eased = self.config.easing.apply(progress);
            active.start_snapshot.lerp(&active.target_features, eased)
        };
        let features = raw.clamped(min, max);
        self.rendered = raw;

        if progress < 1.0 {
            return Frame {
                features,
                progress: Some(progress),
                changed: None,
            };
        }

        let changed = self.commit();
        Frame {
            features,
            progress: Some(1.0),
            changed,
        }
    }

    pub fn current_type(&self) -> &ExpressionType {
        &self.current.kind
    }

    pub fn current(&self) -> &ExpressionRequest {
        &self.current
    }

    pub fn target_type(&self) -> Option<&ExpressionType> {
        self.transition.as_ref().map(|t| &t.target.kind)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Progress of the in-flight transition.
    pub fn progress(&self) -> Option<f32> {
        self.transition.as_ref().map(|t| t.progress)
    }

    /// Snapshot the in-flight transition started from.
    pub fn start_snapshot(&self) -> Option<&FeatureVector> {
        self.transition.as_ref().map(|t| &t.start_snapshot)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &ExpressionRequest> {
        self.queue.iter()
    }

    /// Discard pending requests; the in-flight transition is unaffected.
    pub fn clear_queue(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }

    /// Clamped vector of the committed expression.
    pub fn settled(&self) -> FeatureVector {
        self.settled
            .clamped(self.config.channel_min, self.config.channel_max)
    }

    pub fn baseline(&self) -> &FeatureVector {
        &self.baseline
    }

    pub fn config(&self) -> &ExpressionConfig {
        &self.config
    }

    pub fn table(&self) -> &ExpressionTable {
        &self.table
    }

    fn begin(&mut self, target: ExpressionRequest) {
        let target_features = self.target_features(&target);
        self.transition = Some(Transition {
            target,
            target_features,
            start_snapshot: self.rendered.clone(),
            progress: 0.0,
        });
    }

    /// Finish the in-flight transition and start the next queued one.
    fn commit(&mut self) -> Option<ExpressionType> {
        let done = self.transition.take()?;
        let kind = done.target.kind.clone();
        info!("expression changed to {kind} ({:.2})", done.target.intensity);

        self.current = done.target;
        self.settled = done.target_features;

        if let Some(next) = self.queue.pop_front() {
            debug!("dequeued {} ({} left)", next.kind, self.queue.len());
            self.begin(next);
        }
        Some(kind)
    }

    /// Raw vector an expression settles at: the baseline with the definition's
    /// channels written over it at the request's intensity.
    fn target_features(&self, req: &ExpressionRequest) -> FeatureVector {
        if req.kind.is_neutral() {
            return self.baseline.clone();
        }
        match self.table.get(&req.kind) {
            Some(definition) => self.baseline.overlay(&definition.scaled(req.intensity)),
            None => {
                warn!("no definition for expression '{}', blending to baseline", req.kind);
                self.baseline.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ExpressionTransitionEngine {
        ExpressionTransitionEngine::new(ExpressionTable::builtin(), ExpressionConfig::default())
    }

    fn linear_engine() -> ExpressionTransitionEngine {
        ExpressionTransitionEngine::new(
            ExpressionTable::builtin(),
            ExpressionConfig {
                easing: Easing::Linear,
                ..ExpressionConfig::default()
            },
        )
    }

    fn happy(intensity: f32, duration: f32) -> ExpressionRequest {
        ExpressionRequest::new(ExpressionType::Happy, intensity, duration)
    }

    #[test]
    fn test_happy_quarter_ticks() {
        let mut e = engine();
        assert_eq!(e.request_expression(happy(0.7, 1.0), true), RequestOutcome::Started);

        let mut progress = Vec::new();
        let mut changed = Vec::new();
        for _ in 0..4 {
            let frame = e.tick(0.25);
            progress.push(frame.progress.unwrap());
            changed.extend(frame.changed);
        }

        assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(changed, vec![ExpressionType::Happy]);
        assert_eq!(e.current_type(), &ExpressionType::Happy);
        assert!(!e.is_transitioning());
        assert!((e.settled().get("ear_forward") - 70.0).abs() < 1e-4);
        assert!((e.settled().get("mouth_smile") - 35.0).abs() < 1e-4);
    }

    #[test]
    fn test_eased_midpoint() {
        let mut e = engine();
        e.request_expression(happy(1.0, 1.0), true);
        let f = e.tick(0.25);
        // smoothstep(0.25) = 0.15625
        assert!((f.features.get("ear_forward") - 15.625).abs() < 1e-3);
    }

    #[test]
    fn test_idle_tick_returns_baseline() {
        let mut e = engine();
        let f = e.tick(0.1);
        assert_eq!(f.progress, None);
        assert_eq!(f.changed, None);
        assert_eq!(&f.features, e.baseline());
        assert_eq!(e.current_type(), &ExpressionType::Neutral);
    }

    #[test]
    fn test_settled_tick_is_idempotent() {
        let mut e = engine();
        e.request_expression(happy(0.6, 0.5), true);
        let last = (0..10).map(|_| e.tick(0.1)).last().unwrap();
        for _ in 0..5 {
            let f = e.tick(0.1);
            assert_eq!(f.features, last.features);
            assert_eq!(f.changed, None);
        }
    }

    #[test]
    fn test_queue_commits_in_order_without_idle_tick() {
        let mut e = linear_engine();
        e.request_expression(happy(1.0, 0.5), true);
        assert_eq!(
            e.request_expression(ExpressionRequest::new(ExpressionType::Sad, 1.0, 0.5), true),
            RequestOutcome::Queued { position: 1 }
        );
        assert_eq!(
            e.request_expression(ExpressionRequest::new(ExpressionType::Curious, 1.0, 0.5), true),
            RequestOutcome::Queued { position: 2 }
        );

        let mut committed = Vec::new();
        for _ in 0..20 {
            let f = e.tick(0.25);
            if let Some(kind) = f.changed {
                committed.push(kind);
                if e.queue_len() > 0 || committed.len() < 3 {
                    assert!(e.is_transitioning(), "next request should start immediately");
                    assert_eq!(e.progress(), Some(0.0));
                }
            }
        }
        assert_eq!(
            committed,
            vec![ExpressionType::Happy, ExpressionType::Sad, ExpressionType::Curious]
        );
    }

    #[test]
    fn test_preemption_is_continuous() {
        let mut e = engine();
        e.request_expression(happy(1.0, 1.0), true);
        e.tick(0.25);
        let before = e.tick(0.25);

        let outcome = e.request_expression(ExpressionRequest::new(ExpressionType::Sad, 1.0, 1.0), false);
        assert_eq!(
            outcome,
            RequestOutcome::Preempted {
                abandoned: ExpressionType::Happy
            }
        );
        assert_eq!(e.start_snapshot(), Some(&before.features));
        assert_eq!(e.progress(), Some(0.0));

        // A zero-length tick right after preemption renders the snapshot itself.
        let next = e.tick(0.0);
        assert!(next.features.max_abs_diff(&before.features) < 1e-5);
    }

    #[test]
    fn test_preemption_keeps_queue() {
        let mut e = engine();
        e.request_expression(happy(1.0, 1.0), true);
        e.request_expression(ExpressionRequest::new(ExpressionType::Sleepy, 1.0, 1.0), true);
        e.request_expression(ExpressionRequest::new(ExpressionType::Sad, 1.0, 1.0), false);
        assert_eq!(e.target_type(), Some(&ExpressionType::Sad));
        assert_eq!(e.queue_len(), 1);
    }

    #[test]
    fn test_default_policy_follows_config() {
        let mut e = ExpressionTransitionEngine::new(
            ExpressionTable::builtin(),
            ExpressionConfig {
                allow_expression_blending: false,
                ..ExpressionConfig::default()
            },
        );
        e.set_expression(ExpressionType::Happy, 0.5, None);
        let outcome = e.set_expression(ExpressionType::Sad, 0.5, None);
        assert!(matches!(outcome, RequestOutcome::Preempted { .. }));
        assert_eq!(e.queue_len(), 0);
    }

    #[test]
    fn test_bounded_queue_drops_overflow() {
        let mut e = ExpressionTransitionEngine::new(
            ExpressionTable::builtin(),
            ExpressionConfig {
                max_queue: Some(1),
                ..ExpressionConfig::default()
            },
        );
        e.request_expression(happy(1.0, 1.0), true);
        e.request_expression(happy(0.5, 1.0), true);
        assert_eq!(e.request_expression(happy(0.2, 1.0), true), RequestOutcome::Dropped);
        assert_eq!(e.queue_len(), 1);
    }

    #[test]
    fn test_zero_duration_completes_next_tick() {
        let mut e = engine();
        e.request_expression(happy(1.0, 0.0), true);
        let f = e.tick(0.016);
        assert_eq!(f.progress, Some(1.0));
        assert_eq!(f.changed, Some(ExpressionType::Happy));

        e.request_expression(ExpressionRequest::new(ExpressionType::Sad, 1.0, -3.0), true);
        assert_eq!(e.tick(0.0).changed, Some(ExpressionType::Sad));
    }

    #[test]
    fn test_neutral_returns_to_baseline() {
        let baseline = FeatureVector::new().with("eye_blink", 12.0);
        let mut e = ExpressionTransitionEngine::with_baseline(
            ExpressionTable::builtin(),
            ExpressionConfig::default(),
            baseline,
        );
        e.request_expression(happy(1.0, 0.2), true);
        for _ in 0..4 {
            e.tick(0.1);
        }
        e.request_expression(ExpressionRequest::new(ExpressionType::Neutral, 0.3, 0.2), true);
        for _ in 0..4 {
            e.tick(0.1);
        }
        assert_eq!(e.current_type(), &ExpressionType::Neutral);
        assert_eq!(e.settled().get("eye_blink"), 12.0);
        assert_eq!(e.settled().get("ear_forward"), 0.0);
    }

    #[test]
    fn test_unknown_expression_blends_to_baseline() {
        let mut e = engine();
        e.request_expression(ExpressionRequest::new(ExpressionType::parse("smug"), 1.0, 0.1), true);
        let f = e.tick(0.5);
        assert_eq!(f.changed, Some(ExpressionType::Custom("smug".into())));
        assert_eq!(&f.features, e.baseline());
    }

    #[test]
    fn test_clamp_after_blend_preserves_raw_snapshot() {
        // A rest pose outside the channel range renders clamped but blends from the raw value.
        let baseline = FeatureVector::new().with("eye_wide", 150.0);
        let mut e = ExpressionTransitionEngine::with_baseline(
            ExpressionTable::builtin(),
            ExpressionConfig {
                easing: Easing::Linear,
                ..ExpressionConfig::default()
            },
            baseline,
        );
        assert_eq!(e.tick(0.1).features.get("eye_wide"), 100.0);

        e.request_expression(ExpressionRequest::new(ExpressionType::Sleepy, 1.0, 1.0), true);
        assert_eq!(e.start_snapshot().unwrap().get("eye_wide"), 150.0);
        let f = e.tick(0.5);
        // Sleepy does not define eye_wide, so it stays at the baseline value
        assert_eq!(f.features.get("eye_wide"), 100.0);
        assert!((f.features.get("eye_half_blink") - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_negative_dt_does_not_rewind() {
        let mut e = engine();
        e.request_expression(happy(1.0, 1.0), true);
        e.tick(0.5);
        let f = e.tick(-0.3);
        assert_eq!(f.progress, Some(0.5));
    }

    #[test]
    fn test_inverted_channel_range_is_swapped() {
        let mut e = ExpressionTransitionEngine::new(
            ExpressionTable::builtin(),
            ExpressionConfig {
                channel_min: 100.0,
                channel_max: 0.0,
                ..ExpressionConfig::default()
            },
        );
        assert_eq!((e.config().channel_min, e.config().channel_max), (0.0, 100.0));

        e.request_expression(happy(1.0, 1.0), true);
        let f = e.tick(0.25);
        for (channel, v) in f.features.iter() {
            assert!((0.0..=100.0).contains(&v), "{channel} = {v}");
        }
    }

    #[test]
    fn test_non_finite_channel_bound_uses_defaults() {
        let mut e = ExpressionTransitionEngine::new(
            ExpressionTable::builtin(),
            ExpressionConfig {
                channel_max: f32::NAN,
                ..ExpressionConfig::default()
            },
        );
        assert_eq!(e.config().channel_range(), (0.0, 100.0));
        assert_eq!(e.config().channel_max, 100.0);

        let idle = e.tick(0.1);
        assert!(idle.progress.is_none());
        assert_eq!(&idle.features, e.baseline());

        e.request_expression(happy(0.5, 0.5), true);
        assert!(e.tick(0.5).changed.is_some());
    }

    #[test]
    fn test_clear_queue() {
        let mut e = engine();
        e.request_expression(happy(1.0, 1.0), true);
        e.request_expression(happy(0.5, 1.0), true);
        e.request_expression(happy(0.2, 1.0), true);
        assert_eq!(e.clear_queue(), 2);
        assert!(e.is_transitioning());
    }
}

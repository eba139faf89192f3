//! Aggregate behavior configuration and its validation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::affect::AffectConfig;
use crate::gaze::GazeConfig;
use crate::learner::LearnerConfig;
use crate::prompt::PromptConfig;
use crate::transition::ExpressionConfig;

/// Every tunable of the three control loops plus the affect filter and the
/// prompt builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub gaze: GazeConfig,
    pub expression: ExpressionConfig,
    pub learner: LearnerConfig,
    pub affect: AffectConfig,
    pub prompt: PromptConfig,
}

impl BehaviorConfig {
    /// Copy with out-of-range values pulled back into range. Each adjustment
    /// is logged and returned as a human-readable warning.
    pub fn validated(&self) -> (Self, Vec<String>) {
        let mut cfg = self.clone();
        let mut warnings = Vec::new();

        non_negative_f64(&mut cfg.gaze.dwell_threshold_secs, "gaze.dwell_threshold_secs", &mut warnings);
        non_negative_f64(&mut cfg.gaze.unfocus_grace_secs, "gaze.unfocus_grace_secs", &mut warnings);
        if let Some(d) = cfg.gaze.max_hit_distance
            && !(d.is_finite() && d > 0.0)
        {
            warnings.push(format!("gaze.max_hit_distance {d} is not positive, ignoring"));
            cfg.gaze.max_hit_distance = None;
        }

        non_negative_f32(
            &mut cfg.expression.default_transition_secs,
            "expression.default_transition_secs",
            &mut warnings,
        );
        let (lo, hi) = (cfg.expression.channel_min, cfg.expression.channel_max);
        if !(lo.is_finite() && hi.is_finite()) {
            warnings.push(format!("expression channel range [{lo}, {hi}] is not finite, using defaults"));
            let defaults = ExpressionConfig::default();
            cfg.expression.channel_min = defaults.channel_min;
            cfg.expression.channel_max = defaults.channel_max;
        } else if lo > hi {
            warnings.push(format!("expression.channel_min {lo} exceeds channel_max {hi}, swapping"));
            cfg.expression.channel_min = hi;
            cfg.expression.channel_max = lo;
        }

        unit(&mut cfg.learner.evolution_rate, "learner.evolution_rate", &mut warnings);
        unit(&mut cfg.learner.initial_weight, "learner.initial_weight", &mut warnings);
        non_negative_f64(
            &mut cfg.learner.history_window_secs,
            "learner.history_window_secs",
            &mut warnings,
        );

        unit(&mut cfg.affect.confidence_threshold, "affect.confidence_threshold", &mut warnings);
        unit(&mut cfg.affect.change_threshold, "affect.change_threshold", &mut warnings);

        for w in &warnings {
            warn!("config: {w}");
        }
        (cfg, warnings)
    }
}

fn non_negative_f64(value: &mut f64, name: &str, warnings: &mut Vec<String>) {
    if !(value.is_finite() && *value >= 0.0) {
        warnings.push(format!("{name} {value} is negative or not finite, using 0"));
        *value = 0.0;
    }
}

fn non_negative_f32(value: &mut f32, name: &str, warnings: &mut Vec<String>) {
    if !(value.is_finite() && *value >= 0.0) {
        warnings.push(format!("{name} {value} is negative or not finite, using 0"));
        *value = 0.0;
    }
}

fn unit(value: &mut f32, name: &str, warnings: &mut Vec<String>) {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    if clamped != *value {
        warnings.push(format!("{name} {value} outside [0, 1], clamped to {clamped}"));
        *value = clamped;
    }
}

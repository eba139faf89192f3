//! JSON serde for the v1 wire format.
//!
//! The wire format uses camelCase field names. Learner exports carry the
//! effectiveness table plus the retained interaction history; gaze traces are
//! arrays of per-tick frames that can be replayed through a tracker.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::affect::Affect;
use crate::gaze::{GazeSample, HitResult, TargetId};
use crate::history::InteractionRecord;
use crate::learner::{EffectivenessEntry, LearnerConfig, ResponseEffectivenessLearner};
use crate::time::now_iso8601;
use crate::vec3::Vec3;

pub const CURRENT_VERSION: &str = "1";

// --- Learner wire types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireLearnerExport {
    pub version: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub clock: f64,
    pub entries: Vec<WireEntry>,
    #[serde(default)]
    pub history: Vec<WireInteraction>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    pub affect: String,
    pub response_id: String,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub total_count: u32,
    pub weight: f32,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireInteraction {
    pub affect: String,
    pub response_id: String,
    pub success: bool,
    #[serde(default)]
    pub timestamp: f64,
}

impl WireLearnerExport {
    pub fn from_learner(learner: &ResponseEffectivenessLearner, profile: &str) -> Self {
        WireLearnerExport {
            version: CURRENT_VERSION.to_string(),
            timestamp: now_iso8601(),
            profile: profile.to_string(),
            clock: learner.clock(),
            entries: learner
                .entries()
                .map(|e| WireEntry {
                    affect: e.affect.as_str().to_string(),
                    response_id: e.response_id.clone(),
                    success_count: e.success_count,
                    total_count: e.total_count,
                    weight: e.weight,
                })
                .collect(),
            history: learner
                .history()
                .iter()
                .map(|r| WireInteraction {
                    affect: r.affect.as_str().to_string(),
                    response_id: r.response_id.clone(),
                    success: r.success,
                    timestamp: r.timestamp,
                })
                .collect(),
        }
    }

    /// Rows with an unrecognized affect are skipped with a warning.
    pub fn into_learner(self, config: LearnerConfig) -> ResponseEffectivenessLearner {
        let entries = self.entries.into_iter().filter_map(|w| {
            let Some(affect) = Affect::parse(&w.affect) else {
                warn!("skipping entry with unknown affect '{}'", w.affect);
                return None;
            };
            Some(EffectivenessEntry {
                affect,
                response_id: w.response_id,
                success_count: w.success_count,
                total_count: w.total_count,
                weight: w.weight,
            })
        });
        let mut learner = ResponseEffectivenessLearner::with_entries(config, entries);

        let history = self.history.into_iter().filter_map(|w| {
            Affect::parse(&w.affect).map(|affect| InteractionRecord {
                affect,
                response_id: w.response_id,
                success: w.success,
                timestamp: w.timestamp,
            })
        });
        learner.restore_history(history);
        learner.tick(self.clock);
        learner
    }
}

/// Deserialize a learner export.
pub fn import_json(
    json: &str,
    config: LearnerConfig,
) -> Result<ResponseEffectivenessLearner, serde_json::Error> {
    let wire: WireLearnerExport = serde_json::from_str(json)?;
    Ok(wire.into_learner(config))
}

/// Serialize a learner to the wire format.
pub fn export_json(
    learner: &ResponseEffectivenessLearner,
    profile: &str,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireLearnerExport::from_learner(learner, profile))
}

// --- Gaze traces ---

/// One recorded tick: the gaze ray and what it hit, if anything.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireGazeFrame {
    /// Seconds since the trace started.
    pub t: f64,
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default)]
    pub origin: Option<[f32; 3]>,
    #[serde(default)]
    pub direction: Option<[f32; 3]>,
    #[serde(default)]
    pub target: Option<TargetId>,
    #[serde(default)]
    pub point: Option<[f32; 3]>,
}

fn default_true() -> bool {
    true
}

impl WireGazeFrame {
    pub fn sample(&self) -> GazeSample {
        if !self.valid {
            return GazeSample::invalid(self.t);
        }
        let origin = self.origin.map(Vec3::from).unwrap_or(Vec3::ZERO);
        let direction = self.direction.map(Vec3::from).unwrap_or(Vec3::FORWARD);
        GazeSample::new(origin, direction, self.t)
    }

    /// Hit for this frame. A target without a point is placed one unit along
    /// the ray.
    pub fn hit(&self) -> Option<HitResult> {
        let point = match self.point {
            Some(p) => Vec3::from(p),
            None => {
                let s = self.sample();
                s.origin + s.direction
            }
        };
        match (&self.target, self.point) {
            (Some(target), _) => Some(HitResult::on(target.clone(), point)),
            (None, Some(_)) => Some(HitResult::untargeted(point)),
            (None, None) => None,
        }
    }
}

pub fn parse_gaze_trace(json: &str) -> Result<Vec<WireGazeFrame>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> ResponseEffectivenessLearner {
        let mut l = ResponseEffectivenessLearner::new(LearnerConfig::default());
        l.tick(3.0);
        for _ in 0..3 {
            l.record_response(Affect::Happy, "purr", true);
        }
        l.record_response(Affect::Sad, "slow_blink", false);
        l
    }

    #[test]
    fn test_export_import_preserves_table() {
        let l = trained();
        let json = export_json(&l, "tabby").unwrap();
        let l2 = import_json(&json, LearnerConfig::default()).unwrap();

        assert_eq!(l2.total_interactions(), 4);
        assert_eq!(l2.entry(Affect::Happy, "purr"), l.entry(Affect::Happy, "purr"));
        assert_eq!(l2.history().len(), 4);
        assert_eq!(l2.clock(), 3.0);
    }

    #[test]
    fn test_camel_case_fields() {
        let json = export_json(&trained(), "tabby").unwrap();
        assert!(json.contains("\"responseId\""));
        assert!(json.contains("\"successCount\""));
        let wire: WireLearnerExport = serde_json::from_str(&json).unwrap();
        assert_eq!(wire.version, CURRENT_VERSION);
        assert_eq!(wire.profile, "tabby");
    }

    #[test]
    fn test_unknown_affect_skipped() {
        let json = r#"{
            "version": "1",
            "entries": [
                {"affect": "happy", "responseId": "purr", "successCount": 2, "totalCount": 3, "weight": 0.7},
                {"affect": "bored", "responseId": "yawn", "successCount": 1, "totalCount": 1, "weight": 1.0}
            ]
        }"#;
        let l = import_json(json, LearnerConfig::default()).unwrap();
        assert_eq!(l.entry_count(), 1);
        assert_eq!(l.best_response(Affect::Happy), Some("purr"));
    }

    #[test]
    fn test_gaze_trace_frames() {
        let frames = parse_gaze_trace(
            r#"[
                {"t": 0.0, "target": "toy"},
                {"t": 0.1, "target": 7, "point": [0, 0, 3]},
                {"t": 0.2, "point": [1, 1, 1]},
                {"t": 0.3, "valid": false},
                {"t": 0.4}
            ]"#,
        )
        .unwrap();

        assert_eq!(frames[0].hit().unwrap().target, Some(TargetId::from("toy")));
        assert_eq!(frames[0].hit().unwrap().point, Vec3::FORWARD);
        assert_eq!(frames[1].hit().unwrap().target, Some(TargetId::from(7u64)));
        assert_eq!(frames[2].hit().unwrap().target, None);
        assert!(!frames[3].sample().valid);
        assert!(frames[4].hit().is_none());
        assert!(frames[4].sample().valid);
    }
}

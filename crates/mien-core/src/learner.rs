//! Online response-effectiveness learner.
//!
//! Tracks, per (affect, response) pair, how often a character response
//! "worked" and adapts a weight toward the observed success ratio with an
//! exponential moving average. The best response for an affect maximizes
//! `effectiveness * weight`.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::affect::Affect;
use crate::constants::{
    EVOLUTION_RATE, HISTORY_WINDOW_SECS, INITIAL_WEIGHT, MAX_HISTORY,
    MIN_INTERACTIONS_FOR_RECOMMENDATION,
};
use crate::expression::clamp_unit;
use crate::history::{InteractionHistory, InteractionRecord};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// EMA rate pulling a weight toward its success ratio.
    pub evolution_rate: f32,
    pub min_interactions_for_recommendation: u32,
    /// Weight given to a pair on first observation.
    pub initial_weight: f32,
    pub max_history: usize,
    pub history_window_secs: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            evolution_rate: EVOLUTION_RATE,
            min_interactions_for_recommendation: MIN_INTERACTIONS_FOR_RECOMMENDATION,
            initial_weight: INITIAL_WEIGHT,
            max_history: MAX_HISTORY,
            history_window_secs: HISTORY_WINDOW_SECS,
        }
    }
}

/// Observed performance of one response for one affect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessEntry {
    pub affect: Affect,
    pub response_id: String,
    pub success_count: u32,
    pub total_count: u32,
    pub weight: f32,
}

impl EffectivenessEntry {
    pub fn new(affect: Affect, response_id: impl Into<String>, weight: f32) -> Self {
        Self {
            affect,
            response_id: response_id.into(),
            success_count: 0,
            total_count: 0,
            weight,
        }
    }

    /// Success ratio, 0 before any observation.
    pub fn effectiveness(&self) -> f32 {
        if self.total_count == 0 {
            0.0
        } else {
            self.success_count as f32 / self.total_count as f32
        }
    }

    pub fn score(&self) -> f32 {
        self.effectiveness() * self.weight
    }
}

type EntryKey = (Affect, String);

#[derive(Clone, Debug, Default)]
pub struct ResponseEffectivenessLearner {
    config: LearnerConfig,
    entries: BTreeMap<EntryKey, EffectivenessEntry>,
    history: InteractionHistory,
    clock: f64,
}

impl ResponseEffectivenessLearner {
    /// Rate and initial weight are clamped to `[0, 1]`.
    pub fn new(mut config: LearnerConfig) -> Self {
        config.evolution_rate = clamp_unit(config.evolution_rate);
        config.initial_weight = clamp_unit(config.initial_weight);
        let history = InteractionHistory::new(config.max_history, config.history_window_secs);
        Self {
            config,
            entries: BTreeMap::new(),
            history,
            clock: 0.0,
        }
    }

    /// Learner seeded with previously persisted entries.
    pub fn with_entries(
        config: LearnerConfig,
        entries: impl IntoIterator<Item = EffectivenessEntry>,
    ) -> Self {
        let mut learner = Self::new(config);
        for entry in entries {
            learner.insert_entry(entry);
        }
        learner
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Record whether `response_id` worked for `affect`.
    pub fn record_response(
        &mut self,
        affect: Affect,
        response_id: &str,
        success: bool,
    ) -> &EffectivenessEntry {
        let rate = self.config.evolution_rate;
        let initial = self.config.initial_weight;

        self.history.push(InteractionRecord {
            affect,
            response_id: response_id.to_string(),
            success,
            timestamp: self.clock,
        });

        let entry = self
            .entries
            .entry((affect, response_id.to_string()))
            .or_insert_with(|| EffectivenessEntry::new(affect, response_id, initial));

        entry.total_count = entry.total_count.saturating_add(1);
        if success {
            entry.success_count = entry.success_count.saturating_add(1);
        }
        let target = entry.effectiveness();
        entry.weight = clamp_unit(entry.weight + (target - entry.weight) * rate);

        debug!(
            "learner {affect}/{response_id}: {}/{} weight {:.3}",
            entry.success_count, entry.total_count, entry.weight
        );
        entry
    }

    /// Response with the highest `effectiveness * weight` for `affect`.
    /// Ties go to the lexicographically smallest response id.
    pub fn best_response(&self, affect: Affect) -> Option<&str> {
        self.best_matching(affect, |_| true)
    }

    /// Whether enough interactions have been observed to trust `best_response`.
    pub fn can_recommend(&self) -> bool {
        self.total_interactions() >= u64::from(self.config.min_interactions_for_recommendation)
    }

    /// Pick a response from `candidates`: the learned best once recommendations
    /// are trusted, otherwise a uniformly random candidate.
    ///
    /// With no candidates, only the learned best can be returned.
    pub fn choose_response<R: Rng + ?Sized>(
        &self,
        affect: Affect,
        candidates: &[String],
        rng: &mut R,
    ) -> Option<String> {
        if self.can_recommend() {
            let best = if candidates.is_empty() {
                self.best_response(affect)
            } else {
                self.best_matching(affect, |id| candidates.iter().any(|c| c == id))
            };
            if let Some(best) = best {
                return Some(best.to_string());
            }
        }
        candidates.choose(rng).cloned()
    }

    /// Advance the learner clock and drop history outside the window.
    pub fn tick(&mut self, now: f64) -> usize {
        if now.is_finite() && now > self.clock {
            self.clock = now;
        }
        self.history.trim(self.clock)
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn entry(&self, affect: Affect, response_id: &str) -> Option<&EffectivenessEntry> {
        self.entries.get(&(affect, response_id.to_string()))
    }

    /// Entries for one affect, ordered by response id.
    pub fn entries_for(&self, affect: Affect) -> impl Iterator<Item = &EffectivenessEntry> {
        self.entries.values().filter(move |e| e.affect == affect)
    }

    /// All entries, ordered by (affect, response id).
    pub fn entries(&self) -> impl Iterator<Item = &EffectivenessEntry> {
        self.entries.values()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_interactions(&self) -> u64 {
        self.entries.values().map(|e| u64::from(e.total_count)).sum()
    }

    pub fn history(&self) -> &InteractionHistory {
        &self.history
    }

    /// Replace the retained history, e.g. after an import.
    pub fn restore_history(&mut self, records: impl IntoIterator<Item = InteractionRecord>) {
        self.history.clear();
        for record in records {
            self.history.push(record);
        }
    }

    /// Insert or replace one entry. Weight is clamped and success count is
    /// capped at the total.
    pub fn insert_entry(&mut self, mut entry: EffectivenessEntry) {
        entry.weight = clamp_unit(entry.weight);
        entry.success_count = entry.success_count.min(entry.total_count);
        self.entries
            .insert((entry.affect, entry.response_id.clone()), entry);
    }

    /// Fold another learner's counts into this one. Weights of shared pairs
    /// are averaged by observation count.
    pub fn merge_from(&mut self, other: &ResponseEffectivenessLearner) {
        for theirs in other.entries() {
            let key = (theirs.affect, theirs.response_id.clone());
            match self.entries.get_mut(&key) {
                Some(ours) => {
                    let total = ours.total_count.saturating_add(theirs.total_count);
                    if total > 0 {
                        ours.weight = (ours.weight * ours.total_count as f32
                            + theirs.weight * theirs.total_count as f32)
                            / total as f32;
                    }
                    ours.total_count = total;
                    ours.success_count = ours.success_count.saturating_add(theirs.success_count);
                }
                None => {
                    self.entries.insert(key, theirs.clone());
                }
            }
        }
    }

    fn best_matching(&self, affect: Affect, keep: impl Fn(&str) -> bool) -> Option<&str> {
        let mut best: Option<&EffectivenessEntry> = None;
        for entry in self.entries_for(affect).filter(|e| keep(&e.response_id)) {
            // Iteration is in id order, so strict > keeps the smallest id on ties.
            if best.is_none_or(|b| entry.score() > b.score()) {
                best = Some(entry);
            }
        }
        best.map(|e| e.response_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn learner(rate: f32) -> ResponseEffectivenessLearner {
        ResponseEffectivenessLearner::new(LearnerConfig {
            evolution_rate: rate,
            ..LearnerConfig::default()
        })
    }

    #[test]
    fn test_eight_successes_two_failures() {
        let mut l = learner(0.2);
        for _ in 0..8 {
            l.record_response(Affect::Happy, "purr", true);
        }
        let after_successes = l.entry(Affect::Happy, "purr").unwrap().weight;
        l.record_response(Affect::Happy, "purr", false);
        l.record_response(Affect::Happy, "purr", false);

        let e = l.entry(Affect::Happy, "purr").unwrap();
        assert!((e.effectiveness() - 0.8).abs() < 1e-6);
        assert!(e.weight > 0.8 && e.weight < after_successes, "weight {}", e.weight);
        assert_eq!(l.best_response(Affect::Happy), Some("purr"));
    }

    #[test]
    fn test_best_response_maximizes_score() {
        let mut l = learner(0.5);
        l.record_response(Affect::Sad, "slow_blink", true);
        l.record_response(Affect::Sad, "slow_blink", true);
        l.record_response(Affect::Sad, "head_tilt", true);
        l.record_response(Affect::Sad, "head_tilt", false);
        assert_eq!(l.best_response(Affect::Sad), Some("slow_blink"));
        assert_eq!(l.best_response(Affect::Angry), None);
    }

    #[test]
    fn test_tie_breaks_on_smallest_id() {
        let mut l = learner(0.1);
        l.record_response(Affect::Happy, "zoomies", true);
        l.record_response(Affect::Happy, "chirp", true);
        assert_eq!(l.best_response(Affect::Happy), Some("chirp"));
    }

    #[test]
    fn test_can_recommend_counts_interactions() {
        let mut l = learner(0.1);
        for _ in 0..4 {
            l.record_response(Affect::Happy, "purr", true);
        }
        assert!(!l.can_recommend());
        l.record_response(Affect::Happy, "purr", true);
        assert!(l.can_recommend());
        assert_eq!(l.total_interactions(), 5);
        assert_eq!(l.entry_count(), 1);
    }

    #[test]
    fn test_choose_falls_back_to_candidates() {
        let mut l = learner(0.1);
        let mut rng = SmallRng::seed_from_u64(7);
        let candidates = vec!["purr".to_string(), "chirp".to_string()];

        let picked = l.choose_response(Affect::Happy, &candidates, &mut rng).unwrap();
        assert!(candidates.contains(&picked));
        assert_eq!(l.choose_response(Affect::Happy, &[], &mut rng), None);

        for _ in 0..5 {
            l.record_response(Affect::Happy, "chirp", true);
        }
        for _ in 0..5 {
            assert_eq!(
                l.choose_response(Affect::Happy, &candidates, &mut rng).as_deref(),
                Some("chirp")
            );
        }
        // Learned best outside the candidate set is not returned.
        let others = vec!["hiss".to_string()];
        assert_eq!(
            l.choose_response(Affect::Happy, &others, &mut rng).as_deref(),
            Some("hiss")
        );
    }

    #[test]
    fn test_history_stamped_with_clock() {
        let mut l = ResponseEffectivenessLearner::new(LearnerConfig {
            history_window_secs: 10.0,
            ..LearnerConfig::default()
        });
        l.tick(1.0);
        l.record_response(Affect::Happy, "purr", true);
        l.tick(8.0);
        l.record_response(Affect::Sad, "purr", false);
        assert_eq!(l.history().len(), 2);

        assert_eq!(l.tick(12.0), 1);
        assert_eq!(l.history().iter().next().unwrap().timestamp, 8.0);
        // Clock never runs backwards.
        l.tick(3.0);
        assert_eq!(l.clock(), 12.0);
        // Entries outlive history.
        assert_eq!(l.total_interactions(), 2);
    }

    #[test]
    fn test_weights_stay_in_unit_range() {
        let mut l = ResponseEffectivenessLearner::new(LearnerConfig {
            evolution_rate: 5.0,
            initial_weight: 2.0,
            ..LearnerConfig::default()
        });
        assert_eq!(l.config().evolution_rate, 1.0);
        for i in 0..20 {
            let e = l.record_response(Affect::Confused, "tilt", i % 3 == 0);
            assert!((0.0..=1.0).contains(&e.weight));
        }
    }

    #[test]
    fn test_merge_from() {
        let mut a = learner(0.1);
        let mut b = learner(0.1);
        a.record_response(Affect::Happy, "purr", true);
        b.record_response(Affect::Happy, "purr", false);
        b.record_response(Affect::Sad, "blink", true);
        a.merge_from(&b);

        let purr = a.entry(Affect::Happy, "purr").unwrap();
        assert_eq!((purr.success_count, purr.total_count), (1, 2));
        assert!(a.entry(Affect::Sad, "blink").is_some());
        assert_eq!(a.total_interactions(), 3);
    }

    #[test]
    fn test_insert_entry_sanitizes() {
        let mut l = learner(0.1);
        l.insert_entry(EffectivenessEntry {
            affect: Affect::Happy,
            response_id: "purr".into(),
            success_count: 9,
            total_count: 4,
            weight: 1.5,
        });
        let e = l.entry(Affect::Happy, "purr").unwrap();
        assert_eq!(e.success_count, 4);
        assert_eq!(e.weight, 1.0);
    }
}

//! Bounded, time-windowed log of learner observations.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::affect::Affect;
use crate::constants::{HISTORY_WINDOW_SECS, MAX_HISTORY};

/// One recorded (affect, response, outcome) observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub affect: Affect,
    pub response_id: String,
    pub success: bool,
    pub timestamp: f64,
}

/// Append-only ring of recent interactions. Oldest records are evicted when
/// the log exceeds `max_len`, or once they fall outside the time window.
#[derive(Clone, Debug)]
pub struct InteractionHistory {
    records: VecDeque<InteractionRecord>,
    max_len: usize,
    window_secs: f64,
}

impl Default for InteractionHistory {
    fn default() -> Self {
        Self::new(MAX_HISTORY, HISTORY_WINDOW_SECS)
    }
}

impl InteractionHistory {
    pub fn new(max_len: usize, window_secs: f64) -> Self {
        Self {
            records: VecDeque::with_capacity(max_len.min(1024)),
            max_len,
            window_secs,
        }
    }

    pub fn push(&mut self, record: InteractionRecord) {
        self.records.push_back(record);
        while self.records.len() > self.max_len {
            self.records.pop_front();
        }
    }

    /// Drop records older than the window relative to `now`. Returns how many
    /// were removed.
    pub fn trim(&mut self, now: f64) -> usize {
        let cutoff = now - self.window_secs;
        let before = self.records.len();
        while self
            .records
            .front()
            .is_some_and(|r| r.timestamp < cutoff)
        {
            self.records.pop_front();
        }
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.records.iter()
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&InteractionRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).collect()
    }

    /// How often each affect appears in the retained log.
    pub fn affect_trends(&self) -> BTreeMap<Affect, usize> {
        let mut trends = BTreeMap::new();
        for r in &self.records {
            *trends.entry(r.affect).or_insert(0) += 1;
        }
        trends
    }

    /// Most frequent affect; ties go to the one seen most recently.
    pub fn dominant_affect(&self) -> Option<Affect> {
        let trends = self.affect_trends();
        let max = trends.values().copied().max()?;
        self.records
            .iter()
            .rev()
            .map(|r| r.affect)
            .find(|a| trends.get(a) == Some(&max))
    }

    /// One line per record for the last `n` records, oldest first, e.g.
    /// `- human: happy, response: purr (worked)`.
    pub fn context_summary(&self, n: usize) -> String {
        if self.records.is_empty() || n == 0 {
            return "No interaction history yet.".to_string();
        }
        self.recent(n)
            .iter()
            .map(|r| {
                let outcome = if r.success { "worked" } else { "did not work" };
                format!("- human: {}, response: {} ({outcome})", r.affect, r.response_id)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(affect: Affect, t: f64) -> InteractionRecord {
        InteractionRecord {
            affect,
            response_id: "purr".into(),
            success: true,
            timestamp: t,
        }
    }

    #[test]
    fn test_size_bound_evicts_oldest() {
        let mut h = InteractionHistory::new(3, 600.0);
        for i in 0..5 {
            h.push(rec(Affect::Happy, i as f64));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().next().unwrap().timestamp, 2.0);
    }

    #[test]
    fn test_window_trim() {
        let mut h = InteractionHistory::new(50, 10.0);
        h.push(rec(Affect::Happy, 0.0));
        h.push(rec(Affect::Sad, 5.0));
        h.push(rec(Affect::Sad, 12.0));
        assert_eq!(h.trim(14.0), 1);
        assert_eq!(h.len(), 2);
        assert_eq!(h.trim(14.0), 0);
    }

    #[test]
    fn test_recent_and_trends() {
        let mut h = InteractionHistory::default();
        h.push(rec(Affect::Happy, 0.0));
        h.push(rec(Affect::Sad, 1.0));
        h.push(rec(Affect::Happy, 2.0));
        h.push(rec(Affect::Sad, 3.0));

        let recent: Vec<f64> = h.recent(2).iter().map(|r| r.timestamp).collect();
        assert_eq!(recent, vec![2.0, 3.0]);
        assert_eq!(h.recent(10).len(), 4);

        let trends = h.affect_trends();
        assert_eq!(trends[&Affect::Happy], 2);
        assert_eq!(trends[&Affect::Sad], 2);
        assert_eq!(h.dominant_affect(), Some(Affect::Sad));
    }

    #[test]
    fn test_context_summary() {
        let mut h = InteractionHistory::default();
        assert_eq!(h.context_summary(10), "No interaction history yet.");

        h.push(rec(Affect::Happy, 0.0));
        h.push(InteractionRecord {
            affect: Affect::Angry,
            response_id: "hiss".into(),
            success: false,
            timestamp: 1.0,
        });
        h.push(rec(Affect::Sad, 2.0));

        assert_eq!(
            h.context_summary(2),
            "- human: angry, response: hiss (did not work)\n- human: sad, response: purr (worked)"
        );
        assert_eq!(h.context_summary(10).lines().count(), 3);
        assert_eq!(h.context_summary(0), "No interaction history yet.");
    }

    #[test]
    fn test_empty() {
        let h = InteractionHistory::default();
        assert!(h.is_empty());
        assert_eq!(h.dominant_affect(), None);
    }
}

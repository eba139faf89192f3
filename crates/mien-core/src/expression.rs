//! Expression vocabulary and the data-driven definition table.
//!
//! An expression is a named set of feature-channel magnitudes (blend shape
//! weights on a `[0, 100]` scale). The built-in table follows the feline
//! facial action channels (eyes, ears, mouth); configuration can override
//! any entry or add new named expressions without touching this code.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical feature channels of the built-in face rig.
pub const CHANNELS: [&str; 9] = [
    "eye_blink",
    "eye_half_blink",
    "eye_wide",
    "ear_forward",
    "ear_backward",
    "ear_flattened",
    "mouth_open",
    "mouth_smile",
    "mouth_frown",
];

/// Character expression kind.
///
/// `Custom` covers expressions that only exist in a loaded table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExpressionType {
    #[default]
    Neutral,
    Happy,
    Curious,
    Surprised,
    Sleepy,
    Playful,
    Focused,
    Sad,
    Custom(String),
}

impl ExpressionType {
    pub const BUILTIN: [ExpressionType; 8] = [
        ExpressionType::Neutral,
        ExpressionType::Happy,
        ExpressionType::Curious,
        ExpressionType::Surprised,
        ExpressionType::Sleepy,
        ExpressionType::Playful,
        ExpressionType::Focused,
        ExpressionType::Sad,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ExpressionType::Neutral => "neutral",
            ExpressionType::Happy => "happy",
            ExpressionType::Curious => "curious",
            ExpressionType::Surprised => "surprised",
            ExpressionType::Sleepy => "sleepy",
            ExpressionType::Playful => "playful",
            ExpressionType::Focused => "focused",
            ExpressionType::Sad => "sad",
            ExpressionType::Custom(name) => name,
        }
    }

    /// Case-insensitive parse. Unknown names become `Custom`.
    pub fn parse(s: &str) -> Self {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "neutral" => ExpressionType::Neutral,
            "happy" => ExpressionType::Happy,
            "curious" => ExpressionType::Curious,
            "surprised" => ExpressionType::Surprised,
            "sleepy" => ExpressionType::Sleepy,
            "playful" => ExpressionType::Playful,
            "focused" => ExpressionType::Focused,
            "sad" => ExpressionType::Sad,
            _ => ExpressionType::Custom(name),
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, ExpressionType::Neutral)
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ExpressionType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for ExpressionType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<ExpressionType> for String {
    fn from(kind: ExpressionType) -> Self {
        kind.as_str().to_string()
    }
}

// ── Feature vectors ─────────────────────────────────────────

/// Named channel magnitudes, ordered by channel name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f32>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel in `channels` set to `value`.
    pub fn uniform<'a>(channels: impl IntoIterator<Item = &'a str>, value: f32) -> Self {
        Self(channels.into_iter().map(|c| (c.to_string(), value)).collect())
    }

    pub fn with(mut self, channel: &str, value: f32) -> Self {
        self.set(channel, value);
        self
    }

    pub fn set(&mut self, channel: &str, value: f32) {
        self.0.insert(channel.to_string(), value);
    }

    /// Channel value; absent channels read as 0.
    pub fn get(&self, channel: &str) -> f32 {
        self.0.get(channel).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.0.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every channel multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    /// `self` with every channel of `top` written over it.
    pub fn overlay(&self, top: &FeatureVector) -> Self {
        let mut out = self.clone();
        for (k, v) in &top.0 {
            out.0.insert(k.clone(), *v);
        }
        out
    }

    /// Per-channel linear interpolation over the union of both channel sets.
    pub fn lerp(&self, other: &FeatureVector, t: f32) -> Self {
        let mut out = BTreeMap::new();
        for key in self.0.keys().chain(other.0.keys()) {
            if out.contains_key(key) {
                continue;
            }
            let a = self.get(key);
            let b = other.get(key);
            out.insert(key.clone(), a + (b - a) * t);
        }
        Self(out)
    }

    /// Clamp every channel into `[min, max]`. Never panics: a NaN bound is
    /// ignored and an inverted range pins values to `max`.
    pub fn clamped(&self, min: f32, max: f32) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.max(min).min(max)))
                .collect(),
        )
    }

    /// Largest absolute per-channel difference (channels missing on one side read as 0).
    pub fn max_abs_diff(&self, other: &FeatureVector) -> f32 {
        self.0
            .keys()
            .chain(other.0.keys())
            .map(|k| (self.get(k) - other.get(k)).abs())
            .fold(0.0, f32::max)
    }
}

impl FromIterator<(String, f32)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Requests ────────────────────────────────────────────────

/// A request to move the character to an expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRequest {
    pub kind: ExpressionType,
    pub intensity: f32,
    pub duration_secs: f32,
}

impl ExpressionRequest {
    /// Intensity is clamped to `[0, 1]`; NaN becomes 0.
    pub fn new(kind: ExpressionType, intensity: f32, duration_secs: f32) -> Self {
        Self {
            kind,
            intensity: clamp_unit(intensity),
            duration_secs,
        }
    }

    pub fn neutral() -> Self {
        Self::new(ExpressionType::Neutral, 0.0, 0.0)
    }

    /// Copy with intensity forced back into `[0, 1]`.
    pub fn clamped(&self) -> Self {
        Self::new(self.kind.clone(), self.intensity, self.duration_secs)
    }
}

pub(crate) fn clamp_unit(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

// ── Definition table ────────────────────────────────────────

/// Immutable mapping from expression kind to its full-intensity feature vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionTable {
    definitions: BTreeMap<ExpressionType, FeatureVector>,
}

impl Default for ExpressionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExpressionTable {
    pub fn empty() -> Self {
        Self {
            definitions: BTreeMap::new(),
        }
    }

    /// Built-in cat face definitions (magnitudes at intensity 1).
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert(ExpressionType::Neutral, FeatureVector::new());
        table.insert(
            ExpressionType::Happy,
            FeatureVector::new()
                .with("eye_blink", 0.0)
                .with("ear_forward", 100.0)
                .with("mouth_smile", 50.0),
        );
        table.insert(
            ExpressionType::Curious,
            FeatureVector::new()
                .with("eye_wide", 80.0)
                .with("ear_forward", 100.0),
        );
        table.insert(
            ExpressionType::Surprised,
            FeatureVector::new()
                .with("eye_wide", 100.0)
                .with("ear_forward", 100.0)
                .with("mouth_open", 30.0),
        );
        table.insert(
            ExpressionType::Sleepy,
            FeatureVector::new().with("eye_half_blink", 100.0),
        );
        table.insert(
            ExpressionType::Playful,
            FeatureVector::new()
                .with("eye_wide", 60.0)
                .with("ear_forward", 100.0)
                .with("mouth_open", 70.0),
        );
        table.insert(
            ExpressionType::Focused,
            FeatureVector::new()
                .with("eye_wide", 40.0)
                .with("ear_forward", 80.0),
        );
        table.insert(
            ExpressionType::Sad,
            FeatureVector::new()
                .with("eye_half_blink", 60.0)
                .with("ear_flattened", 100.0)
                .with("mouth_frown", 70.0),
        );
        table
    }

    pub fn insert(&mut self, kind: ExpressionType, definition: FeatureVector) {
        self.definitions.insert(kind, definition);
    }

    pub fn get(&self, kind: &ExpressionType) -> Option<&FeatureVector> {
        self.definitions.get(kind)
    }

    pub fn contains(&self, kind: &ExpressionType) -> bool {
        self.definitions.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ExpressionType> {
        self.definitions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExpressionType, &FeatureVector)> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Entries of `overrides` replace or extend this table.
    pub fn merged(mut self, overrides: ExpressionTable) -> Self {
        self.definitions.extend(overrides.definitions);
        self
    }

    /// All channels mentioned by any definition plus the canonical rig channels.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = CHANNELS.iter().map(|c| c.to_string()).collect();
        for def in self.definitions.values() {
            for c in def.channels() {
                if !channels.iter().any(|k| k == c) {
                    channels.push(c.to_string());
                }
            }
        }
        channels
    }

    /// Rest pose: every known channel at 0.
    pub fn zero_baseline(&self) -> FeatureVector {
        let channels = self.channels();
        FeatureVector::uniform(channels.iter().map(String::as_str), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_builtin() {
        for kind in ExpressionType::BUILTIN {
            assert_eq!(ExpressionType::parse(kind.as_str()), kind);
        }
        assert_eq!(ExpressionType::parse("  HAPPY "), ExpressionType::Happy);
    }

    #[test]
    fn test_parse_unknown_is_custom() {
        assert_eq!(
            ExpressionType::parse("Smug"),
            ExpressionType::Custom("smug".to_string())
        );
    }

    #[test]
    fn test_request_clamps_intensity() {
        assert_eq!(ExpressionRequest::new(ExpressionType::Happy, 1.7, 1.0).intensity, 1.0);
        assert_eq!(ExpressionRequest::new(ExpressionType::Happy, -0.2, 1.0).intensity, 0.0);
        assert_eq!(ExpressionRequest::new(ExpressionType::Happy, f32::NAN, 1.0).intensity, 0.0);
    }

    #[test]
    fn test_lerp_union_of_channels() {
        let a = FeatureVector::new().with("ear_forward", 100.0);
        let b = FeatureVector::new().with("mouth_open", 50.0);
        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.get("ear_forward"), 50.0);
        assert_eq!(mid.get("mouth_open"), 25.0);
        assert_eq!(mid.len(), 2);
    }

    #[test]
    fn test_overlay_and_scale() {
        let base = FeatureVector::uniform(["eye_wide", "ear_forward"], 10.0);
        let top = FeatureVector::new().with("ear_forward", 100.0).scaled(0.5);
        let out = base.overlay(&top);
        assert_eq!(out.get("eye_wide"), 10.0);
        assert_eq!(out.get("ear_forward"), 50.0);
    }

    #[test]
    fn test_clamped_tolerates_bad_bounds() {
        let v = FeatureVector::new()
            .with("ear_forward", 150.0)
            .with("mouth_open", -5.0);
        let out = v.clamped(0.0, 100.0);
        assert_eq!(out.get("ear_forward"), 100.0);
        assert_eq!(out.get("mouth_open"), 0.0);

        let out = v.clamped(0.0, f32::NAN);
        assert_eq!(out.get("ear_forward"), 150.0);
        assert_eq!(out.get("mouth_open"), 0.0);

        let out = v.clamped(100.0, 0.0);
        assert_eq!(out.get("ear_forward"), 0.0);
    }

    #[test]
    fn test_builtin_table_covers_all_kinds() {
        let table = ExpressionTable::builtin();
        for kind in ExpressionType::BUILTIN {
            assert!(table.contains(&kind), "missing {kind}");
        }
        assert_eq!(table.get(&ExpressionType::Sad).unwrap().get("mouth_frown"), 70.0);
    }

    #[test]
    fn test_merged_adds_custom_expression() {
        let mut extra = ExpressionTable::empty();
        extra.insert(
            ExpressionType::parse("smug"),
            FeatureVector::new().with("mouth_smile", 30.0).with("whisker_twitch", 40.0),
        );
        let table = ExpressionTable::builtin().merged(extra);
        assert!(table.contains(&ExpressionType::Custom("smug".into())));
        assert!(table.channels().iter().any(|c| c == "whisker_twitch"));
        assert_eq!(table.zero_baseline().get("whisker_twitch"), 0.0);
    }

    #[test]
    fn test_table_serde_uses_names() {
        let json = serde_json::to_value(ExpressionTable::builtin()).unwrap();
        assert_eq!(json["happy"]["ear_forward"], 100.0);
    }
}

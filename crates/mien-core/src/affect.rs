//! Human affect as reported by an external classifier, and the filter that
//! turns a noisy reading stream into discrete affect changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{AFFECT_CHANGE_THRESHOLD, AFFECT_CONFIDENCE_THRESHOLD};
use crate::expression::{ExpressionType, clamp_unit};

/// Affect category of the human in front of the character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affect {
    #[default]
    Neutral,
    Happy,
    Sad,
    Surprised,
    Angry,
    Confused,
    Excited,
}

impl Affect {
    pub const ALL: [Affect; 7] = [
        Affect::Neutral,
        Affect::Happy,
        Affect::Sad,
        Affect::Surprised,
        Affect::Angry,
        Affect::Confused,
        Affect::Excited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Affect::Neutral => "neutral",
            Affect::Happy => "happy",
            Affect::Sad => "sad",
            Affect::Surprised => "surprised",
            Affect::Angry => "angry",
            Affect::Confused => "confused",
            Affect::Excited => "excited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Some(Affect::Neutral),
            "happy" => Some(Affect::Happy),
            "sad" => Some(Affect::Sad),
            "surprised" => Some(Affect::Surprised),
            "angry" => Some(Affect::Angry),
            "confused" => Some(Affect::Confused),
            "excited" => Some(Affect::Excited),
            _ => None,
        }
    }

    /// Character expression that mirrors this affect.
    pub fn mirrored_expression(&self) -> ExpressionType {
        match self {
            Affect::Neutral => ExpressionType::Neutral,
            Affect::Happy => ExpressionType::Happy,
            Affect::Sad | Affect::Angry => ExpressionType::Sad,
            Affect::Surprised => ExpressionType::Surprised,
            Affect::Confused => ExpressionType::Curious,
            Affect::Excited => ExpressionType::Playful,
        }
    }
}

impl fmt::Display for Affect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Affect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let names: Vec<&str> = Affect::ALL.iter().map(|a| a.as_str()).collect();
            format!("unknown affect '{s}' (expected one of: {})", names.join(", "))
        })
    }
}

/// One classifier output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffectReading {
    pub affect: Affect,
    pub confidence: f32,
    pub intensity: f32,
    #[serde(default)]
    pub timestamp: f64,
}

impl AffectReading {
    /// Confidence and intensity are clamped to `[0, 1]`.
    pub fn new(affect: Affect, confidence: f32, intensity: f32, timestamp: f64) -> Self {
        Self {
            affect,
            confidence: clamp_unit(confidence),
            intensity: clamp_unit(intensity),
            timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    /// Readings below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Minimum intensity swing that counts as a change for the same affect.
    pub change_threshold: f32,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: AFFECT_CONFIDENCE_THRESHOLD,
            change_threshold: AFFECT_CHANGE_THRESHOLD,
        }
    }
}

/// Debounces classifier output into discrete affect changes.
#[derive(Clone, Debug, Default)]
pub struct AffectFilter {
    config: AffectConfig,
    current: Option<AffectReading>,
}

impl AffectFilter {
    pub fn new(config: AffectConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    pub fn config(&self) -> &AffectConfig {
        &self.config
    }

    /// Last accepted reading.
    pub fn current(&self) -> Option<&AffectReading> {
        self.current.as_ref()
    }

    /// Feed one reading. Returns it when it is confident enough and differs
    /// from the current affect (different kind, or intensity moved by more
    /// than the change threshold).
    pub fn observe(&mut self, reading: &AffectReading) -> Option<AffectReading> {
        if reading.confidence.is_nan() || reading.confidence < self.config.confidence_threshold {
            return None;
        }

        let changed = match &self.current {
            None => true,
            Some(cur) => {
                cur.affect != reading.affect
                    || (cur.intensity - reading.intensity).abs() > self.config.change_threshold
            }
        };
        if !changed {
            return None;
        }

        debug!(
            "affect changed to {} (confidence {:.2}, intensity {:.2})",
            reading.affect, reading.confidence, reading.intensity
        );
        self.current = Some(reading.clone());
        Some(reading.clone())
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

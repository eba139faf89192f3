//! Parse free-form generative-text output into an expression recommendation.
//!
//! The text is expected to contain a JSON object such as
//! `{"expression": "happy", "intensity": 0.8, "duration": 2.5, "reasoning": "..."}`,
//! possibly wrapped in prose or code fences. Malformed JSON falls back to
//! per-field pattern matching, and text with no object at all falls back to
//! keyword matching. Parsing never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::affect::Affect;
use crate::constants::{DEFAULT_RECOMMENDATION_INTENSITY, DEFAULT_RECOMMENDATION_SECS};
use crate::expression::{ExpressionRequest, ExpressionType, clamp_unit};

static EXPRESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"expression"\s*:\s*"([^"]+)""#).unwrap());
static INTENSITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"intensity"\s*:\s*([0-9.]+)"#).unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"duration"\s*:\s*([0-9.]+)"#).unwrap());
static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"reasoning"\s*:\s*"([^"]+)""#).unwrap());

/// Keyword groups checked in order; first match wins.
const KEYWORDS: &[(&[&str], Affect)] = &[
    (&["happy", "smile", "joy"], Affect::Happy),
    (&["curious", "interested"], Affect::Confused),
    (&["surprised", "surprise"], Affect::Surprised),
    (&["sleepy", "tired"], Affect::Neutral),
    (&["playful", "wink"], Affect::Excited),
    (&["focused", "attentive"], Affect::Neutral),
    (&["sad", "frown"], Affect::Sad),
];

/// What the text generator suggested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub affect: Affect,
    pub intensity: f32,
    /// How long to hold the expression.
    pub duration_secs: f32,
    pub reasoning: String,
}

impl Default for Recommendation {
    fn default() -> Self {
        Self {
            affect: Affect::Neutral,
            intensity: DEFAULT_RECOMMENDATION_INTENSITY,
            duration_secs: DEFAULT_RECOMMENDATION_SECS,
            reasoning: String::new(),
        }
    }
}

impl Recommendation {
    pub fn expression(&self) -> ExpressionType {
        self.affect.mirrored_expression()
    }

    /// Expression request that blends in over `transition_secs`.
    pub fn to_request(&self, transition_secs: f32) -> ExpressionRequest {
        ExpressionRequest::new(self.expression(), self.intensity, transition_secs)
    }
}

pub fn parse_recommendation(text: &str) -> Recommendation {
    let Some(object) = extract_object(text) else {
        return Recommendation {
            affect: affect_from_text(text),
            reasoning: text.trim().to_string(),
            ..Recommendation::default()
        };
    };

    match serde_json::from_str::<Value>(object) {
        Ok(Value::Object(map)) => from_json(&map),
        _ => from_patterns(object),
    }
}

/// Map a word or phrase onto an affect. Exact affect names win, then keywords.
pub fn affect_from_text(text: &str) -> Affect {
    if let Some(affect) = Affect::parse(text) {
        return affect;
    }
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, affect)| *affect)
        .unwrap_or_default()
}

/// Span from the first `{` to the last `}`.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn from_json(map: &Map<String, Value>) -> Recommendation {
    let field = |key: &str| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    };
    let mut rec = Recommendation::default();

    if let Some(s) = field("expression").and_then(Value::as_str) {
        rec.affect = affect_from_text(s);
    }
    if let Some(x) = field("intensity").and_then(Value::as_f64) {
        rec.intensity = clamp_unit(x as f32);
    }
    if let Some(x) = field("duration").and_then(Value::as_f64) {
        rec.duration_secs = (x as f32).max(0.0);
    }
    if let Some(s) = field("reasoning").and_then(Value::as_str) {
        rec.reasoning = s.to_string();
    }
    rec
}

fn from_patterns(object: &str) -> Recommendation {
    let capture = |re: &Regex| {
        re.captures(object)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let number = |re: &Regex| capture(re).and_then(|s| s.parse::<f32>().ok());
    let mut rec = Recommendation::default();

    if let Some(s) = capture(&EXPRESSION_RE) {
        rec.affect = affect_from_text(&s);
    }
    if let Some(x) = number(&INTENSITY_RE) {
        rec.intensity = clamp_unit(x);
    }
    if let Some(x) = number(&DURATION_RE) {
        rec.duration_secs = x.max(0.0);
    }
    if let Some(s) = capture(&REASONING_RE) {
        rec.reasoning = s;
    }
    rec
}

//! Easing curves applied to blend progress.

use std::f32::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Progress remapping for expression transitions.
///
/// Every curve maps 0 → 0 and 1 → 1, so a committed transition always lands
/// exactly on its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    /// Cubic Hermite `3t² - 2t³`, the classic ease-in-out curve.
    #[default]
    Smoothstep,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInOutCubic,
    EaseInOutSine,
}

impl Easing {
    pub fn apply(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        match self {
            Easing::Linear => t,
            Easing::Smoothstep => t * t * (3.0 - 2.0 * t),
            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => t * (2.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * u * u * u + 1.0
                }
            }
            Easing::EaseInOutSine => -0.5 * ((PI * t).cos() - 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::Smoothstep => "smoothstep",
            Easing::EaseInQuad => "ease_in_quad",
            Easing::EaseOutQuad => "ease_out_quad",
            Easing::EaseInOutQuad => "ease_in_out_quad",
            Easing::EaseInOutCubic => "ease_in_out_cubic",
            Easing::EaseInOutSine => "ease_in_out_sine",
        }
    }
}

impl FromStr for Easing {
    type Err = String;

    /// Case-insensitive; `-` and `_` are interchangeable and `ease_in_out`
    /// names the default curve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(Easing::Linear),
            "smoothstep" | "ease_in_out" => Ok(Easing::Smoothstep),
            "ease_in_quad" => Ok(Easing::EaseInQuad),
            "ease_out_quad" => Ok(Easing::EaseOutQuad),
            "ease_in_out_quad" => Ok(Easing::EaseInOutQuad),
            "ease_in_out_cubic" => Ok(Easing::EaseInOutCubic),
            "ease_in_out_sine" => Ok(Easing::EaseInOutSine),
            _ => Err(format!("unknown easing '{s}'")),
        }
    }
}

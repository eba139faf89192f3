//! Behavior engine for an interactive animated character.
//!
//! Three tick-driven control loops: a gaze focus tracker that turns noisy
//! gaze samples into focus and highlight events, an expression transition
//! engine that blends facial feature vectors over time, and an online learner
//! that ranks character responses by how well they worked for a given human
//! affect. Prompts for an external text generator are assembled from the
//! same state.
//!
//! Zero I/O. Callers supply time, samples and classifier output.

pub mod affect;
pub mod config;
pub mod constants;
pub mod easing;
pub mod expression;
pub mod gaze;
pub mod history;
pub mod learner;
pub mod prompt;
pub mod recommendation;
pub mod serde_compat;
pub mod time;
pub mod transition;
pub mod vec3;

pub use affect::{Affect, AffectConfig, AffectFilter, AffectReading};
pub use config::BehaviorConfig;
pub use constants::{EPSILON, EVOLUTION_RATE, MIN_INTERACTIONS_FOR_RECOMMENDATION};
pub use easing::Easing;
pub use expression::{CHANNELS, ExpressionRequest, ExpressionTable, ExpressionType, FeatureVector};
pub use gaze::{
    FocusEvent, FocusPhase, FocusState, FocusUpdate, GazeConfig, GazeFocusTracker, GazeSample,
    HitResult, TargetId,
};
pub use history::{InteractionHistory, InteractionRecord};
pub use learner::{EffectivenessEntry, LearnerConfig, ResponseEffectivenessLearner};
pub use prompt::{PromptConfig, PromptContext, build_prompt};
pub use recommendation::{Recommendation, affect_from_text, parse_recommendation};
pub use serde_compat::{
    CURRENT_VERSION, WireGazeFrame, export_json, import_json, parse_gaze_trace,
};
pub use transition::{ExpressionConfig, ExpressionTransitionEngine, Frame, RequestOutcome};
pub use vec3::Vec3;

/// Seconds of continuous gaze before a focused target becomes highlighted.
pub const DWELL_THRESHOLD_SECS: f64 = 0.5;

/// Seconds a focused target survives without a hit before focus ends.
pub const UNFOCUS_GRACE_SECS: f64 = 0.2;

/// Transition duration used when a request does not carry its own.
pub const DEFAULT_TRANSITION_SECS: f32 = 0.5;

/// Lower bound of a feature channel after blending.
pub const CHANNEL_MIN: f32 = 0.0;

/// Upper bound of a feature channel after blending (blend shape weight scale).
pub const CHANNEL_MAX: f32 = 100.0;

/// EMA smoothing factor for effectiveness weights.
pub const EVOLUTION_RATE: f32 = 0.1;

/// Interactions required before the learner's ranking is trusted.
pub const MIN_INTERACTIONS_FOR_RECOMMENDATION: u32 = 5;

/// Weight assigned to a freshly created effectiveness entry.
pub const INITIAL_WEIGHT: f32 = 1.0;

/// Interaction records kept in the rolling history.
pub const MAX_HISTORY: usize = 50;

/// Interaction records older than this many seconds are evicted.
pub const HISTORY_WINDOW_SECS: f64 = 600.0;

/// Minimum classifier confidence for an affect reading to count.
pub const AFFECT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Intensity delta that counts as a change of the same affect.
pub const AFFECT_CHANGE_THRESHOLD: f32 = 0.3;

/// Numerical epsilon for timing comparisons across ticks.
pub const EPSILON: f64 = 1e-9;

/// Intensity assumed when a recommendation does not carry one.
pub const DEFAULT_RECOMMENDATION_INTENSITY: f32 = 0.5;

/// Hold duration assumed when a recommendation does not carry one.
pub const DEFAULT_RECOMMENDATION_SECS: f32 = 2.0;

/// Interactions summarized in a generated prompt.
pub const PROMPT_CONTEXT_HISTORY: usize = 10;

//! Prompt text for an external text generator.
//!
//! The prompt describes the current affect, recent interactions and gaze
//! activity, and asks for a reply in the JSON shape that
//! [`parse_recommendation`](crate::recommendation::parse_recommendation) reads.

use serde::{Deserialize, Serialize};

use crate::affect::Affect;
use crate::constants::PROMPT_CONTEXT_HISTORY;
use crate::history::InteractionHistory;

pub const SYSTEM_PROMPT: &str = "You are a cat character that responds to human emotions and \
interactions. Determine the most appropriate cat facial expression based on the context provided.";

/// Reply shape requested from the generator.
pub const RESPONSE_FORMAT: &str = r#"{"expression": "expression_name", "intensity": 0.0-1.0, "duration": seconds, "reasoning": "brief explanation"}"#;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    /// Interactions listed under the history section.
    pub max_context_history: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_context_history: PROMPT_CONTEXT_HISTORY,
        }
    }
}

/// Everything the prompt can mention. Absent parts are left out.
#[derive(Clone, Debug, Default)]
pub struct PromptContext<'a> {
    pub affect: Option<Affect>,
    pub history: Option<&'a InteractionHistory>,
    /// Whether a valid gaze sample was seen recently.
    pub gaze_active: bool,
    /// Free-form extra context appended at the end.
    pub focus: Option<&'a str>,
}

pub fn build_prompt(config: &PromptConfig, ctx: &PromptContext<'_>) -> String {
    let mut lines = vec![config.system_prompt.clone(), String::new()];

    if let Some(affect) = ctx.affect {
        lines.push(format!("Current human expression: {affect}"));
    }
    if let Some(history) = ctx.history {
        lines.push("Recent interaction history:".to_string());
        lines.push(history.context_summary(config.max_context_history));
    }
    if ctx.gaze_active {
        lines.push("User is actively looking around (gaze detected)".to_string());
    }

    let names: Vec<&str> = Affect::ALL.iter().map(|a| a.as_str()).collect();
    lines.push(String::new());
    lines.push(format!(
        "Based on this context, what cat facial expression should be displayed? \
         Respond with JSON format: {RESPONSE_FORMAT}"
    ));
    lines.push(format!("Valid expressions: {}", names.join(", ")));

    let mut prompt = lines.join("\n");
    if let Some(focus) = ctx.focus.map(str::trim).filter(|f| !f.is_empty()) {
        prompt.push_str(&format!("\n\nAdditional context: {focus}"));
    }
    prompt
}

//! TOML configuration loading.
//!
//! ```toml
//! [gaze]
//! dwell_threshold_secs = 0.6
//!
//! [learner]
//! evolution_rate = 0.2
//!
//! [prompt]
//! max_context_history = 5
//!
//! [expressions.happy]
//! ear_forward = 90
//! mouth_smile = 80
//!
//! [expressions.smug]
//! eye_half_blink = 50
//! mouth_smile = 40
//! ```
//!
//! Lookup order: explicit path, then `MIEN_CONFIG`, then `<base>/config.toml`,
//! then built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use mien_core::{
    AffectConfig, BehaviorConfig, ExpressionConfig, ExpressionTable, GazeConfig, LearnerConfig,
    PromptConfig,
};

use crate::error::{Result, StoreError};

pub const CONFIG_ENV: &str = "MIEN_CONFIG";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FileConfig {
    gaze: GazeConfig,
    expression: ExpressionConfig,
    learner: LearnerConfig,
    affect: AffectConfig,
    prompt: PromptConfig,
    expressions: ExpressionTable,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            gaze: GazeConfig::default(),
            expression: ExpressionConfig::default(),
            learner: LearnerConfig::default(),
            affect: AffectConfig::default(),
            prompt: PromptConfig::default(),
            expressions: ExpressionTable::empty(),
        }
    }
}

/// Validated configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub behavior: BehaviorConfig,
    /// Built-in definitions with file overrides applied.
    pub expressions: ExpressionTable,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl Default for LoadedConfig {
    fn default() -> Self {
        Self {
            behavior: BehaviorConfig::default(),
            expressions: ExpressionTable::builtin(),
            source: None,
            warnings: Vec::new(),
        }
    }
}

/// Parse and validate TOML configuration text.
pub fn parse_config(text: &str) -> Result<LoadedConfig> {
    let file: FileConfig = toml::from_str(text)?;

    for (kind, definition) in file.expressions.iter() {
        for (channel, value) in definition.iter() {
            if !value.is_finite() {
                return Err(StoreError::Config(format!(
                    "expressions.{kind}.{channel} must be a finite number"
                )));
            }
        }
    }

    let raw = BehaviorConfig {
        gaze: file.gaze,
        expression: file.expression,
        learner: file.learner,
        affect: file.affect,
        prompt: file.prompt,
    };
    let (behavior, warnings) = raw.validated();

    Ok(LoadedConfig {
        behavior,
        expressions: ExpressionTable::builtin().merged(file.expressions),
        source: None,
        warnings,
    })
}

pub fn load_config_file(path: &Path) -> Result<LoadedConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| StoreError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut loaded = parse_config(&text)
        .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
    loaded.source = Some(path.to_path_buf());
    info!("loaded config from {}", path.display());
    Ok(loaded)
}

/// Path the lookup order settles on, if any. Explicit and env paths are
/// returned even when missing so the caller gets a read error.
pub fn resolve_config_path(explicit: Option<&Path>, base_dir: &Path) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = env::var(CONFIG_ENV)
        && !p.is_empty()
    {
        return Some(PathBuf::from(p));
    }
    let default = base_dir.join(CONFIG_FILE);
    default.is_file().then_some(default)
}

pub fn load_config(explicit: Option<&Path>, base_dir: &Path) -> Result<LoadedConfig> {
    match resolve_config_path(explicit, base_dir) {
        Some(path) => load_config_file(&path),
        None => {
            debug!("no config file, using defaults");
            Ok(LoadedConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mien_core::{Easing, ExpressionType};
    use tempfile::TempDir;

    #[test]
    fn test_empty_text_is_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.behavior, BehaviorConfig::default());
        assert_eq!(cfg.expressions, ExpressionTable::builtin());
        assert!(cfg.warnings.is_empty());
    }

    #[test]
    fn test_sections_and_overrides() {
        let cfg = parse_config(
            r#"
            [gaze]
            dwell_threshold_secs = 0.75

            [expression]
            easing = "ease_in_out_cubic"
            max_queue = 4

            [learner]
            evolution_rate = 0.25

            [prompt]
            max_context_history = 3

            [expressions.happy]
            ear_forward = 90.0

            [expressions.smug]
            eye_half_blink = 50.0
            mouth_smile = 40.0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.behavior.gaze.dwell_threshold_secs, 0.75);
        assert_eq!(cfg.behavior.gaze.unfocus_grace_secs, 0.2);
        assert_eq!(cfg.behavior.expression.easing, Easing::EaseInOutCubic);
        assert_eq!(cfg.behavior.expression.max_queue, Some(4));
        assert_eq!(cfg.behavior.learner.evolution_rate, 0.25);
        assert_eq!(cfg.behavior.prompt.max_context_history, 3);
        assert!(cfg.behavior.prompt.system_prompt.starts_with("You are a cat"));

        let happy = cfg.expressions.get(&ExpressionType::Happy).unwrap();
        assert_eq!(happy.get("ear_forward"), 90.0);
        // Overrides replace the whole definition.
        assert_eq!(happy.get("mouth_smile"), 0.0);

        let smug = cfg.expressions.get(&ExpressionType::parse("smug")).unwrap();
        assert_eq!(smug.get("mouth_smile"), 40.0);
        assert!(cfg.expressions.contains(&ExpressionType::Sad));
    }

    #[test]
    fn test_out_of_range_values_warn() {
        let cfg = parse_config("[learner]\nevolution_rate = 3.0\n").unwrap();
        assert_eq!(cfg.behavior.learner.evolution_rate, 1.0);
        assert_eq!(cfg.warnings.len(), 1);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = parse_config("[gaze\ndwell = ").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let err = parse_config("[gaze]\ndwell_threshold_secs = \"slow\"\n").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[learner]\nevolution_rate = 0.3\n").unwrap();
        let explicit = dir.path().join("other.toml");
        fs::write(&explicit, "[learner]\nevolution_rate = 0.4\n").unwrap();

        let cfg = load_config(Some(&explicit), dir.path()).unwrap();
        assert_eq!(cfg.behavior.learner.evolution_rate, 0.4);
        assert_eq!(cfg.source.as_deref(), Some(explicit.as_path()));
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        let dir = TempDir::new().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}

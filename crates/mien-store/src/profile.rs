use std::path::{Path, PathBuf};
use std::{env, fs};

use tracing::debug;
use uuid::Uuid;

use mien_core::{
    Affect, EffectivenessEntry, InteractionRecord, LearnerConfig, ResponseEffectivenessLearner,
};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DEFAULT_PROFILE: &str = "default";

/// Default base directory for all mien storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".mien")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sanitize a profile name for use as a filename.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn resolve_profile_name(name: Option<&str>) -> String {
    name.map(|n| sanitize_name(n.trim()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Names of the profiles under `base`, sorted.
pub fn list_profiles(base: &Path) -> Result<Vec<String>> {
    let dir = base.join("profiles");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(&dir).map_err(|e| {
        StoreError::InvalidData(format!("failed to read {}: {e}", dir.display()))
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            (path.extension()? == "db")
                .then(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .flatten()
        })
        .collect();
    names.sort();
    Ok(names)
}

/// Per-character learner storage with a shared global layer.
///
/// Layout:
/// ```text
/// ~/.mien/
/// ├── config.toml
/// ├── global.db
/// └── profiles/
///     ├── default.db
///     └── <profile>.db
/// ```
///
/// Every recorded interaction lands in both the profile and the global
/// database, so a new character can start from what all the others learned.
pub struct ProfileStore {
    profile: Store,
    global: Store,
    profile_name: String,
    session_id: Uuid,
}

impl ProfileStore {
    /// Open profile and global stores, creating directories as needed.
    /// `base_dir` overrides `~/.mien`.
    pub fn open(profile_name: Option<&str>, base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        let profiles_dir = base.join("profiles");

        fs::create_dir_all(&profiles_dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", profiles_dir.display()))
        })?;

        let profile_name = resolve_profile_name(profile_name);
        let profile = Store::open(&profiles_dir.join(format!("{profile_name}.db")))?;
        let global = Store::open(&base.join("global.db"))?;
        debug!("opened profile '{profile_name}' under {}", base.display());

        Ok(Self {
            profile,
            global,
            profile_name,
            session_id: Uuid::new_v4(),
        })
    }

    /// Open with in-memory stores (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            profile: Store::open_in_memory()?,
            global: Store::open_in_memory()?,
            profile_name: "test".to_string(),
            session_id: Uuid::new_v4(),
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Identifier stamped on every interaction written through this handle.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn profile_store(&self) -> &Store {
        &self.profile
    }

    pub fn global_store(&self) -> &Store {
        &self.global
    }

    pub fn load_learner(&self, config: LearnerConfig) -> Result<ResponseEffectivenessLearner> {
        self.profile.load_learner(config)
    }

    pub fn save_learner(&self, learner: &ResponseEffectivenessLearner) -> Result<()> {
        self.profile.save_learner(learner)
    }

    /// Learner over the global table, aggregated across profiles.
    pub fn global_learner(&self, config: LearnerConfig) -> Result<ResponseEffectivenessLearner> {
        self.global.load_learner(config)
    }

    /// Record one outcome in the profile and global stores.
    ///
    /// The profile writes commit together before `learner` is touched, so a
    /// failed write leaves both the learner and the profile unchanged. The
    /// global replay runs in its own transaction afterwards.
    pub fn record(
        &self,
        learner: &mut ResponseEffectivenessLearner,
        affect: Affect,
        response_id: &str,
        success: bool,
    ) -> Result<EffectivenessEntry> {
        let mut updated = learner.clone();
        let entry = updated.record_response(affect, response_id, success).clone();
        let record = InteractionRecord {
            affect,
            response_id: response_id.to_string(),
            success,
            timestamp: updated.clock(),
        };

        self.profile.record_observation(
            &entry,
            self.session_id,
            &self.profile_name,
            &record,
            Some(updated.clock()),
        )?;
        *learner = updated;

        self.global.replay_observation(
            learner.config().clone(),
            self.session_id,
            &self.profile_name,
            &record,
        )?;
        Ok(entry)
    }

    /// Replace the profile's table and interaction log with an imported
    /// learner. Global folds the counts in with
    /// [`ResponseEffectivenessLearner::merge_from`] and appends the history.
    pub fn import_learner(&self, imported: &ResponseEffectivenessLearner) -> Result<()> {
        self.profile
            .replace_learner(imported, self.session_id, &self.profile_name)?;
        self.global
            .merge_learner(imported, self.session_id, &self.profile_name)
    }
}

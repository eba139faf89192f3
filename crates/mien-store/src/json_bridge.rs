use std::fs;
use std::path::Path;

use uuid::Uuid;

use mien_core::{LearnerConfig, ResponseEffectivenessLearner, export_json, import_json};

use crate::error::{Result, StoreError};
use crate::profile::ProfileStore;
use crate::store::Store;

fn parse_export(json: &str, config: LearnerConfig) -> Result<ResponseEffectivenessLearner> {
    import_json(json, config).map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| StoreError::InvalidData(format!("failed to read {}: {e}", path.display())))
}

impl Store {
    /// Import a v1 learner export file, replacing the stored table and the
    /// interaction log. History rows are labelled with `profile`.
    pub fn import_json_file(
        &self,
        path: &Path,
        profile: &str,
        config: LearnerConfig,
    ) -> Result<()> {
        self.import_json_str(&read_file(path)?, profile, config)
    }

    pub fn import_json_str(&self, json: &str, profile: &str, config: LearnerConfig) -> Result<()> {
        let learner = parse_export(json, config)?;
        self.replace_learner(&learner, Uuid::new_v4(), profile)
    }

    /// Export the stored learner to a v1 JSON file.
    pub fn export_json_file(&self, path: &Path, profile: &str, config: LearnerConfig) -> Result<()> {
        let json = self.export_json_string(profile, config)?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self, profile: &str, config: LearnerConfig) -> Result<String> {
        let learner = self.load_learner(config)?;
        export_json(&learner, profile)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }
}

impl ProfileStore {
    /// Import into the profile store and fold the counts into global.
    pub fn import_json_file(&self, path: &Path, config: LearnerConfig) -> Result<usize> {
        let learner = parse_export(&read_file(path)?, config)?;
        self.import_learner(&learner)?;
        Ok(learner.entry_count())
    }

    pub fn export_json_file(&self, path: &Path, config: LearnerConfig) -> Result<()> {
        self.profile_store()
            .export_json_file(path, self.profile_name(), config)
    }
}

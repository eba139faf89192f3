use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use mien_core::time::now_iso8601;
use mien_core::{
    Affect, EffectivenessEntry, InteractionRecord, LearnerConfig, ResponseEffectivenessLearner,
};

use crate::error::{Result, StoreError};
use crate::schema;

/// An interaction row as persisted, with its provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredInteraction {
    pub session_id: Uuid,
    pub profile: String,
    pub record: InteractionRecord,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata_on(&self.conn, key, value)
    }

    // --- Save ---

    /// Replace the stored effectiveness table with the learner's.
    /// The interaction log is append-only and left untouched.
    pub fn save_learner(&self, learner: &ResponseEffectivenessLearner) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM effectiveness", [])?;
        for entry in learner.entries() {
            upsert_entry_on(&tx, entry)?;
        }
        set_metadata_on(&tx, "learner_clock", &learner.clock().to_string())?;
        tx.commit()?;
        Ok(())
    }

    /// Replace both the effectiveness table and the interaction log with
    /// the learner's, in one transaction. The retained history becomes the
    /// new log, stamped with `session_id`.
    pub fn replace_learner(
        &self,
        learner: &ResponseEffectivenessLearner,
        session_id: Uuid,
        profile: &str,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM effectiveness", [])?;
        tx.execute("DELETE FROM interactions", [])?;
        for entry in learner.entries() {
            upsert_entry_on(&tx, entry)?;
        }
        for record in learner.history().iter() {
            append_interaction_on(&tx, session_id, profile, record)?;
        }
        set_metadata_on(&tx, "learner_clock", &learner.clock().to_string())?;
        tx.commit()?;
        Ok(())
    }

    /// Fold `imported` into the stored table with
    /// [`ResponseEffectivenessLearner::merge_from`] and append its history,
    /// in one transaction.
    pub fn merge_learner(
        &self,
        imported: &ResponseEffectivenessLearner,
        session_id: Uuid,
        profile: &str,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut merged = self.load_learner(imported.config().clone())?;
        merged.merge_from(imported);
        for entry in merged.entries() {
            upsert_entry_on(&tx, entry)?;
        }
        for record in imported.history().iter() {
            append_interaction_on(&tx, session_id, profile, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replay one observation against the stored entry for its pair and
    /// persist the result with its interaction row, in one transaction.
    pub fn replay_observation(
        &self,
        config: LearnerConfig,
        session_id: Uuid,
        profile: &str,
        record: &InteractionRecord,
    ) -> Result<EffectivenessEntry> {
        let tx = self.conn.unchecked_transaction()?;
        let existing = self.load_entry(record.affect, &record.response_id)?;
        let mut learner = ResponseEffectivenessLearner::with_entries(config, existing);
        let entry = learner
            .record_response(record.affect, &record.response_id, record.success)
            .clone();
        upsert_entry_on(&tx, &entry)?;
        append_interaction_on(&tx, session_id, profile, record)?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn upsert_entry(&self, entry: &EffectivenessEntry) -> Result<()> {
        upsert_entry_on(&self.conn, entry)
    }

    pub fn append_interaction(
        &self,
        session_id: Uuid,
        profile: &str,
        record: &InteractionRecord,
    ) -> Result<i64> {
        append_interaction_on(&self.conn, session_id, profile, record)
    }

    /// Write one observation atomically: the updated entry, its interaction
    /// row and, when given, the learner clock. Nothing is written on error.
    pub fn record_observation(
        &self,
        entry: &EffectivenessEntry,
        session_id: Uuid,
        profile: &str,
        record: &InteractionRecord,
        clock: Option<f64>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        upsert_entry_on(&tx, entry)?;
        append_interaction_on(&tx, session_id, profile, record)?;
        if let Some(clock) = clock {
            set_metadata_on(&tx, "learner_clock", &clock.to_string())?;
        }
        tx.commit()?;
        Ok(())
    }

    // --- Load ---

    /// Rebuild a learner from the stored table. The most recent interactions
    /// (up to `max_history`) are restored as its history.
    pub fn load_learner(&self, config: LearnerConfig) -> Result<ResponseEffectivenessLearner> {
        let history_len = config.max_history;
        let mut learner = ResponseEffectivenessLearner::with_entries(config, self.load_entries()?);

        let history = self
            .recent_interactions(history_len)?
            .into_iter()
            .map(|s| s.record);
        learner.restore_history(history);

        if let Some(clock) = self
            .get_metadata("learner_clock")?
            .and_then(|v| v.parse::<f64>().ok())
        {
            learner.tick(clock);
        }
        Ok(learner)
    }

    pub fn load_entries(&self) -> Result<Vec<EffectivenessEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT affect, response_id, success_count, total_count, weight
             FROM effectiveness ORDER BY affect, response_id",
        )?;

        let rows: Vec<(String, String, u32, u32, f32)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(affect, response_id, success_count, total_count, weight)| {
                Ok(EffectivenessEntry {
                    affect: parse_affect(&affect)?,
                    response_id,
                    success_count,
                    total_count,
                    weight,
                })
            })
            .collect()
    }

    pub fn load_entry(&self, affect: Affect, response_id: &str) -> Result<Option<EffectivenessEntry>> {
        let row: Option<(u32, u32, f32)> = self
            .conn
            .query_row(
                "SELECT success_count, total_count, weight FROM effectiveness
                 WHERE affect = ?1 AND response_id = ?2",
                params![affect.as_str(), response_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map(|(success_count, total_count, weight)| EffectivenessEntry {
            affect,
            response_id: response_id.to_string(),
            success_count,
            total_count,
            weight,
        }))
    }

    /// The last `limit` interactions, oldest first.
    pub fn recent_interactions(&self, limit: usize) -> Result<Vec<StoredInteraction>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, profile, affect, response_id, success, timestamp
             FROM (SELECT * FROM interactions ORDER BY id DESC LIMIT ?1)
             ORDER BY id ASC",
        )?;

        let rows: Vec<(String, String, String, String, bool, f64)> = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(session, profile, affect, response_id, success, timestamp)| {
                Ok(StoredInteraction {
                    session_id: parse_uuid(&session)?,
                    profile,
                    record: InteractionRecord {
                        affect: parse_affect(&affect)?,
                        response_id,
                        success,
                        timestamp,
                    },
                })
            })
            .collect()
    }

    // --- Stats ---

    pub fn entry_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM effectiveness", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn interaction_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn session_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT session_id) FROM interactions",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn set_metadata_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn append_interaction_on(
    conn: &Connection,
    session_id: Uuid,
    profile: &str,
    record: &InteractionRecord,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO interactions (session_id, profile, affect, response_id, success, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id.to_string(),
            profile,
            record.affect.as_str(),
            record.response_id,
            record.success,
            record.timestamp,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_entry_on(conn: &Connection, entry: &EffectivenessEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO effectiveness (affect, response_id, success_count, total_count, weight, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(affect, response_id) DO UPDATE SET
            success_count = excluded.success_count,
            total_count   = excluded.total_count,
            weight        = excluded.weight,
            updated_at    = excluded.updated_at",
        params![
            entry.affect.as_str(),
            entry.response_id,
            entry.success_count,
            entry.total_count,
            entry.weight,
            now_iso8601(),
        ],
    )?;
    Ok(())
}

fn parse_affect(s: &str) -> Result<Affect> {
    Affect::parse(s).ok_or_else(|| StoreError::InvalidData(format!("unknown affect '{s}'")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> ResponseEffectivenessLearner {
        let mut learner = ResponseEffectivenessLearner::new(LearnerConfig::default());
        learner.tick(12.5);
        for _ in 0..3 {
            learner.record_response(Affect::Happy, "purr", true);
        }
        learner.record_response(Affect::Happy, "chirp", false);
        learner.record_response(Affect::Sad, "slow_blink", true);
        learner
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let original = trained();

        store.save_learner(&original).unwrap();
        let loaded = store.load_learner(LearnerConfig::default()).unwrap();

        assert_eq!(loaded.entry_count(), 3);
        assert_eq!(loaded.total_interactions(), 5);
        assert_eq!(
            loaded.entry(Affect::Happy, "purr"),
            original.entry(Affect::Happy, "purr")
        );
        assert_eq!(loaded.best_response(Affect::Happy), Some("purr"));
        assert_eq!(loaded.clock(), 12.5);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let store = Store::open_in_memory().unwrap();
        store.save_learner(&trained()).unwrap();

        let fresh = ResponseEffectivenessLearner::new(LearnerConfig::default());
        store.save_learner(&fresh).unwrap();
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_entry() {
        let store = Store::open_in_memory().unwrap();
        let mut entry = EffectivenessEntry::new(Affect::Confused, "head_tilt", 1.0);
        entry.total_count = 1;
        store.upsert_entry(&entry).unwrap();

        entry.total_count = 2;
        entry.success_count = 1;
        entry.weight = 0.95;
        store.upsert_entry(&entry).unwrap();

        let loaded = store.load_entry(Affect::Confused, "head_tilt").unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(store.load_entry(Affect::Angry, "head_tilt").unwrap().is_none());
    }

    #[test]
    fn test_interactions_log() {
        let store = Store::open_in_memory().unwrap();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();

        for (i, s) in [session, session, other].into_iter().enumerate() {
            store
                .append_interaction(
                    s,
                    "tabby",
                    &InteractionRecord {
                        affect: Affect::Happy,
                        response_id: format!("r{i}"),
                        success: i % 2 == 0,
                        timestamp: i as f64,
                    },
                )
                .unwrap();
        }

        assert_eq!(store.interaction_count().unwrap(), 3);
        assert_eq!(store.session_count().unwrap(), 2);

        let recent = store.recent_interactions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].record.response_id, "r1");
        assert_eq!(recent[1].session_id, other);
        assert_eq!(recent[1].profile, "tabby");
    }

    #[test]
    fn test_load_restores_history() {
        let store = Store::open_in_memory().unwrap();
        let session = Uuid::new_v4();
        let learner = trained();
        for record in learner.history().iter() {
            store.append_interaction(session, "default", record).unwrap();
        }
        store.save_learner(&learner).unwrap();

        let loaded = store
            .load_learner(LearnerConfig {
                max_history: 2,
                ..LearnerConfig::default()
            })
            .unwrap();
        assert_eq!(loaded.history().len(), 2);
        assert_eq!(
            loaded.history().iter().last().map(|r| r.response_id.as_str()),
            Some("slow_blink")
        );
    }

    #[test]
    fn test_record_observation_is_atomic() {
        let store = Store::open_in_memory().unwrap();
        let mut entry = EffectivenessEntry::new(Affect::Happy, "purr", 1.0);
        entry.total_count = 1;
        entry.success_count = 1;
        let record = InteractionRecord {
            affect: Affect::Happy,
            response_id: "purr".to_string(),
            success: true,
            timestamp: 4.0,
        };

        store.conn().execute_batch("DROP TABLE interactions").unwrap();
        assert!(
            store
                .record_observation(&entry, Uuid::new_v4(), "tabby", &record, Some(4.0))
                .is_err()
        );
        assert!(store.load_entry(Affect::Happy, "purr").unwrap().is_none());
        assert!(store.get_metadata("learner_clock").unwrap().is_none());
    }

    #[test]
    fn test_replace_learner_replaces_log() {
        let store = Store::open_in_memory().unwrap();
        let learner = trained();
        let session = Uuid::new_v4();

        store.replace_learner(&learner, session, "tabby").unwrap();
        store.replace_learner(&learner, session, "tabby").unwrap();

        assert_eq!(store.entry_count().unwrap(), 3);
        assert_eq!(store.interaction_count().unwrap(), 5);
        let loaded = store.load_learner(LearnerConfig::default()).unwrap();
        assert_eq!(loaded.history().len(), 5);
        assert_eq!(loaded.clock(), 12.5);
    }

    #[test]
    fn test_unknown_affect_is_invalid_data() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO effectiveness (affect, response_id, weight) VALUES ('bored', 'yawn', 1.0)",
                [],
            )
            .unwrap();
        let err = store.load_entries().unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_metadata("foo").unwrap().is_none());
        store.set_metadata("foo", "bar").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("bar".to_string()));
    }

    #[test]
    fn test_load_empty_db() {
        let store = Store::open_in_memory().unwrap();
        let learner = store.load_learner(LearnerConfig::default()).unwrap();
        assert_eq!(learner.entry_count(), 0);
        assert!(learner.history().is_empty());
        assert_eq!(learner.clock(), 0.0);
    }
}

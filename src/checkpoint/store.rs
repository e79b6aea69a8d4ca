use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::Checkpoint;
use crate::chapter::{Chapter, ChapterId};
use crate::errors::PipelineError;
use crate::util::write_atomic;

/// Loads and saves the checkpoint file.
///
/// Saves are atomic: the JSON is written to a temporary file next to the
/// checkpoint and renamed over it, so a later `load` never observes a
/// partially written checkpoint.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the last persisted checkpoint, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<Checkpoint>, PipelineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| PipelineError::CheckpointLoad {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|e| PipelineError::CheckpointLoad {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        debug!(
            path = %self.path.display(),
            entries = checkpoint.entries.len(),
            "checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }

    /// Starting checkpoint for a run over `chapters`.
    ///
    /// Fresh runs always start all-pending. Resumed runs continue from the
    /// stored checkpoint, which must cover exactly the same chapters in the
    /// same order; a chapter left `generating` is reset to `pending`.
    pub fn load_for_run(
        &self,
        chapters: &[Chapter],
        resume: bool,
    ) -> Result<Checkpoint, PipelineError> {
        if !resume {
            return Ok(Checkpoint::fresh(chapters));
        }

        let Some(mut checkpoint) = self.load()? else {
            info!("no checkpoint to resume from, starting fresh");
            return Ok(Checkpoint::fresh(chapters));
        };

        let requested: Vec<ChapterId> = chapters.iter().map(|c| c.id).collect();
        let stored = checkpoint.chapter_ids();
        if stored != requested {
            return Err(PipelineError::CheckpointMismatch {
                stored: join(&stored),
                requested: join(&requested),
            });
        }

        if !checkpoint.is_prefix_consistent() {
            return Err(PipelineError::CheckpointLoad {
                path: self.path.clone(),
                message: "resolved chapter follows an unresolved one".to_string(),
            });
        }

        checkpoint.reset_in_flight();
        Ok(checkpoint)
    }

    /// Persist the checkpoint atomically.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(checkpoint).map_err(|e| {
            PipelineError::PersistenceFailure {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| PipelineError::PersistenceFailure {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }

    pub fn reset(&self) -> anyhow::Result<()> {
        use anyhow::Context;
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove checkpoint file")?;
        }
        Ok(())
    }
}

fn join(ids: &[ChapterId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ChapterStatus;
    use tempfile::tempdir;

    fn chapters(ids: &[ChapterId]) -> Vec<Chapter> {
        ids.iter().copied().map(Chapter::from_id).collect()
    }

    fn make_store() -> (CheckpointStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".awp/checkpoint.json");
        (CheckpointStore::new(path), dir)
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (store, _dir) = make_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (store, _dir) = make_store();
        let mut cp = Checkpoint::fresh(&chapters(&[1, 2]));
        cp.set_status(1, ChapterStatus::Approved);
        store.save(&cp).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.status(1), Some(ChapterStatus::Approved));
        assert_eq!(loaded.status(2), Some(ChapterStatus::Pending));
    }

    #[test]
    fn test_fresh_run_ignores_stored_checkpoint() {
        let (store, _dir) = make_store();
        let mut cp = Checkpoint::fresh(&chapters(&[1, 2]));
        cp.set_status(1, ChapterStatus::Approved);
        store.save(&cp).unwrap();

        let run = store.load_for_run(&chapters(&[1, 2]), false).unwrap();
        assert_eq!(run.unresolved(), vec![1, 2]);
    }

    #[test]
    fn test_resume_resets_in_flight_chapter() {
        let (store, _dir) = make_store();
        let mut cp = Checkpoint::fresh(&chapters(&[1, 2, 3]));
        cp.set_status(1, ChapterStatus::Approved);
        cp.set_status(2, ChapterStatus::Generating);
        store.save(&cp).unwrap();

        let run = store.load_for_run(&chapters(&[1, 2, 3]), true).unwrap();
        assert_eq!(run.status(1), Some(ChapterStatus::Approved));
        assert_eq!(run.status(2), Some(ChapterStatus::Pending));
        assert_eq!(run.unresolved(), vec![2, 3]);
    }

    #[test]
    fn test_resume_without_checkpoint_is_fresh() {
        let (store, _dir) = make_store();
        let run = store.load_for_run(&chapters(&[1]), true).unwrap();
        assert_eq!(run.unresolved(), vec![1]);
    }

    #[test]
    fn test_resume_with_different_selection_is_mismatch() {
        let (store, _dir) = make_store();
        store.save(&Checkpoint::fresh(&chapters(&[1, 2, 3]))).unwrap();
        let err = store.load_for_run(&chapters(&[1, 2]), true).unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointMismatch { .. }));
        assert!(err.is_pre_spawn());
    }

    #[test]
    fn test_corrupt_checkpoint_is_load_error() {
        let (store, _dir) = make_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{\"entries\": [").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointLoad { .. }));
    }

    #[test]
    fn test_stray_temp_file_is_never_observed() {
        let (store, _dir) = make_store();
        let mut cp = Checkpoint::fresh(&chapters(&[1, 2]));
        cp.set_status(1, ChapterStatus::Approved);
        store.save(&cp).unwrap();

        // Leftover from a process killed mid-write
        let stray = store.path().parent().unwrap().join(".tmpABC123");
        std::fs::write(&stray, "{\"entries\": [{\"chap").unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[test]
    fn test_save_failure_is_persistence_failure() {
        let dir = tempdir().unwrap();
        // Parent path is a regular file, so the directory can't be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoint.json"));
        let err = store.save(&Checkpoint::fresh(&chapters(&[1]))).unwrap_err();
        assert!(matches!(err, PipelineError::PersistenceFailure { .. }));
    }

    #[test]
    fn test_reset_removes_file() {
        let (store, _dir) = make_store();
        store.save(&Checkpoint::fresh(&chapters(&[1]))).unwrap();
        assert!(store.exists());
        store.reset().unwrap();
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }
}

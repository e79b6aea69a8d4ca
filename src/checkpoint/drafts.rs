use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::chapter::ChapterId;
use crate::util::write_atomic;

/// Approved chapter text, one markdown file per chapter under `.awp/chapters/`.
///
/// Assembly reads from here, so chapters approved in an earlier run are part
/// of the document produced by a resumed run.
pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, chapter: ChapterId) -> PathBuf {
        self.dir.join(format!("chapter{:02}.md", chapter))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, chapter: ChapterId, content: &str) -> Result<PathBuf> {
        let path = self.path_for(chapter);
        write_atomic(&path, content.as_bytes())
            .with_context(|| format!("Failed to write chapter draft: {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, chapter: ChapterId) -> Result<Option<String>> {
        let path = self.path_for(chapter);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read chapter draft: {}", path.display()))?;
        Ok(Some(content))
    }

    pub fn remove(&self, chapter: ChapterId) -> Result<()> {
        let path = self.path_for(chapter);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove chapter draft: {}", path.display()))?;
        }
        Ok(())
    }

    /// Remove every stored draft.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).context("Failed to remove chapter drafts")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_remove() {
        let dir = tempdir().unwrap();
        let drafts = DraftStore::new(dir.path().join("chapters"));
        assert!(drafts.load(1).unwrap().is_none());

        let path = drafts.save(1, "Intro text").unwrap();
        assert!(path.ends_with("chapter01.md"));
        assert_eq!(drafts.load(1).unwrap().as_deref(), Some("Intro text"));

        drafts.save(1, "Rewritten").unwrap();
        assert_eq!(drafts.load(1).unwrap().as_deref(), Some("Rewritten"));

        drafts.remove(1).unwrap();
        assert!(drafts.load(1).unwrap().is_none());
        drafts.remove(1).unwrap();
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let drafts = DraftStore::new(dir.path().join("chapters"));
        drafts.save(1, "a").unwrap();
        drafts.save(2, "b").unwrap();
        drafts.clear().unwrap();
        assert!(!drafts.dir().exists());
        drafts.clear().unwrap();
    }
}

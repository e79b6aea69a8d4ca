//! Per-chapter progress record.
//!
//! A `Checkpoint` is a snapshot of every selected chapter's status, kept in
//! stage order. It is persisted after each status transition by
//! [`CheckpointStore`] so a crash loses at most the chapter in flight.
//!
//! Invariants maintained by the orchestrator and checked by
//! [`Checkpoint::is_prefix_consistent`]:
//! - at most one chapter is `generating`
//! - no chapter is resolved (`approved`/`skipped`) while an earlier one is not

mod drafts;
mod store;

pub use drafts::DraftStore;
pub use store::CheckpointStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chapter::{Chapter, ChapterId};

/// Current on-disk schema version. Older controllers ignore fields they
/// don't know; newer statuses they don't know read back as `pending`.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChapterStatus {
    Pending,
    Generating,
    Approved,
    Skipped,
}

impl ChapterStatus {
    /// Approved and skipped chapters are never revisited on resume.
    pub fn is_resolved(self) -> bool {
        matches!(self, ChapterStatus::Approved | ChapterStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Generating => "generating",
            ChapterStatus::Approved => "approved",
            ChapterStatus::Skipped => "skipped",
        }
    }
}

impl From<String> for ChapterStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "generating" => ChapterStatus::Generating,
            "approved" => ChapterStatus::Approved,
            "skipped" => ChapterStatus::Skipped,
            _ => ChapterStatus::Pending,
        }
    }
}

impl From<ChapterStatus> for String {
    fn from(status: ChapterStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub chapter: ChapterId,
    pub status: ChapterStatus,
    /// Number of generate commands issued for this chapter
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_version")]
    pub version: u32,
    pub entries: Vec<CheckpointEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl Checkpoint {
    /// A checkpoint with every chapter `pending`.
    pub fn fresh(chapters: &[Chapter]) -> Self {
        Self {
            version: SCHEMA_VERSION,
            entries: chapters
                .iter()
                .map(|c| CheckpointEntry {
                    chapter: c.id,
                    status: ChapterStatus::Pending,
                    attempts: 0,
                    updated_at: None,
                })
                .collect(),
            updated_at: None,
        }
    }

    pub fn chapter_ids(&self) -> Vec<ChapterId> {
        self.entries.iter().map(|e| e.chapter).collect()
    }

    pub fn entry(&self, chapter: ChapterId) -> Option<&CheckpointEntry> {
        self.entries.iter().find(|e| e.chapter == chapter)
    }

    pub fn status(&self, chapter: ChapterId) -> Option<ChapterStatus> {
        self.entry(chapter).map(|e| e.status)
    }

    /// Set a chapter's status. Returns `false` if the chapter isn't tracked.
    pub fn set_status(&mut self, chapter: ChapterId, status: ChapterStatus) -> bool {
        let now = Utc::now();
        match self.entries.iter_mut().find(|e| e.chapter == chapter) {
            Some(entry) => {
                entry.status = status;
                entry.updated_at = Some(now);
                self.updated_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Count one more generate command for a chapter.
    pub fn record_attempt(&mut self, chapter: ChapterId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.chapter == chapter) {
            entry.attempts += 1;
        }
    }

    /// Chapters still to be resolved, in stage order.
    pub fn unresolved(&self) -> Vec<ChapterId> {
        self.entries
            .iter()
            .filter(|e| !e.status.is_resolved())
            .map(|e| e.chapter)
            .collect()
    }

    pub fn approved(&self) -> Vec<ChapterId> {
        self.entries
            .iter()
            .filter(|e| e.status == ChapterStatus::Approved)
            .map(|e| e.chapter)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.status.is_resolved())
    }

    pub fn generating_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == ChapterStatus::Generating)
            .count()
    }

    /// True when at most one chapter is generating and no resolved chapter
    /// follows an unresolved one.
    pub fn is_prefix_consistent(&self) -> bool {
        if self.generating_count() > 1 {
            return false;
        }
        let mut seen_unresolved = false;
        for entry in &self.entries {
            if entry.status.is_resolved() {
                if seen_unresolved {
                    return false;
                }
            } else {
                seen_unresolved = true;
            }
        }
        true
    }

    /// A chapter that was in flight when the previous run stopped is
    /// generated again from scratch.
    pub fn reset_in_flight(&mut self) {
        for entry in &mut self.entries {
            if entry.status == ChapterStatus::Generating {
                entry.status = ChapterStatus::Pending;
            }
        }
    }
}

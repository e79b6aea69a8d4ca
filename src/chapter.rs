//! Chapter catalogue and chapter selection.
//!
//! This module provides:
//! - `Chapter` — a single document stage the worker authors
//! - the default seven-chapter catalogue of a paper
//! - `ChapterSelector` — parsing of `all` / `1,2,3` selections

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chapter identifier as used on the worker command line and in checkpoints.
pub type ChapterId = u32;

/// Default chapter titles, in document order.
const CATALOGUE: &[(ChapterId, &str)] = &[
    (1, "Introduction"),
    (2, "Existing Methods"),
    (3, "Proposed Method"),
    (4, "Implementation"),
    (5, "Experiments"),
    (6, "Discussion"),
    (7, "Conclusion"),
];

/// A single chapter of the generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub name: String,
}

impl Chapter {
    pub fn new(id: ChapterId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }

    /// Look up a chapter in the default catalogue; unknown ids are named `Unknown`.
    pub fn from_id(id: ChapterId) -> Self {
        Self::new(id, chapter_name(id))
    }

    /// Anchor used in the assembled markdown table of contents.
    pub fn anchor(&self) -> String {
        format!("{}-{}", self.id, self.name.to_lowercase().replace(' ', "-"))
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chapter {}: {}", self.id, self.name)
    }
}

pub fn chapter_name(id: ChapterId) -> &'static str {
    CATALOGUE
        .iter()
        .find(|(cid, _)| *cid == id)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// Ids of every chapter in the default catalogue.
pub fn all_chapter_ids() -> Vec<ChapterId> {
    CATALOGUE.iter().map(|(id, _)| *id).collect()
}

/// Which chapters a `generate` run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterSelector {
    /// Every chapter configured for the project
    All,
    /// An explicit ordered subset
    Explicit(Vec<ChapterId>),
}

impl ChapterSelector {
    /// Resolve against the project's configured chapter list.
    pub fn resolve(&self, configured: &[ChapterId]) -> Vec<Chapter> {
        match self {
            ChapterSelector::All => configured.iter().copied().map(Chapter::from_id).collect(),
            ChapterSelector::Explicit(ids) => ids.iter().copied().map(Chapter::from_id).collect(),
        }
    }
}

impl std::str::FromStr for ChapterSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(ChapterSelector::All);
        }

        let mut ids = Vec::new();
        for part in trimmed.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id: ChapterId = match part.parse() {
                Ok(id) => id,
                Err(_) => bail!(
                    "Invalid chapter '{}'. Use 'all' or a comma-separated list such as '1,2,3'",
                    part
                ),
            };
            if ids.contains(&id) {
                bail!("Chapter {} selected more than once", id);
            }
            ids.push(id);
        }

        if ids.is_empty() {
            bail!("No chapters selected");
        }
        Ok(ChapterSelector::Explicit(ids))
    }
}

/// Render chapter ids as the comma-separated form used on the worker command line.
pub fn join_ids(chapters: &[Chapter]) -> String {
    chapters
        .iter()
        .map(|c| c.id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

//! Operator review of checkpointed chapters.
//!
//! When the worker pauses on a review checkpoint, the orchestrator hands a
//! [`ReviewRequest`] to a [`ReviewGate`] and blocks until a
//! [`ReviewDecision`] comes back. Only one request is ever outstanding.
//!
//! Non-interactive runs (dry-run, review disabled) never construct a gate.

mod terminal;

pub use terminal::TerminalReviewGate;

use std::fmt;

use crate::chapter::Chapter;
use crate::errors::PipelineError;

/// Operator verdict on a chapter draft. The lowercase names are the literal
/// tokens written back to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Regenerate,
    Skip,
    Abort,
}

impl ReviewDecision {
    pub const ALL: [ReviewDecision; 4] = [
        ReviewDecision::Approve,
        ReviewDecision::Regenerate,
        ReviewDecision::Skip,
        ReviewDecision::Abort,
    ];

    /// Token sent to the worker.
    pub fn token(self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Regenerate => "regenerate",
            ReviewDecision::Skip => "skip",
            ReviewDecision::Abort => "abort",
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl std::str::FromStr for ReviewDecision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "approve" => Ok(ReviewDecision::Approve),
            "regenerate" => Ok(ReviewDecision::Regenerate),
            "skip" => Ok(ReviewDecision::Skip),
            "abort" => Ok(ReviewDecision::Abort),
            other => anyhow::bail!(
                "Invalid decision '{}'. Valid values: approve, regenerate, skip, abort",
                other
            ),
        }
    }
}

/// Snapshot of the worker's latest draft for a checkpointed chapter.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub chapter: Chapter,
    pub rendered_preview: String,
    /// 1 for the first draft, incremented on each regenerate
    pub attempt: u32,
}

impl ReviewRequest {
    pub fn word_count(&self) -> usize {
        self.rendered_preview.split_whitespace().count()
    }
}

/// Blocks the pipeline until an operator decides on a draft.
pub trait ReviewGate: Send {
    fn request(&mut self, request: &ReviewRequest) -> Result<ReviewDecision, PipelineError>;
}

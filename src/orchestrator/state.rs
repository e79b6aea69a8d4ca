use std::fmt;
use tracing::{debug, warn};

use crate::chapter::ChapterId;

/// Where a generation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Generating(ChapterId),
    AwaitingReview(ChapterId),
    Assembling,
    Done,
    Aborted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Aborted | PipelineState::Failed
        )
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition(self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Aborted) | (_, Failed) => true,
            (Idle, Loading) => true,
            (Loading, Generating(_)) | (Loading, Assembling) => true,
            (Generating(c), AwaitingReview(r)) => c == r,
            (Generating(_), Generating(_)) => true,
            (AwaitingReview(_), Generating(_)) => true,
            (Generating(_), Assembling) | (AwaitingReview(_), Assembling) => true,
            (Assembling, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Loading => write!(f, "loading"),
            PipelineState::Generating(c) => write!(f, "generating({})", c),
            PipelineState::AwaitingReview(c) => write!(f, "awaiting-review({})", c),
            PipelineState::Assembling => write!(f, "assembling"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Aborted => write!(f, "aborted"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Current state plus every state visited, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Move to `next`. Out-of-order transitions are logged and still applied
    /// so the recorded history reflects what actually happened.
    pub fn transition(&mut self, next: PipelineState) {
        if !self.current.can_transition(next) {
            warn!(from = %self.current, to = %next, "unexpected state transition");
        }
        debug!(from = %self.current, to = %next, "state transition");
        self.current = next;
        self.history.push(next);
    }
}

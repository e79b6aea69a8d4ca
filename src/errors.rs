//! Typed error hierarchy for the awp controller.
//!
//! Two top-level enums cover the two subsystems:
//! - `PipelineError` — generation orchestration, worker and checkpoint failures
//! - `ExportError` — per-format failures inside the export chain

use std::path::PathBuf;
use thiserror::Error;

use crate::export::ExportFormat;

/// Errors from the generation pipeline.
///
/// Fatal variants (`ConfigMissing`, `WorkerSpawnFailure`, `CheckpointLoad`,
/// `CheckpointMismatch`) are raised before any worker is started. The rest
/// move a running pipeline to `Failed` with the checkpoint left as last saved.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Required input missing: {0}")]
    ConfigMissing(String),

    #[error("Failed to spawn generation worker '{command}': {source}")]
    WorkerSpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Generation worker failed (exit {}): {diagnostics}",
        exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
    )]
    WorkerFailure {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Worker protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Failed to persist checkpoint at {path}: {message}")]
    PersistenceFailure { path: PathBuf, message: String },

    #[error("Failed to load checkpoint at {path}: {message}")]
    CheckpointLoad { path: PathBuf, message: String },

    #[error(
        "Stored checkpoint covers chapters [{stored}] but this run selects [{requested}]; run without --resume or reset first"
    )]
    CheckpointMismatch { stored: String, requested: String },

    #[error("Review prompt failed: {0}")]
    Review(String),

    /// Ctrl-C reached an open review prompt. The orchestrator turns this into
    /// an interrupted run, not a failure.
    #[error("Review prompt interrupted")]
    ReviewInterrupted,
}

impl PipelineError {
    /// Whether this error is raised before the worker is started.
    pub fn is_pre_spawn(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfigMissing(_)
                | PipelineError::WorkerSpawnFailure { .. }
                | PipelineError::CheckpointLoad { .. }
                | PipelineError::CheckpointMismatch { .. }
        )
    }
}

/// Errors from a single export target.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{format} requires {dependency}, which was not produced")]
    MissingDependency {
        format: ExportFormat,
        dependency: ExportFormat,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer '{0}' not found on PATH")]
    RendererNotFound(String),

    #[error("Renderer failed: {0}")]
    RendererFailed(String),
}

//! End-to-end chapter sequencing.
//!
//! [`PipelineConfig`] is built once per run from `awp.toml` and the command
//! line, failing fast on missing inputs. [`Orchestrator`] then drives the
//! worker through the selected chapters, pausing at review checkpoints, and
//! hands the approved chapters to the export chain.

mod runner;
mod state;

pub use runner::{Orchestrator, RunOutcome, RunSummary, assemble_document};
pub use state::{PipelineState, StateMachine};

use std::path::PathBuf;
use std::time::Duration;

use crate::awp_config::LiteratureProvider;
use crate::chapter::{Chapter, ChapterId, ChapterSelector};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::export::ExportFormat;
use crate::worker::{InteractionMode, WorkerInvocation};

/// Command-line switches for a generation run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub resume: bool,
    pub review: bool,
    pub dry_run: bool,
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chapters: Vec<Chapter>,
    pub review_checkpoints: Vec<ChapterId>,
    pub review_enabled: bool,
    pub literature: LiteratureProvider,
    pub formats: Vec<ExportFormat>,
    pub resume: bool,
    pub dry_run: bool,
    pub worker_command: String,
    pub worker_args: Vec<String>,
    pub idle_timeout: Option<Duration>,
    pub decision_retries: u32,
}

impl PipelineConfig {
    /// Resolve the chapter selection and check that everything the worker
    /// needs is in place. Dry runs skip the input checks since no worker
    /// is started.
    pub fn build(
        config: &Config,
        selector: &ChapterSelector,
        options: &RunOptions,
    ) -> Result<Self, PipelineError> {
        let toml = &config.toml;
        let chapters = selector.resolve(&toml.paper.chapters);
        if chapters.is_empty() {
            return Err(PipelineError::ConfigMissing(
                "no chapters selected".to_string(),
            ));
        }

        let pipeline = Self {
            chapters,
            review_checkpoints: toml.paper.review_after.clone(),
            review_enabled: options.review,
            literature: toml.literature.provider,
            formats: toml.output.formats.clone(),
            resume: options.resume,
            dry_run: options.dry_run,
            worker_command: toml.worker_cmd(),
            worker_args: toml.worker.args.clone(),
            idle_timeout: toml.worker.idle_timeout_secs.map(Duration::from_secs),
            decision_retries: toml.worker.decision_retries,
        };

        if !options.dry_run {
            check_inputs(config)?;
        }
        Ok(pipeline)
    }

    /// Whether the run pauses for a decision after generating `chapter`.
    pub fn is_checkpoint(&self, chapter: ChapterId) -> bool {
        self.review_enabled && !self.dry_run && self.review_checkpoints.contains(&chapter)
    }

    pub fn interaction(&self) -> InteractionMode {
        if self.review_enabled {
            InteractionMode::Line
        } else {
            InteractionMode::PassThrough
        }
    }

    pub fn invocation(&self, cwd: PathBuf, envs: Vec<(String, String)>) -> WorkerInvocation {
        WorkerInvocation {
            command: self.worker_command.clone(),
            args: self.worker_args.clone(),
            chapters: self.chapters.clone(),
            interaction: self.interaction(),
            literature: self.literature,
            resume: self.resume,
            cwd,
            envs,
        }
    }
}

/// Inputs that must exist before a worker is started.
fn check_inputs(config: &Config) -> Result<(), PipelineError> {
    if !config.is_initialized() {
        return Err(PipelineError::ConfigMissing(format!(
            "{} not found in {}",
            crate::awp_config::CONFIG_FILE,
            config.project_dir.display()
        )));
    }

    let toml = &config.toml;
    if toml.repository.url.trim().is_empty() {
        return Err(PipelineError::ConfigMissing(
            "repository.url is not set".to_string(),
        ));
    }

    for var in &toml.worker.required_env {
        if std::env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
            return Err(PipelineError::ConfigMissing(format!(
                "environment variable {} is not set",
                var
            )));
        }
    }

    if toml.literature.provider == LiteratureProvider::Manual && !config.has_manual_literature() {
        return Err(PipelineError::ConfigMissing(format!(
            "manual literature provider selected but {} holds no .md files",
            config.literature_dir.display()
        )));
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::PipelineConfig;
use super::state::{PipelineState, StateMachine};
use crate::awp_config::PaperSection;
use crate::chapter::{Chapter, ChapterId};
use crate::checkpoint::{ChapterStatus, Checkpoint, CheckpointStore, DraftStore};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::export::{Document, ExportFormat, ExportPipeline, ExportReport};
use crate::review::{ReviewDecision, ReviewGate, ReviewRequest};
use crate::ui::GenerationUI;
use crate::worker::{WorkerCommand, WorkerEvent, WorkerLink, WorkerSpawner};

const DECISION_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a run that didn't fail ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The operator chose `abort` while reviewing `chapter`
    Aborted { chapter: ChapterId },
    /// Ctrl-C while `chapter` was in flight
    Interrupted { chapter: ChapterId },
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub approved: Vec<ChapterId>,
    pub skipped: Vec<ChapterId>,
    /// False when a resumed run found nothing left to generate
    pub worker_started: bool,
    pub export: ExportReport,
    /// Checkpoint saves that failed and were retried later
    pub persistence_retries: u32,
}

/// How a single chapter attempt ended on the worker side.
enum Generated {
    Completed(String),
    AwaitingReview(String),
}

enum Next {
    Event(Option<WorkerEvent>),
    Interrupted,
    Stalled,
}

/// Stops a chapter loop early.
enum Halt {
    Aborted(ChapterId),
    Interrupted(ChapterId),
    Failed(PipelineError),
}

impl From<PipelineError> for Halt {
    fn from(err: PipelineError) -> Self {
        Halt::Failed(err)
    }
}

/// Drives one generation run.
///
/// Single logical thread of control: exactly one chapter is requested at a
/// time, and the review gate blocks until the operator has decided.
pub struct Orchestrator {
    pipeline: PipelineConfig,
    store: CheckpointStore,
    drafts: DraftStore,
    exporter: ExportPipeline,
    paper: PaperSection,
    project_dir: PathBuf,
    literature_dir: PathBuf,
    ui: Option<Arc<GenerationUI>>,
    interrupt: Arc<Notify>,
    state: StateMachine,
    dirty: bool,
    persistence_retries: u32,
}

impl Orchestrator {
    pub fn new(config: &Config, pipeline: PipelineConfig) -> Self {
        let exporter = ExportPipeline::new(
            config.output_dir.clone(),
            &config.toml.output.latex_compiler,
        );
        Self {
            pipeline,
            store: CheckpointStore::new(config.checkpoint_file.clone()),
            drafts: DraftStore::new(config.chapters_dir.clone()),
            exporter,
            paper: config.toml.paper.clone(),
            project_dir: config.project_dir.clone(),
            literature_dir: config.literature_dir.clone(),
            ui: None,
            interrupt: Arc::new(Notify::new()),
            state: StateMachine::new(),
            dirty: false,
            persistence_retries: 0,
        }
    }

    pub fn with_ui(mut self, ui: Arc<GenerationUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Handle used to request an orderly shutdown, e.g. from a Ctrl-C handler.
    pub fn interrupt_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.interrupt)
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn history(&self) -> &[PipelineState] {
        self.state.history()
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// The chapters a run would generate, in order. Touches neither the
    /// worker nor the checkpoint.
    pub fn plan(&self) -> &[Chapter] {
        &self.pipeline.chapters
    }

    /// Run the pipeline to a terminal state.
    ///
    /// `gate` is consulted for checkpointed chapters; without one, drafts are
    /// approved as they complete.
    pub async fn run(
        &mut self,
        spawner: &dyn WorkerSpawner,
        mut gate: Option<&mut dyn ReviewGate>,
    ) -> Result<RunOutcome, PipelineError> {
        self.state.transition(PipelineState::Loading);
        let mut checkpoint = match self
            .store
            .load_for_run(&self.pipeline.chapters, self.pipeline.resume)
        {
            Ok(cp) => cp,
            Err(e) => return Err(self.fail(e)),
        };

        if !self.pipeline.resume
            && let Err(e) = self.drafts.clear()
        {
            return Err(self.fail(PipelineError::PersistenceFailure {
                path: self.drafts.dir().to_path_buf(),
                message: e.to_string(),
            }));
        }

        let pending = checkpoint.unresolved();
        info!(
            chapters = self.pipeline.chapters.len(),
            pending = pending.len(),
            resume = self.pipeline.resume,
            "starting generation run"
        );

        let mut summary = RunSummary::default();

        if !pending.is_empty() {
            self.persist(&checkpoint);

            let envs = vec![
                (
                    "AWP_PROJECT_DIR".to_string(),
                    self.project_dir.display().to_string(),
                ),
                (
                    "AWP_LITERATURE_DIR".to_string(),
                    self.literature_dir.display().to_string(),
                ),
            ];
            let invocation = self.pipeline.invocation(self.project_dir.clone(), envs);
            let mut link = match spawner.spawn(&invocation).await {
                Ok(link) => link,
                Err(e) => return Err(self.fail(e)),
            };
            summary.worker_started = true;

            for chapter in pending {
                let result = self
                    .resolve_chapter(chapter, link.as_mut(), &mut checkpoint, &mut gate)
                    .await;
                match result {
                    Ok(()) => {}
                    Err(Halt::Aborted(c)) => {
                        self.shutdown(link.as_mut(), &checkpoint).await;
                        self.state.transition(PipelineState::Aborted);
                        if let Some(ui) = &self.ui {
                            ui.aborted(&Chapter::from_id(c));
                        }
                        info!(chapter = c, "generation aborted by operator");
                        return Ok(RunOutcome::Aborted { chapter: c });
                    }
                    Err(Halt::Interrupted(c)) => {
                        self.shutdown(link.as_mut(), &checkpoint).await;
                        self.state.transition(PipelineState::Aborted);
                        if let Some(ui) = &self.ui {
                            ui.aborted(&Chapter::from_id(c));
                        }
                        info!(chapter = c, "generation interrupted");
                        return Ok(RunOutcome::Interrupted { chapter: c });
                    }
                    Err(Halt::Failed(e)) => {
                        if let Err(kill_err) = link.kill().await {
                            warn!("failed to stop worker: {}", kill_err);
                        }
                        self.persist(&checkpoint);
                        return Err(self.fail(e));
                    }
                }
            }

            if let Err(e) = link.finish().await {
                self.persist(&checkpoint);
                return Err(self.fail(e));
            }
        } else {
            info!("all chapters already resolved, worker not started");
        }

        self.state.transition(PipelineState::Assembling);
        if let Some(ui) = &self.ui {
            ui.assembling();
        }

        // Any save that failed mid-run gets one last try
        if self.dirty {
            self.store.save(&checkpoint).map_err(|e| self.fail(e))?;
            self.dirty = false;
        }

        let document = match assemble_document(
            &self.pipeline.chapters,
            &checkpoint,
            &self.drafts,
            &self.paper,
        ) {
            Ok(doc) => doc,
            Err(e) => return Err(self.fail(e)),
        };

        let mut targets = self.pipeline.formats.clone();
        if !targets.contains(&ExportFormat::Markdown) {
            targets.insert(0, ExportFormat::Markdown);
        }
        summary.export = self.exporter.export(&document, &targets);

        summary.approved = checkpoint.approved();
        summary.skipped = checkpoint
            .entries
            .iter()
            .filter(|e| e.status == ChapterStatus::Skipped)
            .map(|e| e.chapter)
            .collect();
        summary.persistence_retries = self.persistence_retries;

        self.state.transition(PipelineState::Done);
        if let Some(ui) = &self.ui
            && let Some(md) = summary.export.artifact(ExportFormat::Markdown)
        {
            ui.finish(&md.path);
        }
        info!(
            approved = summary.approved.len(),
            skipped = summary.skipped.len(),
            "generation run complete"
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Generate `chapter` until it is approved or skipped.
    async fn resolve_chapter(
        &mut self,
        chapter: ChapterId,
        link: &mut dyn WorkerLink,
        checkpoint: &mut Checkpoint,
        gate: &mut Option<&mut dyn ReviewGate>,
    ) -> Result<(), Halt> {
        let meta = self.chapter_info(chapter);
        let mut attempt = 0;

        loop {
            attempt += 1;
            checkpoint.set_status(chapter, ChapterStatus::Generating);
            checkpoint.record_attempt(chapter);
            self.persist(checkpoint);
            self.state.transition(PipelineState::Generating(chapter));
            if let Some(ui) = &self.ui {
                ui.start_chapter(&meta, attempt);
            }
            info!(chapter, attempt, "generating chapter");

            // Output after the previous decision belongs to no chapter
            let stray = link.discard_pending();
            if stray > 0 {
                warn!(chapter, stray, "discarding worker output received after the last decision");
            }
            if let Err(e) = link.send(WorkerCommand::Generate(chapter)).await {
                return Err(Halt::Failed(exit_error(link, e).await));
            }

            let draft = match self.collect_draft(chapter, link).await? {
                Generated::Completed(draft) => draft,
                Generated::AwaitingReview(draft)
                    if !self.pipeline.is_checkpoint(chapter) || gate.is_none() =>
                {
                    debug!(chapter, "review marker outside a checkpoint, approving");
                    self.send_decision(link, ReviewDecision::Approve).await?;
                    draft
                }
                Generated::AwaitingReview(draft) => {
                    self.state.transition(PipelineState::AwaitingReview(chapter));
                    if let Some(ui) = &self.ui {
                        ui.awaiting_review(&meta);
                    }
                    let request = ReviewRequest {
                        chapter: meta.clone(),
                        rendered_preview: draft.clone(),
                        attempt,
                    };
                    let decision = match gate.as_mut().map(|g| g.request(&request)) {
                        Some(Ok(decision)) => decision,
                        Some(Err(PipelineError::ReviewInterrupted)) => {
                            return Err(Halt::Interrupted(chapter));
                        }
                        Some(Err(e)) => return Err(Halt::Failed(e)),
                        None => ReviewDecision::Approve,
                    };
                    info!(chapter, decision = %decision, "review decision");

                    match decision {
                        ReviewDecision::Approve => {
                            self.send_decision(link, decision).await?;
                            draft
                        }
                        ReviewDecision::Regenerate => {
                            self.send_decision(link, decision).await?;
                            if let Some(ui) = &self.ui {
                                ui.chapter_regenerating(&meta);
                            }
                            continue;
                        }
                        ReviewDecision::Skip => {
                            self.send_decision(link, decision).await?;
                            self.skip(chapter, checkpoint);
                            if let Some(ui) = &self.ui {
                                ui.chapter_skipped(&meta);
                            }
                            return Ok(());
                        }
                        ReviewDecision::Abort => {
                            // Best effort; the worker is killed either way
                            if let Err(e) = link.send(WorkerCommand::Decision(decision)).await {
                                debug!("abort token not delivered: {}", e);
                            }
                            return Err(Halt::Aborted(chapter));
                        }
                    }
                }
            };

            self.approve(chapter, &draft, checkpoint)?;
            if let Some(ui) = &self.ui {
                ui.chapter_approved(&meta);
            }
            return Ok(());
        }
    }

    /// Read worker output for `chapter` until its draft is complete.
    async fn collect_draft(
        &self,
        chapter: ChapterId,
        link: &mut dyn WorkerLink,
    ) -> Result<Generated, Halt> {
        let mut draft = String::new();
        loop {
            match self.next_event(link).await {
                Next::Event(Some(WorkerEvent::Content(line))) => {
                    if let Some(ui) = &self.ui {
                        ui.content_line(&line);
                    }
                    draft.push_str(&line);
                    draft.push('\n');
                }
                Next::Event(Some(WorkerEvent::ChapterDone)) => {
                    return Ok(Generated::Completed(draft));
                }
                Next::Event(Some(WorkerEvent::ReviewSignal)) => {
                    return Ok(Generated::AwaitingReview(draft));
                }
                Next::Event(None) => {
                    let closed = PipelineError::WorkerFailure {
                        exit_code: Some(0),
                        diagnostics: format!(
                            "worker exited before chapter {} completed\n{}",
                            chapter,
                            link.diagnostics()
                        )
                        .trim_end()
                        .to_string(),
                    };
                    return Err(Halt::Failed(exit_error(link, closed).await));
                }
                Next::Interrupted => return Err(Halt::Interrupted(chapter)),
                Next::Stalled => {
                    let secs = self.pipeline.idle_timeout.map(|d| d.as_secs()).unwrap_or(0);
                    return Err(Halt::Failed(PipelineError::WorkerFailure {
                        exit_code: None,
                        diagnostics: format!(
                            "worker stalled: no output for {}s while generating chapter {}\n{}",
                            secs,
                            chapter,
                            link.diagnostics()
                        )
                        .trim_end()
                        .to_string(),
                    }));
                }
            }
        }
    }

    async fn next_event(&self, link: &mut dyn WorkerLink) -> Next {
        let interrupt = Arc::clone(&self.interrupt);
        let idle_timeout = self.pipeline.idle_timeout;
        tokio::select! {
            biased;
            _ = interrupt.notified() => Next::Interrupted,
            next = async {
                match idle_timeout {
                    Some(limit) => match tokio::time::timeout(limit, link.next_event()).await {
                        Ok(event) => Next::Event(event),
                        Err(_) => Next::Stalled,
                    },
                    None => Next::Event(link.next_event().await),
                }
            } => next,
        }
    }

    /// Deliver a decision token, retrying failed writes.
    async fn send_decision(
        &self,
        link: &mut dyn WorkerLink,
        decision: ReviewDecision,
    ) -> Result<(), PipelineError> {
        let retries = self.pipeline.decision_retries;
        let mut last_error = None;
        for attempt in 0..=retries {
            match link.send(WorkerCommand::Decision(decision)).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        "failed to deliver decision '{}': {}", decision, e
                    );
                    last_error = Some(e);
                    if attempt < retries {
                        tokio::time::sleep(DECISION_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(PipelineError::ProtocolViolation(format!(
            "decision '{}' could not be delivered after {} attempts: {}",
            decision,
            retries + 1,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn approve(
        &mut self,
        chapter: ChapterId,
        draft: &str,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), PipelineError> {
        // The draft must be on disk before the checkpoint says approved
        self.drafts
            .save(chapter, draft)
            .map_err(|e| PipelineError::PersistenceFailure {
                path: self.drafts.path_for(chapter),
                message: format!("{:#}", e),
            })?;
        checkpoint.set_status(chapter, ChapterStatus::Approved);
        self.persist(checkpoint);
        info!(chapter, "chapter approved");
        Ok(())
    }

    fn skip(&mut self, chapter: ChapterId, checkpoint: &mut Checkpoint) {
        if let Err(e) = self.drafts.remove(chapter) {
            warn!(chapter, "failed to remove skipped draft: {:#}", e);
        }
        checkpoint.set_status(chapter, ChapterStatus::Skipped);
        self.persist(checkpoint);
        info!(chapter, "chapter skipped");
    }

    /// Save the checkpoint. A failed save is logged and retried on the next
    /// transition; it never rolls back in-memory status.
    fn persist(&mut self, checkpoint: &Checkpoint) {
        match self.store.save(checkpoint) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                warn!("{}", e);
                self.dirty = true;
                self.persistence_retries += 1;
            }
        }
    }

    /// Ordered shutdown for abort and interrupt: stop the worker, then save.
    async fn shutdown(&mut self, link: &mut dyn WorkerLink, checkpoint: &Checkpoint) {
        if let Err(e) = link.kill().await {
            warn!("failed to stop worker: {}", e);
        }
        self.persist(checkpoint);
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!("generation failed: {}", err);
        self.state.transition(PipelineState::Failed);
        if let Some(ui) = &self.ui {
            ui.failed(&err.to_string());
        }
        err
    }

    fn chapter_info(&self, chapter: ChapterId) -> Chapter {
        self.pipeline
            .chapters
            .iter()
            .find(|c| c.id == chapter)
            .cloned()
            .unwrap_or_else(|| Chapter::from_id(chapter))
    }
}

/// The worker's exit status explains a broken stream better than the
/// stream error itself; fall back to `fallback` when it exited cleanly.
async fn exit_error(link: &mut dyn WorkerLink, fallback: PipelineError) -> PipelineError {
    match link.finish().await {
        Err(exit) => exit,
        Ok(()) => fallback,
    }
}

/// Build the document from approved drafts, in stage order.
///
/// Skipped and unresolved chapters contribute nothing.
pub fn assemble_document(
    chapters: &[Chapter],
    checkpoint: &Checkpoint,
    drafts: &DraftStore,
    paper: &PaperSection,
) -> Result<Document, PipelineError> {
    let mut document = Document::new(&paper.title, paper.authors.clone(), &paper.template);
    for chapter in chapters {
        if checkpoint.status(chapter.id) != Some(ChapterStatus::Approved) {
            continue;
        }
        let draft = drafts
            .load(chapter.id)
            .map_err(|e| PipelineError::PersistenceFailure {
                path: drafts.path_for(chapter.id),
                message: format!("{:#}", e),
            })?;
        match draft {
            Some(body) => document.push(chapter.clone(), body),
            None => warn!(chapter = chapter.id, "approved chapter has no stored draft"),
        }
    }
    Ok(document)
}

//! Document export: `awp export`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use awp::chapter::Chapter;
use awp::checkpoint::{CheckpointStore, DraftStore};
use awp::config::Config;
use awp::errors::PipelineError;
use awp::export::{ExportFormat, ExportPipeline, ExportReport};
use awp::orchestrator::assemble_document;
use awp::ui::icons::{CHECK, CROSS};

/// Re-export the approved chapters of the last run as `format`.
///
/// Reads the checkpoint and stored drafts rather than a previously written
/// document, so the export matches what was approved even if `output/` was
/// edited or removed.
pub fn cmd_export(config: &Config, format: &str, output: Option<PathBuf>) -> Result<()> {
    let format: ExportFormat = format.parse()?;

    let store = CheckpointStore::new(config.checkpoint_file.clone());
    let Some(checkpoint) = store.load()? else {
        return Err(PipelineError::ConfigMissing(
            "no checkpoint found; run 'awp generate' first".to_string(),
        )
        .into());
    };

    let chapters: Vec<Chapter> = checkpoint
        .chapter_ids()
        .into_iter()
        .map(Chapter::from_id)
        .collect();
    let drafts = DraftStore::new(config.chapters_dir.clone());
    let document = assemble_document(&chapters, &checkpoint, &drafts, &config.toml.paper)?;
    if document.is_empty() {
        return Err(PipelineError::ConfigMissing(
            "no approved chapters to export".to_string(),
        )
        .into());
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let mut pipeline =
        ExportPipeline::new(config.output_dir.clone(), &config.toml.output.latex_compiler);
    if let Some(path) = output {
        let path = std::path::absolute(&path)
            .with_context(|| format!("Invalid output path: {}", path.display()))?;
        pipeline = pipeline.with_output_path(format, path);
    }

    let report = pipeline.export(&document, &[format]);
    print_export_report(&report);
    if !report.is_success() {
        bail!("Export to {} failed", format);
    }
    Ok(())
}

/// Print produced artifacts and failures, with the fallback for each failure.
pub fn print_export_report(report: &ExportReport) {
    for artifact in &report.artifacts {
        println!(
            "{}{:<9} {}",
            CHECK,
            artifact.format,
            style(artifact.path.display()).bold()
        );
    }
    for failure in &report.failures {
        println!(
            "{}{:<9} {}",
            CROSS,
            failure.format,
            style(&failure.error).red()
        );
        if let Some(fallback) = failure.fallback
            && let Some(artifact) = report.artifact(fallback)
        {
            println!(
                "   falling back to {} at {}",
                fallback,
                artifact.path.display()
            );
        }
    }
}

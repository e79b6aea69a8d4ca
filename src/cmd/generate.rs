//! Chapter generation: `awp generate`.

use anyhow::{Result, bail};
use std::sync::Arc;

use awp::chapter::ChapterSelector;
use awp::checkpoint::CheckpointStore;
use awp::config::Config;
use awp::orchestrator::{Orchestrator, PipelineConfig, RunOptions, RunOutcome};
use awp::review::{ReviewGate, TerminalReviewGate};
use awp::ui::GenerationUI;
use awp::worker::ProcessSpawner;

use super::export::print_export_report;

pub async fn cmd_generate(config: &Config, chapters: &str, options: RunOptions) -> Result<()> {
    for warning in config.toml.validate() {
        eprintln!("{} {}", console::style("warning:").yellow(), warning);
    }

    let selector: ChapterSelector = chapters.parse()?;
    let pipeline = PipelineConfig::build(config, &selector, &options)?;

    let mut orchestrator = Orchestrator::new(config, pipeline);

    if options.dry_run {
        println!();
        println!("Dry run: the worker would generate");
        for chapter in orchestrator.plan() {
            let review = if orchestrator.pipeline().review_checkpoints.contains(&chapter.id) {
                console::style(" (review)").dim().to_string()
            } else {
                String::new()
            };
            println!("  {}{}", chapter, review);
        }
        println!();
        return Ok(());
    }

    config.ensure_directories()?;

    // Resumed runs start the bar at what the checkpoint already resolved
    let resolved = if options.resume {
        CheckpointStore::new(config.checkpoint_file.clone())
            .load()
            .ok()
            .flatten()
            .map(|cp| cp.entries.iter().filter(|e| e.status.is_resolved()).count())
            .unwrap_or(0)
    } else {
        0
    };

    let ui = Arc::new(GenerationUI::new(
        orchestrator.plan().len() as u64,
        resolved as u64,
        config.verbose,
    ));
    orchestrator = orchestrator.with_ui(Arc::clone(&ui));

    let interrupt = orchestrator.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.notify_one();
        }
    });

    let mut terminal_gate = TerminalReviewGate::new(Some(Arc::clone(&ui)));
    let gate: Option<&mut dyn ReviewGate> = if options.review {
        Some(&mut terminal_gate)
    } else {
        None
    };

    let outcome = orchestrator.run(&ProcessSpawner, gate).await;
    ctrl_c.abort();

    match outcome? {
        RunOutcome::Completed(summary) => {
            println!();
            println!(
                "Approved: {}  Skipped: {}",
                summary.approved.len(),
                summary.skipped.len()
            );
            if !summary.worker_started {
                println!("All chapters were already resolved; the worker was not started.");
            }
            if summary.persistence_retries > 0 {
                println!(
                    "{} checkpoint save(s) failed and were retried",
                    summary.persistence_retries
                );
            }
            print_export_report(&summary.export);
            if !summary.export.is_success() {
                bail!("Export failed for {} format(s)", summary.export.failures.len());
            }
        }
        RunOutcome::Aborted { chapter } => {
            println!();
            println!("Generation aborted at chapter {}.", chapter);
            println!("Run 'awp generate --resume' to continue from there.");
        }
        RunOutcome::Interrupted { chapter } => {
            println!();
            println!("Generation interrupted during chapter {}.", chapter);
            println!("Run 'awp generate --resume' to continue from there.");
        }
    }
    Ok(())
}

//! Project status and reset commands.

use anyhow::Result;
use console::style;

use awp::chapter::Chapter;
use awp::checkpoint::{ChapterStatus, CheckpointStore, DraftStore};
use awp::config::Config;
use awp::export::{DOCUMENT_STEM, ExportFormat};

pub fn cmd_status(config: &Config) -> Result<()> {
    println!();
    println!("AWP Project Status");
    println!("==================");
    println!();

    if !config.is_initialized() {
        println!("Project: Not initialized");
        println!();
        println!(
            "Create {} in {} to configure the paper.",
            awp::awp_config::CONFIG_FILE,
            config.project_dir.display()
        );
        println!();
        return Ok(());
    }

    let toml = &config.toml;
    println!("Project: {}", config.project_dir.display());
    println!("Paper:   {}", toml.paper.title);
    println!("Worker:  {}", toml.worker_cmd());
    println!("Formats: {}", join_formats(&toml.output.formats));

    let warnings = toml.validate();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("{} {}", style("warning:").yellow(), warning);
        }
    }

    println!();
    let store = CheckpointStore::new(config.checkpoint_file.clone());
    match store.load()? {
        Some(checkpoint) => {
            let drafts = DraftStore::new(config.chapters_dir.clone());
            println!("{:<8} {:<20} {:<11} {:<9} Draft", "Chapter", "Name", "Status", "Attempts");
            println!("{:<8} {:<20} {:<11} {:<9} -----", "-------", "----", "------", "--------");
            for entry in &checkpoint.entries {
                let chapter = Chapter::from_id(entry.chapter);
                let status = format!("{:<11}", entry.status.as_str());
                let status = match entry.status {
                    ChapterStatus::Approved => style(status).green(),
                    ChapterStatus::Skipped => style(status).dim(),
                    ChapterStatus::Generating => style(status).yellow(),
                    ChapterStatus::Pending => style(status),
                };
                let draft = if drafts.path_for(entry.chapter).exists() {
                    "yes"
                } else {
                    "-"
                };
                println!(
                    "{:<8} {:<20} {} {:<9} {}",
                    chapter.id, chapter.name, status, entry.attempts, draft
                );
            }
            if let Some(updated) = checkpoint.updated_at {
                println!();
                println!("Last saved: {}", updated.format("%Y-%m-%d %H:%M:%S"));
            }
            if !checkpoint.is_complete() {
                println!();
                println!("Run 'awp generate --resume' to continue.");
            }
        }
        None => {
            println!("Generation: Not started");
            println!();
            println!("Run 'awp generate' to start.");
        }
    }

    let produced: Vec<_> = ExportFormat::ALL
        .iter()
        .map(|f| config.output_dir.join(format!("{}.{}", DOCUMENT_STEM, f.extension())))
        .filter(|p| p.exists())
        .collect();
    if !produced.is_empty() {
        println!();
        println!("Output:");
        for path in produced {
            println!("  {}", path.display());
        }
    }
    println!();
    Ok(())
}

pub fn cmd_reset(config: &Config, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard the checkpoint and all chapter drafts. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    CheckpointStore::new(config.checkpoint_file.clone()).reset()?;
    DraftStore::new(config.chapters_dir.clone()).clear()?;

    println!("Reset complete");
    Ok(())
}

fn join_formats(formats: &[ExportFormat]) -> String {
    formats
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

//! Scripted generation worker used by the integration tests and for trying
//! awp without a real worker.
//!
//! Reads `generate <id>` lines from stdin and answers with a short draft.
//! Behaviour is steered by environment variables:
//! - `AWP_STUB_REVIEW`: comma-separated chapters that end with the review marker
//! - `AWP_STUB_FAIL_ON`: chapter on which the stub exits with status 3

use anyhow::Result;
use std::io::{BufRead, Write};

use awp::chapter::{ChapterId, chapter_name};
use awp::worker::{DONE_MARKER, REVIEW_MARKER};

fn chapter_list(var: &str) -> Vec<ChapterId> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

fn main() -> Result<()> {
    let review = chapter_list("AWP_STUB_REVIEW");
    let fail_on: Option<ChapterId> = std::env::var("AWP_STUB_FAIL_ON")
        .ok()
        .and_then(|v| v.trim().parse().ok());

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let Some(id) = line.trim().strip_prefix("generate ") else {
            // Decision tokens need no reply
            continue;
        };
        let id: ChapterId = id.trim().parse()?;

        if fail_on == Some(id) {
            eprintln!("stub worker: refusing chapter {}", id);
            std::process::exit(3);
        }

        writeln!(stdout, "### {}", chapter_name(id))?;
        writeln!(stdout)?;
        writeln!(stdout, "Draft text for chapter {} written by the **stub** worker.", id)?;
        if review.contains(&id) {
            writeln!(stdout, "{}", REVIEW_MARKER)?;
        } else {
            writeln!(stdout, "{}", DONE_MARKER)?;
        }
        stdout.flush()?;
    }
    Ok(())
}

use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use std::io;
use std::sync::Arc;

use super::{ReviewDecision, ReviewGate, ReviewRequest};
use crate::errors::PipelineError;
use crate::ui::GenerationUI;
use crate::ui::icons::REVIEW;

/// Lines of the draft shown above the prompt.
const PREVIEW_LINES: usize = 40;

/// Prompts the operator on the terminal.
pub struct TerminalReviewGate {
    ui: Option<Arc<GenerationUI>>,
    preview_lines: usize,
}

impl TerminalReviewGate {
    pub fn new(ui: Option<Arc<GenerationUI>>) -> Self {
        Self {
            ui,
            preview_lines: PREVIEW_LINES,
        }
    }

    fn print_preview(&self, request: &ReviewRequest) {
        println!();
        println!(
            "{}{} {}",
            REVIEW,
            style(format!("Review {}", request.chapter)).bold(),
            style(format!(
                "(draft {}, {} words)",
                request.attempt,
                request.word_count()
            ))
            .dim()
        );
        println!("{}", style("─".repeat(60)).dim());
        print!("{}", preview_excerpt(&request.rendered_preview, self.preview_lines));
        println!("{}", style("─".repeat(60)).dim());
    }

    fn prompt(&self, request: &ReviewRequest) -> Result<ReviewDecision, PipelineError> {
        self.print_preview(request);

        let options = &[
            "Approve this chapter",
            "Regenerate this chapter",
            "Skip this chapter",
            "Abort generation",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Decision for {}", request.chapter.name))
            .items(options)
            .default(0)
            .interact()
            .map_err(prompt_error)?;

        ReviewDecision::ALL
            .get(selection)
            .copied()
            .ok_or_else(|| PipelineError::Review(format!("invalid selection {}", selection)))
    }
}

impl ReviewGate for TerminalReviewGate {
    fn request(&mut self, request: &ReviewRequest) -> Result<ReviewDecision, PipelineError> {
        match &self.ui {
            Some(ui) => ui.suspend(|| self.prompt(request)),
            None => self.prompt(request),
        }
    }
}

/// Ctrl-C in raw mode arrives as an `Interrupted` read, not as SIGINT.
fn prompt_error(err: dialoguer::Error) -> PipelineError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => {
            PipelineError::ReviewInterrupted
        }
        dialoguer::Error::IO(e) => PipelineError::Review(e.to_string()),
    }
}

/// First `max_lines` lines of a draft, with a note about what was cut.
fn preview_excerpt(draft: &str, max_lines: usize) -> String {
    let total = draft.lines().count();
    let mut out = String::new();
    for line in draft.lines().take(max_lines) {
        out.push_str(line);
        out.push('\n');
    }
    if total > max_lines {
        out.push_str(&format!(
            "{}\n",
            style(format!("... {} more lines", total - max_lines)).dim()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_excerpt_short_draft_unchanged() {
        assert_eq!(preview_excerpt("a\nb", 5), "a\nb\n");
    }

    #[test]
    fn test_preview_excerpt_truncates() {
        let draft = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let out = preview_excerpt(&draft, 3);
        assert!(out.starts_with("1\n2\n3\n"));
        assert!(!out.contains("\n4\n"));
        assert!(out.contains("7 more lines"));
    }

    #[test]
    fn test_ctrl_c_in_prompt_is_an_interrupt() {
        let io_err = io::Error::new(io::ErrorKind::Interrupted, "read interrupted");
        let err = dialoguer::Error::IO(io_err);
        assert!(matches!(prompt_error(err), PipelineError::ReviewInterrupted));
    }

    #[test]
    fn test_other_prompt_errors_fail_the_review() {
        let io_err = io::Error::new(io::ErrorKind::NotConnected, "not a terminal");
        let err = dialoguer::Error::IO(io_err);
        match prompt_error(err) {
            PipelineError::Review(msg) => assert!(msg.contains("not a terminal")),
            other => panic!("unexpected {:?}", other),
        }
    }
}

use crate::chapter::Chapter;
use crate::ui::icons::{CHECK, CROSS, DOCUMENT, PAUSE, REGEN, REVIEW, SKIP, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Terminal UI for a generation run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Chapter bar: how many selected chapters have been resolved
/// - Draft spinner: the chapter in flight with a live word count
///
/// Interactive prompts must run inside [`GenerationUI::suspend`] so the bars
/// don't redraw over them.
pub struct GenerationUI {
    multi: MultiProgress,
    chapter_bar: ProgressBar,
    draft_bar: ProgressBar,
    verbose: bool,
    current_chapter: AtomicU32,
    words: AtomicUsize,
}

impl GenerationUI {
    /// Create the UI sized for `total_chapters`, with `resolved` already done
    /// when resuming.
    pub fn new(total_chapters: u64, resolved: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let chapter_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let chapter_bar = multi.add(ProgressBar::new(total_chapters));
        chapter_bar.set_style(chapter_style);
        chapter_bar.set_prefix("Chapters");
        chapter_bar.set_position(resolved);

        let draft_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let draft_bar = multi.add(ProgressBar::new_spinner());
        draft_bar.set_style(draft_style);
        draft_bar.set_prefix("   Draft");

        Self {
            multi,
            chapter_bar,
            draft_bar,
            verbose,
            current_chapter: AtomicU32::new(0),
            words: AtomicUsize::new(0),
        }
    }

    /// Print a line above the bars, falling back to stderr if the bars can't draw.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Run `f` with the bars hidden, e.g. while a review prompt is shown.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi.suspend(f)
    }

    pub fn start_chapter(&self, chapter: &Chapter, attempt: u32) {
        self.current_chapter.store(chapter.id, Ordering::SeqCst);
        self.words.store(0, Ordering::SeqCst);
        self.chapter_bar
            .set_message(format!("{}: {}", style(chapter.id).yellow(), chapter.name));
        let attempt_note = if attempt > 1 {
            format!(" (attempt {})", attempt)
        } else {
            String::new()
        };
        self.draft_bar.set_message(format!(
            "Generating {}{} {}",
            style(&chapter.name).cyan(),
            attempt_note,
            style("(starting...)").dim()
        ));
        self.draft_bar.enable_steady_tick(Duration::from_millis(100));
    }

    /// Account for one streamed content line.
    pub fn content_line(&self, line: &str) {
        let added = line.split_whitespace().count();
        let total = self.words.fetch_add(added, Ordering::SeqCst) + added;
        self.draft_bar.set_message(format!(
            "Generating chapter {} {}",
            style(self.current_chapter.load(Ordering::SeqCst)).cyan(),
            style(format!("({} words)", total)).dim()
        ));
        if self.verbose && !line.trim().is_empty() {
            self.print_line(format!("    {} {}", style("│").dim(), style(line).dim()));
        }
    }

    pub fn awaiting_review(&self, chapter: &Chapter) {
        self.draft_bar.set_message(format!(
            "{}Waiting for review of {}",
            REVIEW,
            style(&chapter.name).cyan()
        ));
    }

    pub fn chapter_approved(&self, chapter: &Chapter) {
        self.chapter_bar.inc(1);
        self.print_line(format!(
            "  {}{} {}",
            CHECK,
            style(chapter).green(),
            style(format!("({} words)", self.words.load(Ordering::SeqCst))).dim()
        ));
    }

    pub fn chapter_skipped(&self, chapter: &Chapter) {
        self.chapter_bar.inc(1);
        self.print_line(format!("  {}{}", SKIP, style(chapter).dim()));
    }

    pub fn chapter_regenerating(&self, chapter: &Chapter) {
        self.print_line(format!(
            "  {}Regenerating {}",
            REGEN,
            style(&chapter.name).yellow()
        ));
    }

    pub fn assembling(&self) {
        self.draft_bar.set_message("Assembling document...".to_string());
    }

    pub fn finish(&self, document: &Path) {
        self.draft_bar.finish_and_clear();
        self.chapter_bar
            .finish_with_message(format!("{}done", SPARKLE));
        self.print_line(format!(
            "{}Document written to {}",
            DOCUMENT,
            style(document.display()).bold()
        ));
    }

    pub fn aborted(&self, chapter: &Chapter) {
        self.draft_bar.finish_and_clear();
        self.chapter_bar.abandon_with_message(format!(
            "{}aborted at {}",
            PAUSE,
            style(chapter).yellow()
        ));
    }

    pub fn failed(&self, reason: &str) {
        self.draft_bar
            .abandon_with_message(format!("{}{}", CROSS, style(reason).red()));
        self.chapter_bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bars draw to a hidden target when stderr isn't a terminal, so these
    // only check that the bookkeeping holds up.
    #[test]
    fn test_word_count_accumulates_per_chapter() {
        let ui = GenerationUI::new(3, 0, false);
        ui.start_chapter(&Chapter::from_id(1), 1);
        ui.content_line("one two three");
        ui.content_line("four");
        assert_eq!(ui.words.load(Ordering::SeqCst), 4);

        ui.start_chapter(&Chapter::from_id(2), 1);
        assert_eq!(ui.words.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resumed_position() {
        let ui = GenerationUI::new(5, 2, false);
        assert_eq!(ui.chapter_bar.position(), 2);
        ui.chapter_approved(&Chapter::from_id(3));
        ui.chapter_skipped(&Chapter::from_id(4));
        assert_eq!(ui.chapter_bar.position(), 4);
    }

    #[test]
    fn test_suspend_returns_value() {
        let ui = GenerationUI::new(1, 0, false);
        assert_eq!(ui.suspend(|| 42), 42);
    }
}

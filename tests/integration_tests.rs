//! Integration tests for awp
//!
//! These drive the `awp` binary end to end against the scripted
//! `awp-worker-stub` worker.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const STUB: &str = env!("CARGO_BIN_EXE_awp-worker-stub");

const PROJECT_TOML: &str = r#"
[repository]
url = "https://github.com/example/project"

[paper]
title = "Stub Paper"
chapters = [1, 2, 3]
review_after = [2]

[output]
formats = ["markdown"]
latex_compiler = "awp-no-such-latex-compiler"

[worker]
required_env = []

[logging]
level = "warn"
"#;

/// Helper to create an awp Command wired to the stub worker
fn awp(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("awp");
    cmd.current_dir(dir.path())
        .env("AWP_WORKER_CMD", STUB)
        .env_remove("AWP_STUB_REVIEW")
        .env_remove("AWP_STUB_FAIL_ON")
        .env_remove("AWP_LOG");
    cmd
}

fn create_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("awp.toml"), PROJECT_TOML).unwrap();
    dir
}

fn checkpoint(dir: &Path) -> serde_json::Value {
    let content = fs::read_to_string(dir.join(".awp/checkpoint.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn statuses(dir: &Path) -> Vec<(u64, String, u64)> {
    checkpoint(dir)["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["chapter"].as_u64().unwrap(),
                e["status"].as_str().unwrap().to_string(),
                e["attempts"].as_u64().unwrap(),
            )
        })
        .collect()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_awp_help() {
        cargo_bin_cmd!("awp").arg("--help").assert().success();
    }

    #[test]
    fn test_awp_version() {
        cargo_bin_cmd!("awp").arg("--version").assert().success();
    }

    #[test]
    fn test_invalid_chapter_selection_fails() {
        let dir = create_project();
        awp(&dir)
            .args(["generate", "--chapters", "1,x", "--dry-run"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid chapter"));
    }
}

// =============================================================================
// Generation
// =============================================================================

mod generate {
    use super::*;

    #[test]
    fn test_dry_run_lists_plan_without_side_effects() {
        let dir = TempDir::new().unwrap();
        awp(&dir)
            .args(["generate", "--chapters", "3,1", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Chapter 3: Proposed Method"))
            .stdout(predicate::str::contains("Chapter 1: Introduction"));

        assert!(!dir.path().join(".awp/checkpoint.json").exists());
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn test_dry_run_lists_exactly_the_selection_in_order() {
        let dir = TempDir::new().unwrap();
        let output = awp(&dir)
            .args(["generate", "--chapters", "1,2,3", "--dry-run"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let listed: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("Chapter"))
            .collect();
        assert_eq!(
            listed,
            vec![
                "Chapter 1: Introduction",
                "Chapter 2: Existing Methods",
                "Chapter 3: Proposed Method",
            ]
        );
    }

    #[test]
    fn test_full_run_writes_document() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        let document = fs::read_to_string(dir.path().join("output/paper.md")).unwrap();
        assert!(document.starts_with("# Stub Paper"));
        assert!(document.contains("## 1. Introduction"));
        assert!(document.contains("## 3. Proposed Method"));
        assert!(document.contains("written by the **stub** worker"));
        assert!(!document.contains("[DONE]"));

        assert_eq!(
            statuses(dir.path()),
            vec![
                (1, "approved".to_string(), 1),
                (2, "approved".to_string(), 1),
                (3, "approved".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_review_marker_without_review_flag_is_auto_approved() {
        let dir = create_project();
        awp(&dir)
            .arg("generate")
            .env("AWP_STUB_REVIEW", "2")
            .assert()
            .success();

        let document = fs::read_to_string(dir.path().join("output/paper.md")).unwrap();
        assert!(document.contains("## 2. Existing Methods"));
        assert!(!document.contains("[REVIEW]"));
    }

    #[test]
    fn test_worker_failure_exits_nonzero_and_keeps_progress() {
        let dir = create_project();
        awp(&dir)
            .arg("generate")
            .env("AWP_STUB_FAIL_ON", "2")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("refusing chapter 2"));

        let entries = statuses(dir.path());
        assert_eq!(entries[0], (1, "approved".to_string(), 1));
        assert_ne!(entries[1].1, "approved");
        assert_eq!(entries[2], (3, "pending".to_string(), 0));
        assert!(!dir.path().join("output/paper.md").exists());
    }

    #[test]
    fn test_resume_continues_after_failure() {
        let dir = create_project();
        awp(&dir)
            .arg("generate")
            .env("AWP_STUB_FAIL_ON", "3")
            .assert()
            .failure();

        awp(&dir).args(["generate", "--resume"]).assert().success();

        let entries = statuses(dir.path());
        // Chapters finished before the failure are not generated again
        assert_eq!(entries[0], (1, "approved".to_string(), 1));
        assert_eq!(entries[1], (2, "approved".to_string(), 1));
        assert_eq!(entries[2].1, "approved");
        assert!(dir.path().join("output/paper.md").exists());
    }

    #[test]
    fn test_resume_of_finished_run_does_not_start_worker() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();
        let before = fs::read_to_string(dir.path().join("output/paper.md")).unwrap();

        // A worker that would fail proves it is never started
        awp(&dir)
            .args(["generate", "--resume"])
            .env("AWP_STUB_FAIL_ON", "1")
            .assert()
            .success()
            .stdout(predicate::str::contains("worker was not started"));

        let after = fs::read_to_string(dir.path().join("output/paper.md")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_resume_with_different_selection_is_rejected() {
        let dir = create_project();
        awp(&dir)
            .arg("generate")
            .env("AWP_STUB_FAIL_ON", "2")
            .assert()
            .failure();

        awp(&dir)
            .args(["generate", "--resume", "--chapters", "1,2"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Stored checkpoint covers chapters"));
    }

    #[test]
    fn test_missing_worker_binary_fails_before_any_generation() {
        let dir = create_project();
        awp(&dir)
            .arg("generate")
            .env("AWP_WORKER_CMD", "awp-no-such-worker-binary")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Failed to spawn generation worker"));
    }

    #[test]
    fn test_missing_config_fails() {
        let dir = TempDir::new().unwrap();
        awp(&dir)
            .arg("generate")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("awp.toml not found"));
    }
}

// =============================================================================
// Export
// =============================================================================

mod export {
    use super::*;

    #[test]
    fn test_export_without_checkpoint_fails() {
        let dir = create_project();
        awp(&dir)
            .args(["export", "--format", "markdown"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("no checkpoint found"));
    }

    #[test]
    fn test_export_latex_after_run() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        awp(&dir)
            .args(["export", "--format", "latex"])
            .assert()
            .success();

        let tex = fs::read_to_string(dir.path().join("output/paper.tex")).unwrap();
        assert!(tex.contains("\\documentclass"));
        assert!(tex.contains("\\section{Introduction}"));
        assert!(tex.contains("\\textbf{stub}"));
    }

    #[test]
    fn test_export_to_custom_path() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        let target = dir.path().join("custom.md");
        awp(&dir)
            .args(["export", "--format", "md", "--output"])
            .arg(&target)
            .assert()
            .success();

        let content = fs::read_to_string(&target).unwrap();
        assert!(content.starts_with("# Stub Paper"));
    }

    #[test]
    fn test_export_to_relative_path_lands_in_working_directory() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        awp(&dir)
            .args(["export", "--format", "latex", "--output", "final.tex"])
            .assert()
            .success()
            .stdout(predicate::str::contains("final.tex"));

        let tex = fs::read_to_string(dir.path().join("final.tex")).unwrap();
        assert!(tex.contains("\\section{Introduction}"));
        assert!(!dir.path().join("output/paper.tex").exists());
    }

    #[test]
    fn test_pdf_failure_reports_fallback() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        awp(&dir)
            .args(["export", "--format", "pdf"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("falling back to latex"));

        // The upstream artifacts are still produced
        assert!(dir.path().join("output/paper.tex").exists());
        assert!(!dir.path().join("output/paper.pdf").exists());
    }
}

// =============================================================================
// Status and reset
// =============================================================================

mod status {
    use super::*;

    #[test]
    fn test_status_uninitialized() {
        let dir = TempDir::new().unwrap();
        awp(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Not initialized"));
    }

    #[test]
    fn test_status_after_run() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();

        awp(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Stub Paper"))
            .stdout(predicate::str::contains("approved"))
            .stdout(predicate::str::contains("paper.md"));
    }

    #[test]
    fn test_reset_force_clears_progress() {
        let dir = create_project();
        awp(&dir).arg("generate").assert().success();
        assert!(dir.path().join(".awp/checkpoint.json").exists());

        awp(&dir)
            .args(["reset", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset complete"));

        assert!(!dir.path().join(".awp/checkpoint.json").exists());
        assert!(!dir.path().join(".awp/chapters/chapter01.md").exists());
    }
}

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::awp_config::{AwpToml, CONFIG_FILE};

/// The name of the awp working directory inside a project.
pub const AWP_DIR: &str = ".awp";

/// Runtime configuration for awp.
///
/// Bridges the parsed `awp.toml` with the paths the controller reads and
/// writes. Nothing here is validated for a particular command; see
/// `PipelineConfig::build` for the checks `generate` needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub awp_dir: PathBuf,
    pub checkpoint_file: PathBuf,
    pub chapters_dir: PathBuf,
    pub literature_dir: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub toml: AwpToml,
}

impl Config {
    /// Resolve paths and load `awp.toml` (defaults when absent) plus `.env`.
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        // Values already in the environment win over .env
        let env_file = project_dir.join(".env");
        if env_file.exists() {
            dotenvy::from_path(&env_file)
                .with_context(|| format!("Failed to load {}", env_file.display()))?;
        }

        let toml = AwpToml::load_or_default(&project_dir)?;
        Ok(Self::with_toml(project_dir, verbose, toml))
    }

    /// Build a Config around an already-parsed `awp.toml`.
    pub fn with_toml(project_dir: PathBuf, verbose: bool, toml: AwpToml) -> Self {
        let awp_dir = project_dir.join(AWP_DIR);
        let output_dir = project_dir.join(&toml.project.output_dir);

        Self {
            checkpoint_file: awp_dir.join("checkpoint.json"),
            chapters_dir: awp_dir.join("chapters"),
            literature_dir: awp_dir.join("literature"),
            log_dir: awp_dir.join("logs"),
            awp_dir,
            output_dir,
            project_dir,
            verbose,
            toml,
        }
    }

    /// Whether the project has an `awp.toml`.
    pub fn is_initialized(&self) -> bool {
        self.config_path().exists()
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_dir.join(CONFIG_FILE)
    }

    /// Path of the assembled markdown document.
    pub fn document_path(&self) -> PathBuf {
        self.output_dir.join("paper.md")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.chapters_dir)
            .context("Failed to create chapters directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(&self.output_dir).context("Failed to create output directory")?;
        Ok(())
    }

    /// Whether the manual literature directory holds at least one markdown file.
    pub fn has_manual_literature(&self) -> bool {
        has_markdown_files(&self.literature_dir)
    }
}

fn has_markdown_files(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_paths_live_under_awp_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.checkpoint_file, root.join(".awp/checkpoint.json"));
        assert_eq!(config.chapters_dir, root.join(".awp/chapters"));
        assert_eq!(config.output_dir, root.join("output"));
        assert_eq!(config.document_path(), root.join("output/paper.md"));
    }

    #[test]
    fn test_config_reads_output_dir_from_toml() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("awp.toml"),
            "[project]\noutput_dir = \"build\"\n",
        )
        .unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert!(config.is_initialized());
        assert!(config.output_dir.ends_with("build"));
    }

    #[test]
    fn test_not_initialized_without_toml() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert!(!config.is_initialized());
    }

    #[test]
    fn test_ensure_directories_creates_tree() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.chapters_dir.is_dir());
        assert!(config.log_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }

    #[test]
    fn test_manual_literature_detection() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert!(!config.has_manual_literature());
        fs::create_dir_all(&config.literature_dir).unwrap();
        fs::write(config.literature_dir.join("notes.txt"), "x").unwrap();
        assert!(!config.has_manual_literature());
        fs::write(config.literature_dir.join("literature_review.md"), "# Review").unwrap();
        assert!(config.has_manual_literature());
    }
}

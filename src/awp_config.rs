//! Project configuration read from `awp.toml`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-paper"
//! output_dir = "output"
//!
//! [repository]
//! url = "https://github.com/example/project"
//! branch = "main"
//!
//! [paper]
//! title = "A Study of Example"
//! template = "ieee"
//! language = "en"
//! chapters = [1, 2, 3, 4, 5, 6, 7]
//! review_after = [1, 3]
//!
//! [[paper.authors]]
//! name = "Ada Lovelace"
//! affiliation = "Analytical Engines Ltd"
//!
//! [literature]
//! provider = "manual"
//!
//! [output]
//! formats = ["markdown", "latex", "pdf"]
//! latex_compiler = "pdflatex"
//!
//! [worker]
//! command = "awp-worker"
//! args = []
//! required_env = ["ANTHROPIC_API_KEY"]
//! idle_timeout_secs = 900
//! decision_retries = 3
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chapter::{ChapterId, all_chapter_ids};
use crate::export::ExportFormat;
use crate::logging::LoggingConfig;

/// The configuration file name at the project root.
pub const CONFIG_FILE: &str = "awp.toml";

/// Literature research strategy handed to the worker.
///
/// The controller never inspects which strategy authored a chapter; it only
/// forwards the selection and checks the inputs each strategy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteratureProvider {
    /// Search through the Genspark API
    #[default]
    Genspark,
    /// Read a hand-written review from `.awp/literature/`
    Manual,
    /// Ask the generation model itself
    Claude,
}

impl std::fmt::Display for LiteratureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteratureProvider::Genspark => write!(f, "genspark"),
            LiteratureProvider::Manual => write!(f, "manual"),
            LiteratureProvider::Claude => write!(f, "claude"),
        }
    }
}

impl std::str::FromStr for LiteratureProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "genspark" => Ok(LiteratureProvider::Genspark),
            "manual" => Ok(LiteratureProvider::Manual),
            "claude" => Ok(LiteratureProvider::Claude),
            _ => anyhow::bail!(
                "Invalid literature provider '{}'. Valid values: genspark, manual, claude",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySection {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: default_branch(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSection {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    /// ieee, ieej, generic
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "all_chapter_ids")]
    pub chapters: Vec<ChapterId>,
    /// Chapters that pause for operator review
    #[serde(default)]
    pub review_after: Vec<ChapterId>,
}

impl Default for PaperSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            authors: Vec::new(),
            template: default_template(),
            language: default_language(),
            chapters: all_chapter_ids(),
            review_after: Vec::new(),
        }
    }
}

fn default_title() -> String {
    "Untitled Paper".to_string()
}

fn default_template() -> String {
    "ieee".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiteratureSection {
    #[serde(default)]
    pub provider: LiteratureProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,
    /// pdflatex, xelatex, lualatex, platex
    #[serde(default = "default_latex_compiler")]
    pub latex_compiler: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            latex_compiler: default_latex_compiler(),
        }
    }
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Markdown, ExportFormat::Latex, ExportFormat::Pdf]
}

fn default_latex_compiler() -> String {
    "pdflatex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_worker_cmd")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables the worker cannot run without
    #[serde(default = "default_required_env")]
    pub required_env: Vec<String>,
    /// Maximum silence from the worker before it is declared stalled.
    /// Unset means wait indefinitely.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_decision_retries")]
    pub decision_retries: u32,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            command: default_worker_cmd(),
            args: Vec::new(),
            required_env: default_required_env(),
            idle_timeout_secs: None,
            decision_retries: default_decision_retries(),
        }
    }
}

fn default_worker_cmd() -> String {
    "awp-worker".to_string()
}

fn default_required_env() -> Vec<String> {
    vec!["ANTHROPIC_API_KEY".to_string()]
}

fn default_decision_retries() -> u32 {
    3
}

/// The complete awp.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AwpToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub paper: PaperSection,
    #[serde(default)]
    pub literature: LiteratureSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AwpToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse awp.toml")
    }

    /// Load `awp.toml` from the project root, or defaults when it doesn't exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the worker command, with fallback to the `AWP_WORKER_CMD` environment variable.
    pub fn worker_cmd(&self) -> String {
        std::env::var("AWP_WORKER_CMD").unwrap_or_else(|_| self.worker.command.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for id in &self.paper.review_after {
            if !self.paper.chapters.contains(id) {
                warnings.push(format!(
                    "review_after lists chapter {} which is not in paper.chapters",
                    id
                ));
            }
        }

        if !matches!(self.paper.template.as_str(), "ieee" | "ieej" | "generic") {
            warnings.push(format!(
                "Unknown template '{}': expected ieee, ieej or generic",
                self.paper.template
            ));
        }

        if self.worker.decision_retries == 0 {
            warnings.push("worker.decision_retries is 0; decisions are sent once".to_string());
        }

        warnings
    }
}

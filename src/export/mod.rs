//! Export of the assembled document.
//!
//! Formats form a chain: markdown, then LaTeX derived from it, then PDF
//! compiled from the LaTeX. Requesting a format implies its upstream formats.
//! A failed format never removes artifacts already produced; the report
//! names the nearest produced upstream format as a fallback instead.

mod latex;
mod markdown;
mod pdf;

pub use latex::{document_class, markdown_to_latex, render_document};
pub use markdown::{Document, Section};
pub use pdf::LatexCompiler;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::ExportError;
use crate::util::write_atomic;

/// Default file stem of every artifact.
pub const DOCUMENT_STEM: &str = "paper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Latex,
    Pdf,
}

impl ExportFormat {
    /// All formats in dependency order.
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Markdown,
        ExportFormat::Latex,
        ExportFormat::Pdf,
    ];

    /// The format this one is derived from.
    pub fn upstream(self) -> Option<ExportFormat> {
        match self {
            ExportFormat::Markdown => None,
            ExportFormat::Latex => Some(ExportFormat::Markdown),
            ExportFormat::Pdf => Some(ExportFormat::Latex),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Latex => "tex",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Latex => "latex",
            ExportFormat::Pdf => "pdf",
        })
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "latex" | "tex" => Ok(ExportFormat::Latex),
            "pdf" => Ok(ExportFormat::Pdf),
            other => anyhow::bail!(
                "Invalid format '{}'. Valid values: markdown, latex, pdf",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ExportFailure {
    pub format: ExportFormat,
    pub error: ExportError,
    /// Nearest upstream format produced by the same export
    pub fallback: Option<ExportFormat>,
}

/// Outcome of one export call: what was produced and what wasn't.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub artifacts: Vec<ExportArtifact>,
    pub failures: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn artifact(&self, format: ExportFormat) -> Option<&ExportArtifact> {
        self.artifacts.iter().find(|a| a.format == format)
    }

    pub fn failure(&self, format: ExportFormat) -> Option<&ExportFailure> {
        self.failures.iter().find(|f| f.format == format)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn produced(&self, format: ExportFormat) -> bool {
        self.artifact(format).is_some()
    }

    fn nearest_produced_upstream(&self, format: ExportFormat) -> Option<ExportFormat> {
        let mut current = format.upstream();
        while let Some(candidate) = current {
            if self.produced(candidate) {
                return Some(candidate);
            }
            current = candidate.upstream();
        }
        None
    }
}

/// Produces one format's artifact.
pub trait FormatRenderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Write the artifact to `output`. `upstream` is the already produced
    /// artifact this format derives from, if it has one. Returns the path of
    /// the written artifact.
    fn render(
        &self,
        document: &Document,
        upstream: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, ExportError>;
}

struct MarkdownRenderer;

impl FormatRenderer for MarkdownRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    fn render(
        &self,
        document: &Document,
        _upstream: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, ExportError> {
        write_atomic(output, document.to_markdown().as_bytes()).map_err(|source| {
            ExportError::Io {
                path: output.to_path_buf(),
                source,
            }
        })?;
        Ok(output.to_path_buf())
    }
}

struct LatexRenderer;

impl FormatRenderer for LatexRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Latex
    }

    fn render(
        &self,
        document: &Document,
        _upstream: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, ExportError> {
        write_atomic(output, render_document(document).as_bytes()).map_err(|source| {
            ExportError::Io {
                path: output.to_path_buf(),
                source,
            }
        })?;
        Ok(output.to_path_buf())
    }
}

struct PdfRenderer {
    compiler: LatexCompiler,
}

impl FormatRenderer for PdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(
        &self,
        _document: &Document,
        upstream: Option<&Path>,
        output: &Path,
    ) -> Result<PathBuf, ExportError> {
        let tex = upstream.ok_or(ExportError::MissingDependency {
            format: ExportFormat::Pdf,
            dependency: ExportFormat::Latex,
        })?;
        // Compile next to the LaTeX source, then move the result into place,
        // so nothing beside a custom output path is touched
        let out_dir = tex
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let produced = self.compiler.compile(tex, out_dir)?;
        if produced != output {
            let moved = std::fs::rename(&produced, output).or_else(|_| {
                // Across filesystems rename fails, copy instead
                std::fs::copy(&produced, output)?;
                std::fs::remove_file(&produced)
            });
            moved.map_err(|source| ExportError::Io {
                path: output.to_path_buf(),
                source,
            })?;
        }
        Ok(output.to_path_buf())
    }
}

/// Runs the format chain for a document.
pub struct ExportPipeline {
    output_dir: PathBuf,
    renderers: Vec<Box<dyn FormatRenderer>>,
    overrides: Vec<(ExportFormat, PathBuf)>,
}

impl ExportPipeline {
    pub fn new(output_dir: PathBuf, latex_compiler: &str) -> Self {
        Self {
            output_dir,
            renderers: vec![
                Box::new(MarkdownRenderer),
                Box::new(LatexRenderer),
                Box::new(PdfRenderer {
                    compiler: LatexCompiler::new(latex_compiler),
                }),
            ],
            overrides: Vec::new(),
        }
    }

    /// Replace the renderer for the format it produces.
    pub fn with_renderer(mut self, renderer: Box<dyn FormatRenderer>) -> Self {
        let format = renderer.format();
        self.renderers.retain(|r| r.format() != format);
        self.renderers.push(renderer);
        self
    }

    /// Write `format`'s artifact to `path` instead of the output directory.
    pub fn with_output_path(mut self, format: ExportFormat, path: PathBuf) -> Self {
        self.overrides.retain(|(f, _)| *f != format);
        self.overrides.push((format, path));
        self
    }

    pub fn path_for(&self, format: ExportFormat) -> PathBuf {
        self.overrides
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| {
                self.output_dir
                    .join(format!("{}.{}", DOCUMENT_STEM, format.extension()))
            })
    }

    fn renderer(&self, format: ExportFormat) -> Option<&dyn FormatRenderer> {
        self.renderers
            .iter()
            .find(|r| r.format() == format)
            .map(|r| r.as_ref())
    }

    /// Produce `targets` and everything they depend on, in dependency order.
    ///
    /// Re-running with the same document overwrites the same paths.
    pub fn export(&self, document: &Document, targets: &[ExportFormat]) -> ExportReport {
        let mut required: Vec<ExportFormat> = Vec::new();
        for target in targets {
            let mut current = Some(*target);
            while let Some(format) = current {
                if !required.contains(&format) {
                    required.push(format);
                }
                current = format.upstream();
            }
        }

        let mut report = ExportReport::default();
        for format in ExportFormat::ALL {
            if !required.contains(&format) {
                continue;
            }

            let result = match format.upstream() {
                Some(dependency) if !report.produced(dependency) => {
                    Err(ExportError::MissingDependency { format, dependency })
                }
                upstream => {
                    let upstream_path = upstream
                        .and_then(|u| report.artifact(u))
                        .map(|a| a.path.clone());
                    match self.renderer(format) {
                        Some(renderer) => renderer.render(
                            document,
                            upstream_path.as_deref(),
                            &self.path_for(format),
                        ),
                        None => Err(ExportError::RendererNotFound(format.to_string())),
                    }
                }
            };

            match result {
                Ok(path) => {
                    info!(format = %format, path = %path.display(), "exported");
                    report.artifacts.push(ExportArtifact { format, path });
                }
                Err(error) => {
                    let fallback = report.nearest_produced_upstream(format);
                    warn!(format = %format, fallback = ?fallback, "export failed: {}", error);
                    report.failures.push(ExportFailure {
                        format,
                        error,
                        fallback,
                    });
                }
            }
        }
        report
    }
}

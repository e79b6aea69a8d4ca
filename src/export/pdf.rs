use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::errors::ExportError;
use crate::util::truncate_str;

/// Runs a LaTeX compiler (`pdflatex`, `xelatex`, ...) over a `.tex` file.
pub struct LatexCompiler {
    command: String,
    args: Vec<String>,
}

impl LatexCompiler {
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_args(command, Vec::new())
    }

    /// A compiler invoked with extra leading arguments, e.g. a wrapper script.
    pub fn with_args(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Compile `tex` into `out_dir`, returning the path of the produced PDF.
    ///
    /// Success is judged by the PDF existing afterwards; LaTeX compilers
    /// often exit nonzero on recoverable warnings.
    pub fn compile(&self, tex: &Path, out_dir: &Path) -> Result<PathBuf, ExportError> {
        // The compiler runs in the tex file's directory, so relative paths
        // must not be resolved twice
        let tex = absolute(tex)?;
        let out_dir = absolute(out_dir)?;
        let stem = tex
            .file_stem()
            .ok_or_else(|| ExportError::RendererFailed(format!("not a file: {}", tex.display())))?;
        let pdf = out_dir.join(stem).with_extension("pdf");
        // A stale PDF from an earlier run must not count as success
        if pdf.exists() {
            std::fs::remove_file(&pdf).map_err(|source| ExportError::Io {
                path: pdf.clone(),
                source,
            })?;
        }

        debug!(compiler = %self.command, tex = %tex.display(), "compiling pdf");
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("-interaction=nonstopmode")
            .arg(format!("-output-directory={}", out_dir.display()))
            .arg(&tex)
            .current_dir(tex.parent().unwrap_or(&out_dir))
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExportError::RendererNotFound(self.command.clone()),
                _ => ExportError::RendererFailed(format!("{}: {}", self.command, e)),
            })?;

        if pdf.exists() {
            return Ok(pdf);
        }

        // pdflatex reports errors on stdout
        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        warn!(status = ?output.status.code(), "pdf compilation produced no output");
        Err(ExportError::RendererFailed(format!(
            "{} exited with {}: {}",
            self.command,
            output.status,
            truncate_str(log.trim(), 500)
        )))
    }
}

/// Resolve against the current directory; an empty path means `.`.
fn absolute(path: &Path) -> Result<PathBuf, ExportError> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    std::path::absolute(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // Positional args seen by the script: $1 -interaction, $2 -output-directory, $3 tex
    fn fake_compiler(script: &str) -> LatexCompiler {
        LatexCompiler::with_args(
            "sh",
            vec!["-c".to_string(), script.to_string(), "fake-latex".to_string()],
        )
    }

    #[test]
    fn test_empty_directory_resolves_to_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("")).unwrap(), cwd);
        assert_eq!(absolute(Path::new("final.pdf")).unwrap(), cwd.join("final.pdf"));
    }

    #[test]
    fn test_missing_compiler() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, "x").unwrap();
        let err = LatexCompiler::new("/nonexistent/pdflatex")
            .compile(&tex, dir.path())
            .unwrap_err();
        assert!(matches!(err, ExportError::RendererNotFound(_)));
    }

    #[test]
    fn test_compiler_success_requires_pdf() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, "x").unwrap();

        // Writes <out_dir>/paper.pdf from the -output-directory argument
        let ok = fake_compiler(r#"out="${2#-output-directory=}"; echo pdf > "$out/paper.pdf""#);
        let pdf = ok.compile(&tex, dir.path()).unwrap();
        assert!(pdf.ends_with("paper.pdf"));
        assert!(pdf.exists());
    }

    #[test]
    fn test_compiler_without_pdf_fails_with_log() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("paper.tex");
        std::fs::write(&tex, "x").unwrap();
        std::fs::write(dir.path().join("paper.pdf"), "stale").unwrap();

        let bad = fake_compiler("echo '! Undefined control sequence.'; exit 1");
        let err = bad.compile(&tex, dir.path()).unwrap_err();
        match err {
            ExportError::RendererFailed(msg) => assert!(msg.contains("Undefined control sequence")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dir.path().join("paper.pdf").exists());
    }
}

//! Typesetting: hand the prepared markdown to an external engine.
//!
//! The engine is a black box with a file-in/file-out contract: it receives a
//! [`TypesetJob`] naming an input and output file relative to a working
//! directory plus a list of template variables, and either produces the
//! output file or fails. [`PandocEngine`] drives `pandoc` with a LaTeX
//! PDF engine.

use crate::config::{RenderConfig, StyleOptions};
use crate::error::OutlinePdfError;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info};

/// One invocation of the typesetting engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypesetJob {
    /// Directory the engine runs in; `input` and `output` are relative to it.
    pub working_dir: PathBuf,
    /// Markdown file name.
    pub input: String,
    /// PDF file name to produce.
    pub output: String,
    /// Table-of-contents depth, or `None` for no table of contents.
    pub toc_depth: Option<u8>,
    /// Number sections.
    pub number_sections: bool,
    /// Template variables in the order they are passed.
    pub variables: Vec<(String, String)>,
}

impl TypesetJob {
    /// Variables for a styled document: TOC label, margin, font size, main
    /// font and title.
    pub fn style_variables(toc_title: &str, style: &StyleOptions, title: &str) -> Vec<(String, String)> {
        vec![
            ("toc-title".to_string(), toc_title.to_string()),
            ("geometry".to_string(), format!("margin={}", style.margin)),
            ("fontsize".to_string(), style.fontsize.clone()),
            ("mainfont".to_string(), style.font.clone()),
            ("title".to_string(), title.to_string()),
        ]
    }

    /// Value of the first variable named `key`.
    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Produces a PDF from a [`TypesetJob`].
pub trait TypesetEngine: Send + Sync {
    fn typeset(&self, job: &TypesetJob) -> impl Future<Output = Result<(), OutlinePdfError>> + Send;
}

/// `pandoc` subprocess engine.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    program: String,
    pdf_engine: String,
}

impl PandocEngine {
    pub fn new(program: impl Into<String>, pdf_engine: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pdf_engine: pdf_engine.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(&config.engine_program, &config.pdf_engine)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for `job`, without the program name.
    pub fn args(&self, job: &TypesetJob) -> Vec<String> {
        let mut args = vec![
            job.input.clone(),
            "-o".to_string(),
            job.output.clone(),
            format!("--pdf-engine={}", self.pdf_engine),
        ];
        if let Some(depth) = job.toc_depth {
            args.push("--toc".to_string());
            args.push(format!("--toc-depth={depth}"));
        }
        if job.number_sections {
            args.push("-N".to_string());
        }
        for (key, value) in &job.variables {
            args.push("-V".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }

    /// First line of `<program> --version`.
    pub async fn version(&self) -> Result<String, OutlinePdfError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OutlinePdfError::EngineUnavailable {
                program: self.program.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(OutlinePdfError::RenderFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

impl TypesetEngine for PandocEngine {
    async fn typeset(&self, job: &TypesetJob) -> Result<(), OutlinePdfError> {
        let args = self.args(job);
        info!("Running {} {}", self.program, args.join(" "));

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .current_dir(&job.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OutlinePdfError::EngineUnavailable {
                program: self.program.clone(),
                source: e,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(OutlinePdfError::RenderFailed {
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", self.program, stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TypesetJob {
        let style = StyleOptions::new("3cm", "12pt", "Georgia");
        TypesetJob {
            working_dir: PathBuf::from("/tmp/out"),
            input: "doc.md".into(),
            output: "doc.pdf".into(),
            toc_depth: Some(3),
            number_sections: true,
            variables: TypesetJob::style_variables("Inhaltsverzeichnis", &style, "Q1: Report"),
        }
    }

    #[test]
    fn test_pandoc_args() {
        let engine = PandocEngine::new("pandoc", "xelatex");
        let args = engine.args(&job());
        assert_eq!(
            args,
            vec![
                "doc.md",
                "-o",
                "doc.pdf",
                "--pdf-engine=xelatex",
                "--toc",
                "--toc-depth=3",
                "-N",
                "-V",
                "toc-title=Inhaltsverzeichnis",
                "-V",
                "geometry=margin=3cm",
                "-V",
                "fontsize=12pt",
                "-V",
                "mainfont=Georgia",
                "-V",
                "title=Q1: Report",
            ]
        );
    }

    #[test]
    fn test_pandoc_args_without_toc_or_numbering() {
        let mut j = job();
        j.toc_depth = None;
        j.number_sections = false;
        let args = PandocEngine::new("pandoc", "lualatex").args(&j);
        assert!(!args.iter().any(|a| a.starts_with("--toc")));
        assert!(!args.contains(&"-N".to_string()));
        assert!(args.contains(&"--pdf-engine=lualatex".to_string()));
    }

    #[test]
    fn test_variable_lookup() {
        let j = job();
        assert_eq!(j.variable("mainfont"), Some("Georgia"));
        assert_eq!(j.variable("geometry"), Some("margin=3cm"));
        assert_eq!(j.variable("missing"), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_engine_unavailable() {
        let engine = PandocEngine::new("definitely-not-a-real-typesetter-binary", "xelatex");
        let mut j = job();
        j.working_dir = std::env::temp_dir();
        let err = engine.typeset(&j).await.unwrap_err();
        assert!(matches!(err, OutlinePdfError::EngineUnavailable { .. }), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_render_failed() {
        let engine = PandocEngine::new("false", "xelatex");
        let mut j = job();
        j.working_dir = std::env::temp_dir();
        let err = engine.typeset(&j).await.unwrap_err();
        assert!(matches!(err, OutlinePdfError::RenderFailed { .. }), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_render_failed_carries_status_and_stderr() {
        // `sh doc.md …` runs the input file as a script; the remaining
        // arguments become unused positional parameters.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "echo 'missing font' >&2\nexit 3\n").unwrap();
        let engine = PandocEngine::new("sh", "xelatex");
        let mut j = job();
        j.working_dir = dir.path().to_path_buf();

        match engine.typeset(&j).await.unwrap_err() {
            OutlinePdfError::RenderFailed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "missing font");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("doc.pdf").exists());
    }
}

//! Render entry points: markdown in, PDF path out.
//!
//! [`Renderer`] owns the configuration, the image fetcher and the typesetting
//! engine. Each call works on its own temporary markdown file and its own
//! temporary PDF inside the output directory, and only publishes the PDF under
//! its final name once the engine succeeded, so concurrent renders never
//! clobber each other's intermediates and a failed run leaves no file that
//! looks like a result.

use crate::config::{RenderConfig, StyleOptions};
use crate::error::OutlinePdfError;
use crate::outline::OutlineClient;
use crate::output::{RenderRequest, RenderResult, RenderStats};
use crate::pipeline::fetch::{HttpImageFetcher, ImageFetcher};
use crate::pipeline::images::{ImageResolver, ImageStats};
use crate::pipeline::normalize::normalize;
use crate::pipeline::typeset::{PandocEngine, TypesetEngine, TypesetJob};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// File name used when a title sanitises to nothing.
pub const FALLBACK_TITLE: &str = "dokument";

/// Title used when an Outline document has none.
pub const UNTITLED_DOCUMENT: &str = "Dokument";

/// Markdown-to-PDF renderer.
///
/// Generic over the network and subprocess boundaries; [`Renderer::new`]
/// wires the production `reqwest` fetcher and `pandoc` engine.
pub struct Renderer<F = HttpImageFetcher, E = PandocEngine> {
    config: RenderConfig,
    fetcher: F,
    engine: E,
}

impl Renderer {
    /// Production renderer for `config`.
    pub fn new(config: RenderConfig) -> Result<Self, OutlinePdfError> {
        let fetcher = HttpImageFetcher::new(config.fetch_timeout_secs)?;
        let engine = PandocEngine::from_config(&config);
        Ok(Self::with_parts(config, fetcher, engine))
    }
}

impl<F: ImageFetcher, E: TypesetEngine> Renderer<F, E> {
    /// Renderer with caller-supplied fetcher and engine.
    pub fn with_parts(config: RenderConfig, fetcher: F, engine: E) -> Self {
        Self {
            config,
            fetcher,
            engine,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Normalise `text` and resolve its images into the asset directory.
    pub async fn normalize_and_resolve(
        &self,
        text: &str,
    ) -> Result<(String, ImageStats), OutlinePdfError> {
        let normalized = normalize(text);
        let asset_dir = self.config.asset_dir();
        ImageResolver::new(
            &self.fetcher,
            &self.config.origin_url,
            &self.config.api_token,
            &asset_dir,
        )
        .link_prefix(&self.config.images_dir)
        .concurrency(self.config.concurrency)
        .resolve(&normalized)
        .await
    }

    /// Render `markdown` to `<output_dir>/<sanitized title>.pdf`.
    ///
    /// # Errors
    /// Fatal only when the PDF cannot be produced: unwritable output
    /// directory, engine missing or exiting non-zero. Individual images that
    /// fail to download are logged and left as remote references.
    pub async fn render(
        &self,
        markdown: &str,
        title: &str,
        style: &StyleOptions,
    ) -> Result<RenderResult, OutlinePdfError> {
        let total_start = Instant::now();
        let output_dir = &self.config.output_dir;
        info!("Rendering '{}' into {}", title, output_dir.display());

        // ── Step 1: Output directory ─────────────────────────────────────
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| OutlinePdfError::fs(output_dir, e))?;

        // ── Step 2: Normalise + resolve images ───────────────────────────
        let resolve_start = Instant::now();
        let (prepared, images) = self.normalize_and_resolve(markdown).await?;
        let resolve_duration_ms = resolve_start.elapsed().as_millis() as u64;

        // ── Step 3: Temporary document ───────────────────────────────────
        let temp_md = tempfile::Builder::new()
            .prefix(".outline-pdf-")
            .suffix(".md")
            .tempfile_in(output_dir)
            .map_err(|e| OutlinePdfError::fs(output_dir, e))?;
        tokio::fs::write(temp_md.path(), prepared.as_bytes())
            .await
            .map_err(|e| OutlinePdfError::fs(temp_md.path(), e))?;

        let input_name = file_name_of(temp_md.path())?;
        let temp_pdf_name = format!("{}.pdf", input_name.trim_end_matches(".md"));
        let temp_pdf = output_dir.join(&temp_pdf_name);
        debug!("Temporary document {} → {}", input_name, temp_pdf_name);

        // ── Step 4: Typeset ──────────────────────────────────────────────
        let filename = format!("{}.pdf", sanitize_title(title));
        let job = TypesetJob {
            working_dir: output_dir.clone(),
            input: input_name,
            output: temp_pdf_name,
            toc_depth: Some(self.config.toc_depth),
            number_sections: self.config.number_sections,
            variables: TypesetJob::style_variables(&self.config.toc_title, style, title),
        };

        let typeset_start = Instant::now();
        if let Err(e) = self.engine.typeset(&job).await {
            discard(&temp_pdf).await;
            return Err(e);
        }
        let typeset_duration_ms = typeset_start.elapsed().as_millis() as u64;

        if !tokio::fs::try_exists(&temp_pdf).await.unwrap_or(false) {
            return Err(OutlinePdfError::MissingOutput { path: temp_pdf });
        }

        // ── Step 5: Publish ──────────────────────────────────────────────
        let final_path = output_dir.join(&filename);
        if let Err(e) = tokio::fs::rename(&temp_pdf, &final_path).await {
            discard(&temp_pdf).await;
            return Err(OutlinePdfError::fs(&final_path, e));
        }
        drop(temp_md);

        let pdf_path = tokio::fs::canonicalize(&final_path)
            .await
            .map_err(|e| OutlinePdfError::fs(&final_path, e))?;

        let stats = RenderStats {
            images,
            resolve_duration_ms,
            typeset_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Rendered {} in {}ms ({} images)",
            pdf_path.display(),
            stats.total_duration_ms,
            stats.images.downloaded
        );

        Ok(RenderResult {
            pdf_path,
            filename,
            stats,
        })
    }

    /// Render a [`RenderRequest`].
    pub async fn render_request(&self, request: &RenderRequest) -> Result<RenderResult, OutlinePdfError> {
        if let Some(ref id) = request.document_id {
            debug!("Render request for document {}", id);
        }
        self.render(&request.markdown, &request.title, &request.style)
            .await
    }

    /// Fetch a document from Outline and render it.
    pub async fn render_document(
        &self,
        client: &OutlineClient,
        document_id: &str,
        style: &StyleOptions,
    ) -> Result<RenderResult, OutlinePdfError> {
        let document = client.document(document_id).await?;
        let title = if document.title.trim().is_empty() {
            UNTITLED_DOCUMENT.to_string()
        } else {
            document.title
        };
        let request = RenderRequest {
            document_id: Some(document.id),
            title,
            markdown: document.text,
            style: style.clone(),
        };
        self.render_request(&request).await
    }
}

// ── Title sanitising ─────────────────────────────────────────────────────────

static RE_UNSAFE_TITLE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Turn a document title into a file-system-safe base name.
///
/// Transliterates to ASCII, keeps only word characters, whitespace and
/// hyphens, trims, joins words with `_`. Falls back to [`FALLBACK_TITLE`].
pub fn sanitize_title(title: &str) -> String {
    let ascii = deunicode::deunicode(title);
    let kept = RE_UNSAFE_TITLE_CHARS.replace_all(&ascii, "");
    let joined = RE_WHITESPACE.replace_all(kept.trim(), "_");
    if joined.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        joined.into_owned()
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn file_name_of(path: &Path) -> Result<String, OutlinePdfError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| OutlinePdfError::Internal(format!("non-UTF-8 temp path {}", path.display())))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
    }
}

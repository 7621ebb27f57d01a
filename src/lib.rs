//! # outline-pdf
//!
//! Render documents from an [Outline](https://www.getoutline.com) wiki as
//! styled PDFs.
//!
//! Outline stores documents as markdown whose images point at authenticated
//! attachment URLs of the instance. A typesetter running locally cannot fetch
//! those, so this crate first pulls every referenced image into a local asset
//! directory, rewrites the references to relative paths, cleans up the
//! markdown so pandoc recognises every heading, and only then hands the text
//! to pandoc.
//!
//! ## Pipeline Overview
//!
//! ```text
//! markdown
//!  │
//!  ├─ 1. Normalise  escaped newlines, invisible chars, <div> wrappers, headings
//!  ├─ 2. Scan       markdown ![alt](url) and HTML <img src="…"> references
//!  ├─ 3. Fetch      distinct URLs, concurrently, bearer token for the origin only
//!  ├─ 4. Rewrite    references → images/<id>.<ext>
//!  ├─ 5. Typeset    pandoc on a per-request temp file (--toc, -N, style vars)
//!  └─ 6. Publish    rename to <sanitized title>.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outline_pdf::{OutlineClient, OutlineConfig, RenderConfig, Renderer, StyleOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OUTLINE_URL / OUTLINE_API_TOKEN / OUTPUT_DIR
//!     let renderer = Renderer::new(RenderConfig::from_env()?)?;
//!     let client = OutlineClient::new(OutlineConfig::from_env()?)?;
//!
//!     let style = StyleOptions::new("3cm", "12pt", "Georgia");
//!     let result = renderer
//!         .render_document(&client, "3283f2f9-c0f7-4575-b5d9-76d5aa4befcb", &style)
//!         .await?;
//!     println!("{} ({} images)", result.pdf_path.display(), result.stats.images.downloaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `outline-pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! outline-pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! Rendering shells out to `pandoc` with `--pdf-engine=xelatex` by default,
//! so both must be installed. `outline-pdf doctor` checks for them.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod doctor;
pub mod error;
pub mod outline;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod templates;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutlineConfig, RenderConfig, RenderConfigBuilder, StyleOptions};
pub use error::{FetchError, OutlinePdfError};
pub use outline::{Collection, Document, OutlineClient, SearchHit};
pub use output::{RenderRequest, RenderResult, RenderStats};
pub use pipeline::fetch::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use pipeline::images::{normalize_and_resolve, ImageResolver, ImageStats};
pub use pipeline::normalize::normalize;
pub use pipeline::typeset::{PandocEngine, TypesetEngine, TypesetJob};
pub use render::{sanitize_title, Renderer};
pub use templates::{StyleTemplate, TemplateStore};
pub use validate::{validate_document_id, validate_proxy_url};

//! Configuration types for fetching and rendering.
//!
//! All render behaviour is controlled through [`RenderConfig`], built via its
//! [`RenderConfigBuilder`]. Access to the Outline API is configured separately
//! through [`OutlineConfig`] so that rendering a local file never needs a
//! token. Both are plain values constructed once at startup and handed to
//! [`crate::render::Renderer`] and [`crate::outline::OutlineClient`].
//!
//! Per-document styling lives in [`StyleOptions`], a serde value object that
//! is also what style templates persist.

use crate::error::OutlinePdfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default page margin passed to pandoc's `geometry` variable.
pub const DEFAULT_MARGIN: &str = "2.5cm";
/// Default body font size.
pub const DEFAULT_FONTSIZE: &str = "11pt";
/// Default main font.
pub const DEFAULT_FONT: &str = "Arial";

/// Environment variable holding the Outline base URL.
pub const ENV_OUTLINE_URL: &str = "OUTLINE_URL";
/// Environment variable holding the Outline API token.
pub const ENV_OUTLINE_API_TOKEN: &str = "OUTLINE_API_TOKEN";
/// Environment variable overriding the output directory.
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";

/// Page styling for one rendered PDF.
///
/// Missing fields in JSON fall back to the `DEFAULT_*` constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOptions {
    /// Page margin, e.g. `"2.5cm"`.
    pub margin: String,
    /// Font size, e.g. `"11pt"`.
    pub fontsize: String,
    /// Main font family, e.g. `"Georgia"`.
    pub font: String,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN.to_string(),
            fontsize: DEFAULT_FONTSIZE.to_string(),
            font: DEFAULT_FONT.to_string(),
        }
    }
}

impl StyleOptions {
    pub fn new(
        margin: impl Into<String>,
        fontsize: impl Into<String>,
        font: impl Into<String>,
    ) -> Self {
        Self {
            margin: margin.into(),
            fontsize: fontsize.into(),
            font: font.into(),
        }
    }

    /// Overlay the `Some` values onto `self`.
    pub fn with_overrides(
        mut self,
        margin: Option<&str>,
        fontsize: Option<&str>,
        font: Option<&str>,
    ) -> Self {
        if let Some(m) = margin {
            self.margin = m.to_string();
        }
        if let Some(s) = fontsize {
            self.fontsize = s.to_string();
        }
        if let Some(f) = font {
            self.font = f.to_string();
        }
        self
    }
}

/// Configuration for the render pipeline.
///
/// Built via [`RenderConfig::builder()`] or [`RenderConfig::from_env()`].
///
/// # Example
/// ```rust
/// use outline_pdf::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .origin_url("https://wiki.example.com/")
///     .api_token("ol_api_0123456789")
///     .output_dir("output")
///     .build()
///     .unwrap();
/// assert_eq!(config.origin_url, "https://wiki.example.com");
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// Base URL of the trusted origin, without trailing slash.
    ///
    /// Relative image references (`/api/attachments.redirect?id=…`) are
    /// joined onto it, and only URLs under it receive the bearer token.
    pub origin_url: String,

    /// Bearer token sent with image requests to the origin. Default: empty.
    pub api_token: String,

    /// Directory receiving the PDFs and temporary documents. Default: `output`.
    pub output_dir: PathBuf,

    /// Name of the asset sub-directory inside `output_dir`. Default: `images`.
    ///
    /// Rewritten references point at `<images_dir>/<file>` relative to the
    /// temp document, so this is also the link prefix.
    pub images_dir: String,

    /// Typesetting program. Default: `pandoc`.
    pub engine_program: String,

    /// LaTeX engine pandoc should use. Default: `xelatex`.
    pub pdf_engine: String,

    /// Heading of the table of contents. Default: `Inhaltsverzeichnis`.
    pub toc_title: String,

    /// Table-of-contents depth. Default: 3.
    pub toc_depth: u8,

    /// Number sections (`-N`). Default: true.
    pub number_sections: bool,

    /// Per-image download timeout in seconds. Default: 15.
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent image downloads per render. Default: 8.
    pub concurrency: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            origin_url: String::new(),
            api_token: String::new(),
            output_dir: PathBuf::from("output"),
            images_dir: "images".to_string(),
            engine_program: "pandoc".to_string(),
            pdf_engine: "xelatex".to_string(),
            toc_title: "Inhaltsverzeichnis".to_string(),
            toc_depth: 3,
            number_sections: true,
            fetch_timeout_secs: 15,
            concurrency: 8,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("origin_url", &self.origin_url)
            .field("api_token", &redact(&self.api_token))
            .field("output_dir", &self.output_dir)
            .field("images_dir", &self.images_dir)
            .field("engine_program", &self.engine_program)
            .field("pdf_engine", &self.pdf_engine)
            .field("toc_title", &self.toc_title)
            .field("toc_depth", &self.toc_depth)
            .field("number_sections", &self.number_sections)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build from `OUTLINE_URL`, `OUTLINE_API_TOKEN` and `OUTPUT_DIR`.
    ///
    /// Unset variables keep their defaults; rendering local files works
    /// without any of them.
    pub fn from_env() -> Result<Self, OutlinePdfError> {
        let mut builder = Self::builder();
        if let Ok(url) = std::env::var(ENV_OUTLINE_URL) {
            builder = builder.origin_url(url);
        }
        if let Ok(token) = std::env::var(ENV_OUTLINE_API_TOKEN) {
            builder = builder.api_token(token);
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            builder = builder.output_dir(dir);
        }
        builder.build()
    }

    /// Absolute or relative path of the asset directory.
    pub fn asset_dir(&self) -> PathBuf {
        self.output_dir.join(&self.images_dir)
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn origin_url(mut self, url: impl Into<String>) -> Self {
        self.config.origin_url = trim_base_url(url.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = token.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn images_dir(mut self, name: impl Into<String>) -> Self {
        self.config.images_dir = name.into();
        self
    }

    pub fn engine_program(mut self, program: impl Into<String>) -> Self {
        self.config.engine_program = program.into();
        self
    }

    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.pdf_engine = engine.into();
        self
    }

    pub fn toc_title(mut self, title: impl Into<String>) -> Self {
        self.config.toc_title = title.into();
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.toc_depth = depth.clamp(1, 6);
        self
    }

    pub fn number_sections(mut self, v: bool) -> Self {
        self.config.number_sections = v;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, OutlinePdfError> {
        let c = &self.config;
        if !c.origin_url.is_empty() && !is_http_url(&c.origin_url) {
            return Err(OutlinePdfError::InvalidConfig(format!(
                "origin URL must start with http:// or https://, got '{}'",
                c.origin_url
            )));
        }
        if c.images_dir.is_empty() || c.images_dir.contains(['/', '\\']) || c.images_dir == ".." {
            return Err(OutlinePdfError::InvalidConfig(format!(
                "images dir must be a single path segment, got '{}'",
                c.images_dir
            )));
        }
        if c.engine_program.trim().is_empty() {
            return Err(OutlinePdfError::InvalidConfig(
                "engine program must not be empty".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 {
            return Err(OutlinePdfError::InvalidConfig(
                "fetch timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Connection settings for the Outline API.
#[derive(Clone)]
pub struct OutlineConfig {
    /// Base URL without trailing slash, e.g. `https://wiki.example.com`.
    pub base_url: String,
    /// Bearer token.
    pub api_token: String,
    /// Request timeout in seconds. Default: 10.
    pub timeout_secs: u64,
}

impl fmt::Debug for OutlineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutlineConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &redact(&self.api_token))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OutlineConfig {
    /// Both URL and token are required.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, OutlinePdfError> {
        let base_url = trim_base_url(base_url.into());
        let api_token = api_token.into();
        if base_url.is_empty() || api_token.is_empty() {
            return Err(OutlinePdfError::InvalidConfig(format!(
                "{ENV_OUTLINE_URL} and {ENV_OUTLINE_API_TOKEN} must both be set"
            )));
        }
        if !is_http_url(&base_url) {
            return Err(OutlinePdfError::InvalidConfig(format!(
                "{ENV_OUTLINE_URL} must start with http:// or https://, got '{base_url}'"
            )));
        }
        Ok(Self {
            base_url,
            api_token,
            timeout_secs: 10,
        })
    }

    pub fn from_env() -> Result<Self, OutlinePdfError> {
        Self::new(
            std::env::var(ENV_OUTLINE_URL).unwrap_or_default(),
            std::env::var(ENV_OUTLINE_API_TOKEN).unwrap_or_default(),
        )
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }
}

fn trim_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

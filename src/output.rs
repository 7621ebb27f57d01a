//! Request and result types of a render.

use crate::config::StyleOptions;
use crate::pipeline::images::ImageStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything needed to render one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Outline document id, when the markdown came from the API.
    pub document_id: Option<String>,
    pub title: String,
    pub markdown: String,
    #[serde(default)]
    pub style: StyleOptions,
}

/// A produced PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    /// Absolute path of the PDF.
    pub pdf_path: PathBuf,
    /// `<sanitized title>.pdf`
    pub filename: String,
    pub stats: RenderStats,
}

/// Timing and image counters for one render.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RenderStats {
    pub images: ImageStats,
    /// Wall-clock time spent resolving images.
    pub resolve_duration_ms: u64,
    /// Wall-clock time spent inside the typesetting engine.
    pub typeset_duration_ms: u64,
    pub total_duration_ms: u64,
}

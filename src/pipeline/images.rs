//! Image resolution: replace remote image references with cached local files.
//!
//! Outline serves attachments from `/api/attachments.redirect?id=…`, which
//! requires the API token. The typesetting engine runs offline and cannot
//! authenticate, so every image is downloaded up front, stored under a name
//! derived from its remote identifier, and the reference is rewritten to that
//! local file.
//!
//! ## Per-reference steps
//!
//! 1. trim the URL; join `/…` paths onto the origin, keep `http(s)://` URLs
//! 2. fetch, with the bearer token only when the URL belongs to the origin
//! 3. pick an extension from `Content-Type`
//! 4. pick a base name: query `id`, else last path segment, else `image`
//! 5. write `<asset_dir>/<base><ext>`, overwriting
//! 6. rewrite the target to `<link_prefix>/<base><ext>`
//!
//! A failed download is logged and leaves that one reference untouched.
//! Only filesystem errors abort the call.

use crate::error::OutlinePdfError;
use crate::pipeline::fetch::{FetchedImage, ImageFetcher};
use crate::pipeline::normalize::normalize;
use crate::pipeline::references::{rewrite_html, rewrite_markdown, scan_all};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fallback base name when a URL carries neither an `id` nor a path segment.
pub const FALLBACK_IMAGE_NAME: &str = "image";

/// A downloaded image with its deterministic local name.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub source_url: String,
    /// `<base><ext>`, e.g. `abc123.png`.
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ResolvedAsset {
    pub fn new(source_url: String, fetched: FetchedImage) -> Self {
        let filename = local_filename(&source_url, &fetched.content_type);
        Self {
            source_url,
            filename,
            bytes: fetched.bytes,
            content_type: fetched.content_type,
        }
    }
}

/// Counters for one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    /// References found by both scanners, including malformed ones.
    pub references: usize,
    /// Distinct source URLs a download was attempted for.
    pub distinct_urls: usize,
    /// Files written to the asset directory.
    pub downloaded: usize,
    /// Distinct URLs whose download failed.
    pub failed: usize,
    /// References left alone because their URL could not be resolved.
    pub skipped: usize,
}

/// Resolves image references against one origin into one asset directory.
pub struct ImageResolver<'a, F> {
    fetcher: &'a F,
    origin_url: &'a str,
    api_token: &'a str,
    asset_dir: &'a Path,
    link_prefix: &'a str,
    concurrency: usize,
}

impl<'a, F: ImageFetcher> ImageResolver<'a, F> {
    /// `origin_url` must not carry a trailing slash. Rewritten links use the
    /// prefix `images`; see [`Self::link_prefix`].
    pub fn new(fetcher: &'a F, origin_url: &'a str, api_token: &'a str, asset_dir: &'a Path) -> Self {
        Self {
            fetcher,
            origin_url,
            api_token,
            asset_dir,
            link_prefix: "images",
            concurrency: 8,
        }
    }

    pub fn link_prefix(mut self, prefix: &'a str) -> Self {
        self.link_prefix = prefix;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Download every resolvable image in `text` and rewrite its reference.
    ///
    /// Text without image references is returned unchanged and nothing is
    /// created on disk.
    pub async fn resolve(&self, text: &str) -> Result<(String, ImageStats), OutlinePdfError> {
        let mut stats = ImageStats::default();
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for reference in scan_all(text) {
            stats.references += 1;
            match resolve_source_url(reference.raw_url, self.origin_url) {
                Some(url) => {
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
                None => {
                    debug!("Leaving {:?} reference '{}' untouched", reference.kind, reference.raw_url);
                    stats.skipped += 1;
                }
            }
        }
        stats.distinct_urls = urls.len();

        if urls.is_empty() {
            return Ok((text.to_string(), stats));
        }

        info!("Resolving {} images into {}", urls.len(), self.asset_dir.display());

        let mut fetched: Vec<_> = stream::iter(urls.into_iter().enumerate().map(
            |(index, url)| async move {
                let bearer = belongs_to_origin(&url, self.origin_url).then_some(self.api_token);
                let result = self.fetcher.fetch(&url, bearer).await;
                (index, url, result)
            },
        ))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        // Writes follow reference order so that when two URLs share a file
        // name the later reference wins, however the downloads interleave.
        fetched.sort_by_key(|(index, _, _)| *index);

        let mut local_paths: HashMap<String, String> = HashMap::new();
        let mut written: HashSet<String> = HashSet::new();
        let mut dir_ready = false;

        for (_, url, result) in fetched {
            match result {
                Ok(image) => {
                    if !dir_ready {
                        tokio::fs::create_dir_all(self.asset_dir)
                            .await
                            .map_err(|e| OutlinePdfError::fs(self.asset_dir, e))?;
                        dir_ready = true;
                    }
                    let asset = ResolvedAsset::new(url, image);
                    if !written.insert(asset.filename.clone()) {
                        debug!("Overwriting {} with {}", asset.filename, asset.source_url);
                    }
                    self.write_asset(&asset).await?;
                    local_paths.insert(
                        asset.source_url,
                        format!("{}/{}", self.link_prefix, asset.filename),
                    );
                }
                Err(e) => {
                    warn!("Could not load image, keeping original reference: {}", e);
                    stats.failed += 1;
                }
            }
        }
        stats.downloaded = written.len();

        let lookup = |raw: &str| {
            resolve_source_url(raw, self.origin_url).and_then(|url| local_paths.get(&url).cloned())
        };
        let rewritten = rewrite_markdown(text, lookup);
        let rewritten = rewrite_html(&rewritten, lookup);

        info!(
            "Images: {} downloaded, {} failed, {} skipped",
            stats.downloaded, stats.failed, stats.skipped
        );
        Ok((rewritten, stats))
    }

    async fn write_asset(&self, asset: &ResolvedAsset) -> Result<(), OutlinePdfError> {
        let path: PathBuf = self.asset_dir.join(&asset.filename);
        debug!(
            "Writing {} ({} bytes, {}) from {}",
            path.display(),
            asset.bytes.len(),
            asset.content_type,
            asset.source_url
        );
        tokio::fs::write(&path, &asset.bytes)
            .await
            .map_err(|e| OutlinePdfError::fs(path, e))
    }
}

/// Normalise `text`, then resolve its images. See [`normalize`] and
/// [`ImageResolver::resolve`].
pub async fn normalize_and_resolve<F: ImageFetcher>(
    text: &str,
    origin_url: &str,
    api_token: &str,
    asset_dir: &Path,
    fetcher: &F,
) -> Result<String, OutlinePdfError> {
    let normalized = normalize(text);
    let (resolved, _stats) = ImageResolver::new(fetcher, origin_url, api_token, asset_dir)
        .resolve(&normalized)
        .await?;
    Ok(resolved)
}

// ── URL helpers ──────────────────────────────────────────────────────────────

/// Turn a reference URL into an absolute fetchable URL.
///
/// `/path` is joined onto the origin; `http(s)://` is kept. Everything else
/// (blank, `data:`, protocol-relative, document-relative) yields `None`.
pub fn resolve_source_url(raw: &str, origin_url: &str) -> Option<String> {
    let url = raw.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }
    if url.starts_with('/') && !url.starts_with("//") && !origin_url.is_empty() {
        return Some(format!("{origin_url}{url}"));
    }
    None
}

/// `true` when `url` is `origin_url` itself or lies beneath it.
///
/// The character after the prefix must end the authority or path segment, so
/// `https://wiki.example.com.evil.net` does not count as
/// `https://wiki.example.com`.
pub fn belongs_to_origin(url: &str, origin_url: &str) -> bool {
    if origin_url.is_empty() {
        return false;
    }
    match url.strip_prefix(origin_url) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// File extension for a `Content-Type` value.
pub fn extension_for(content_type: &str) -> &'static str {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("png") {
        ".png"
    } else if ct.contains("jpeg") || ct.contains("jpg") {
        ".jpg"
    } else if ct.contains("gif") {
        ".gif"
    } else {
        ".bin"
    }
}

/// Stable base name for a source URL: query `id`, else last path segment,
/// else [`FALLBACK_IMAGE_NAME`].
pub fn base_name(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return FALLBACK_IMAGE_NAME.to_string();
    };

    let from_id = parsed
        .query_pairs()
        .find(|(k, v)| k == "id" && !v.is_empty())
        .map(|(_, v)| v.into_owned());

    let name = from_id.or_else(|| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|last| !last.is_empty())
            .map(str::to_string)
    });

    name.map(|n| safe_file_component(&n))
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| FALLBACK_IMAGE_NAME.to_string())
}

/// `<base><ext>` for a source URL and its content type.
pub fn local_filename(url: &str, content_type: &str) -> String {
    format!("{}{}", base_name(url), extension_for(content_type))
}

// Identifiers become file names; anything that could escape the asset
// directory or confuse a shell is replaced.
fn safe_file_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

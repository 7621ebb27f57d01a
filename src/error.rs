//! Error types for the outline-pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OutlinePdfError`] : **Fatal**: the PDF cannot be produced at all
//!   (temp document not writable, pandoc exited non-zero, Outline API down).
//!   Returned as `Err(OutlinePdfError)` from the top-level operations.
//!
//! * [`FetchError`] : **Non-fatal**: one embedded image could not be
//!   downloaded. The resolver logs it, leaves that single reference pointing
//!   at its original URL and keeps going. It never reaches the caller.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// All fatal errors returned by the outline-pdf library.
///
/// Per-image download failures use [`FetchError`] and are absorbed by
/// [`crate::pipeline::images::ImageResolver`] rather than propagated here.
#[derive(Debug, Error)]
pub enum OutlinePdfError {
    // ── Filesystem errors ────────────────────────────────────────────────
    /// Could not create, write or rename a file or directory.
    #[error("Filesystem error at '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Typesetting errors ───────────────────────────────────────────────
    /// The typesetting engine ran but exited with a non-zero status.
    #[error("Typesetting engine failed ({status}):\n{stderr}")]
    RenderFailed { status: ExitStatus, stderr: String },

    /// The typesetting engine could not be started at all.
    #[error("Typesetting engine '{program}' could not be started: {source}\nIs it installed and on PATH?")]
    EngineUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine reported success but the expected PDF is missing.
    #[error("Typesetting engine reported success but produced no file at '{path}'")]
    MissingOutput { path: PathBuf },

    // ── Input validation ─────────────────────────────────────────────────
    /// A document identifier is not a UUID.
    #[error("Invalid document id '{id}': expected a UUID")]
    InvalidDocumentId { id: String },

    /// A URL is not allowed to be fetched through the origin.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Outline API errors ───────────────────────────────────────────────
    /// The Outline API answered with a non-success status.
    #[error("Outline API '{method}' returned HTTP {status}: {detail}")]
    Api {
        method: String,
        status: u16,
        detail: String,
    },

    /// The Outline API could not be reached or its response was unreadable.
    #[error("Outline API '{method}' unreachable: {reason}")]
    ApiUnreachable { method: String, reason: String },

    // ── Templates ────────────────────────────────────────────────────────
    /// No style template with that name exists.
    #[error("Style template '{name}' not found")]
    TemplateNotFound { name: String },

    /// The template store exists but is not valid JSON.
    #[error("Template store '{path}' is corrupt: {detail}")]
    CorruptTemplateStore { path: PathBuf, detail: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OutlinePdfError {
    /// Shorthand for wrapping an [`std::io::Error`] with the path it concerns.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single embedded image.
///
/// The reference stays unresolved in the output; the render continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status} for '{url}'")]
    Status { url: String, status: u16 },

    /// No response within the configured timeout.
    #[error("Timed out after {secs}s fetching '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Connection, TLS or redirect failure.
    #[error("Network error fetching '{url}': {reason}")]
    Network { url: String, reason: String },

    /// The response started but its body could not be read.
    #[error("Failed reading body of '{url}': {reason}")]
    Body { url: String, reason: String },
}

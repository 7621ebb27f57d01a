//! Pipeline stages for markdown-to-PDF rendering.
//!
//! Each submodule implements exactly one transformation step and is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ references ──▶ fetch ──▶ images ──▶ typeset
//! (cleanup)     (scan refs)    (HTTP)    (rewrite)  (pandoc)
//! ```
//!
//! 1. [`normalize`]  : pure text cleanup so pandoc sees every heading
//! 2. [`references`] : lazy scanners and rewriters for markdown and HTML
//!    image references
//! 3. [`fetch`]      : the network boundary; the only stage with HTTP I/O
//! 4. [`images`]     : resolve, download, name and rewrite image references
//! 5. [`typeset`]    : the subprocess boundary to the typesetting engine

pub mod fetch;
pub mod images;
pub mod normalize;
pub mod references;
pub mod typeset;

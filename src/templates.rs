//! Named style templates persisted as one flat JSON file.
//!
//! The file is a single object mapping template name to [`StyleOptions`]:
//!
//! ```json
//! { "report": { "margin": "3cm", "fontsize": "12pt", "font": "Georgia" } }
//! ```
//!
//! A missing file is an empty store. Writes go to a sibling temp file which
//! is then renamed over the store, so readers never see a half-written file.
//! There is no locking between concurrent writers.

use crate::config::StyleOptions;
use crate::error::OutlinePdfError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A named [`StyleOptions`] preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTemplate {
    pub name: String,
    #[serde(flatten)]
    pub style: StyleOptions,
}

type TemplateMap = BTreeMap<String, StyleOptions>;

/// File-backed template store.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All templates, sorted by name.
    pub async fn list(&self) -> Result<Vec<StyleTemplate>, OutlinePdfError> {
        let map = self.load().await?;
        Ok(map
            .into_iter()
            .map(|(name, style)| StyleTemplate { name, style })
            .collect())
    }

    /// Names are trimmed the same way `save` trims them.
    pub async fn get(&self, name: &str) -> Result<StyleTemplate, OutlinePdfError> {
        let name = name.trim();
        let mut map = self.load().await?;
        map.remove(name)
            .map(|style| StyleTemplate {
                name: name.to_string(),
                style,
            })
            .ok_or_else(|| OutlinePdfError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    /// Insert or replace a template. Returns `true` if it did not exist.
    pub async fn save(&self, template: &StyleTemplate) -> Result<bool, OutlinePdfError> {
        let name = template.name.trim();
        if name.is_empty() {
            return Err(OutlinePdfError::InvalidConfig(
                "template name must not be empty".into(),
            ));
        }

        let mut map = self.load().await?;
        let created = map.insert(name.to_string(), template.style.clone()).is_none();
        self.store(&map).await?;
        info!(
            "{} template '{}' in {}",
            if created { "Created" } else { "Updated" },
            name,
            self.path.display()
        );
        Ok(created)
    }

    pub async fn delete(&self, name: &str) -> Result<(), OutlinePdfError> {
        let name = name.trim();
        let mut map = self.load().await?;
        if map.remove(name).is_none() {
            return Err(OutlinePdfError::TemplateNotFound {
                name: name.to_string(),
            });
        }
        self.store(&map).await?;
        info!("Deleted template '{}'", name);
        Ok(())
    }

    async fn load(&self) -> Result<TemplateMap, OutlinePdfError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No template store at {}", self.path.display());
                return Ok(TemplateMap::new());
            }
            Err(e) => return Err(OutlinePdfError::fs(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(TemplateMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| OutlinePdfError::CorruptTemplateStore {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }

    async fn store(&self, map: &TemplateMap) -> Result<(), OutlinePdfError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OutlinePdfError::fs(parent, e))?;
        }

        let json = serde_json::to_string_pretty(map)
            .map_err(|e| OutlinePdfError::Internal(format!("serialising templates: {e}")))?;

        // Atomic write: temp file, then rename
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| OutlinePdfError::fs(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| OutlinePdfError::fs(&self.path, e))?;
        Ok(())
    }
}

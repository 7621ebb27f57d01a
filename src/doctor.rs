//! Startup self-check.
//!
//! Verifies the environment before the first real request: Outline
//! connection settings, the typesetting engine, and that the API accepts the
//! token. Configuration and engine problems fail; an API that cannot be
//! reached right now only warns.

use crate::config::{is_http_url, OutlineConfig, ENV_OUTLINE_API_TOKEN, ENV_OUTLINE_URL};
use crate::error::OutlinePdfError;
use crate::outline::OutlineClient;
use crate::pipeline::typeset::PandocEngine;
use serde::Serialize;
use tracing::{info, warn};

/// Shortest API token accepted as plausible.
pub const MIN_TOKEN_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub checks: Vec<Check>,
}

impl Report {
    /// No check failed. Warnings are tolerated.
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }
}

pub fn check_outline_url(url: &str) -> Check {
    const NAME: &str = "outline-url";
    let url = url.trim();
    if url.is_empty() {
        Check::fail(NAME, format!("{ENV_OUTLINE_URL} is not set"))
    } else if !is_http_url(url) {
        Check::fail(NAME, format!("{ENV_OUTLINE_URL} must start with http:// or https://"))
    } else {
        Check::ok(NAME, url)
    }
}

pub fn check_api_token(token: &str) -> Check {
    const NAME: &str = "api-token";
    let len = token.trim().chars().count();
    if len == 0 {
        Check::fail(NAME, format!("{ENV_OUTLINE_API_TOKEN} is not set"))
    } else if len < MIN_TOKEN_LEN {
        Check::fail(
            NAME,
            format!("{ENV_OUTLINE_API_TOKEN} looks too short ({len} chars)"),
        )
    } else {
        Check::ok(NAME, format!("{len} chars"))
    }
}

pub async fn check_engine(engine: &PandocEngine) -> Check {
    const NAME: &str = "engine";
    match engine.version().await {
        Ok(version) => Check::ok(NAME, version),
        Err(e) => Check::fail(NAME, e.to_string()),
    }
}

/// Classify the status `collections.list` answered with.
pub fn classify_api_status(status: u16) -> Check {
    const NAME: &str = "outline-api";
    match status {
        200..=299 => Check::ok(NAME, format!("HTTP {status}")),
        401 | 403 => Check::fail(NAME, format!("token rejected (HTTP {status})")),
        _ => Check::warn(NAME, format!("unexpected HTTP {status}")),
    }
}

pub async fn check_api(config: OutlineConfig) -> Check {
    const NAME: &str = "outline-api";
    let client = match OutlineClient::new(config) {
        Ok(c) => c,
        Err(e) => return Check::fail(NAME, e.to_string()),
    };
    match client.api_status().await {
        Ok(status) => classify_api_status(status),
        Err(OutlinePdfError::ApiUnreachable { reason, .. }) => {
            Check::warn(NAME, format!("not reachable: {reason}"))
        }
        Err(e) => Check::warn(NAME, e.to_string()),
    }
}

/// Run every check. The API is only contacted when URL and token passed.
pub async fn run_checks(url: &str, token: &str, engine: &PandocEngine) -> Report {
    let mut report = Report::default();

    let url_check = check_outline_url(url);
    let token_check = check_api_token(token);
    let can_reach_api = url_check.status == CheckStatus::Ok && token_check.status == CheckStatus::Ok;
    report.checks.push(url_check);
    report.checks.push(token_check);
    report.checks.push(check_engine(engine).await);

    if can_reach_api {
        let api = match OutlineConfig::new(url, token.trim()) {
            Ok(config) => check_api(config).await,
            Err(e) => Check::fail("outline-api", e.to_string()),
        };
        report.checks.push(api);
    }

    for check in &report.checks {
        match check.status {
            CheckStatus::Ok => info!("[ok]   {}: {}", check.name, check.detail),
            CheckStatus::Warn => warn!("[warn] {}: {}", check.name, check.detail),
            CheckStatus::Fail => warn!("[fail] {}: {}", check.name, check.detail),
        }
    }
    report
}

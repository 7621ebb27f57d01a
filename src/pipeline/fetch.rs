//! Image download: the network boundary of the image resolver.
//!
//! [`ImageFetcher`] is the seam between the resolver and the network so the
//! resolver can be exercised against canned responses. [`HttpImageFetcher`]
//! is the production implementation on top of `reqwest`.

use crate::error::{FetchError, OutlinePdfError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Raw bytes of a downloaded image plus the server-declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Value of the `Content-Type` header, or empty when absent.
    pub content_type: String,
}

/// Downloads one image.
///
/// `bearer` is `Some` only for URLs that belong to the trusted origin.
/// Implementations must follow redirects and report every failure as a
/// [`FetchError`]; they never panic on bad input.
pub trait ImageFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<FetchedImage, FetchError>> + Send;
}

/// `reqwest`-backed fetcher with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: u64,
}

/// Largest image body accepted by default (32 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

impl HttpImageFetcher {
    /// Build a client that follows up to 10 redirects and gives up after
    /// `timeout_secs`.
    ///
    /// `reqwest` drops the `Authorization` header when a redirect leaves the
    /// original host, so attachment redirects to object storage do not leak
    /// the token.
    pub fn new(timeout_secs: u64) -> Result<Self, OutlinePdfError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| OutlinePdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Reject bodies larger than `max_bytes`.
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, url: &str, size: u64) -> FetchError {
        FetchError::Body {
            url: url.to_string(),
            reason: format!("body of {size} bytes exceeds limit of {} bytes", self.max_bytes),
        }
    }
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str, bearer: Option<&str>) -> Result<FetchedImage, FetchError> {
        debug!("GET {} (auth: {})", url, bearer.is_some());

        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let mut response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(self.too_large(url, len));
            }
        }

        // Chunked responses carry no length up front; enforce the cap while reading.
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                        secs: self.timeout_secs,
                    }
                } else {
                    FetchError::Body {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;
            let Some(chunk) = chunk else { break };
            let size = (bytes.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(self.too_large(url, size));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes ({}) from {}", bytes.len(), content_type, url);

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let fetcher = HttpImageFetcher::new(2).unwrap();
        // Port 9 on loopback: connection refused on any sane test machine.
        let err = fetcher
            .fetch("http://127.0.0.1:9/image.png", None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::Network { .. } | FetchError::Timeout { .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_error_not_panic() {
        let fetcher = HttpImageFetcher::new(2).unwrap();
        assert!(fetcher.fetch("http://", None).await.is_err());
    }
}

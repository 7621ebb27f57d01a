//! Integration tests for outline-pdf.
//!
//! The renderer is exercised end to end against a stub image fetcher and a
//! stub typesetting engine, so no network and no pandoc installation are
//! needed. The HTTP-facing parts (`HttpImageFetcher`, `OutlineClient`) are
//! tested against a one-shot TCP responder on localhost.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use outline_pdf::doctor::{self, CheckStatus};
use outline_pdf::{
    FetchError, FetchedImage, HttpImageFetcher, ImageFetcher, OutlineClient, OutlineConfig,
    OutlinePdfError, RenderConfig, RenderRequest, Renderer, StyleOptions, TypesetEngine,
    TypesetJob,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const ORIGIN: &str = "https://wiki.example.com";
const TOKEN: &str = "ol_api_0123456789";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nstub";

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
struct StubFetcher {
    responses: Arc<HashMap<String, (Vec<u8>, String)>>,
    calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl StubFetcher {
    fn with(responses: &[(&str, &[u8], &str)]) -> Self {
        let map = responses
            .iter()
            .map(|(url, bytes, ct)| (url.to_string(), (bytes.to_vec(), ct.to_string())))
            .collect();
        Self {
            responses: Arc::new(map),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageFetcher for StubFetcher {
    async fn fetch(&self, url: &str, bearer: Option<&str>) -> Result<FetchedImage, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), bearer.map(str::to_string)));
        match self.responses.get(url) {
            Some((bytes, ct)) => Ok(FetchedImage {
                bytes: bytes.clone(),
                content_type: ct.clone(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Engine stub: records every job and writes a fake PDF unless told to fail.
#[derive(Default, Clone)]
struct StubEngine {
    jobs: Arc<Mutex<Vec<TypesetJob>>>,
    fail: bool,
}

impl StubEngine {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn jobs(&self) -> Vec<TypesetJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl TypesetEngine for StubEngine {
    async fn typeset(&self, job: &TypesetJob) -> Result<(), OutlinePdfError> {
        self.jobs.lock().unwrap().push(job.clone());
        let input = job.working_dir.join(&job.input);
        assert!(input.exists(), "engine input {} missing", input.display());

        let output = job.working_dir.join(&job.output);
        if self.fail {
            // Partial output the renderer has to clean up.
            tokio::fs::write(&output, b"%PDF-partial").await.unwrap();
            return Err(OutlinePdfError::Internal("stub engine failure".into()));
        }
        tokio::fs::write(&output, b"%PDF-1.4 stub").await.unwrap();
        Ok(())
    }
}

fn config(output_dir: &Path) -> RenderConfig {
    RenderConfig::builder()
        .origin_url(ORIGIN)
        .api_token(TOKEN)
        .output_dir(output_dir)
        .build()
        .unwrap()
}

fn georgia() -> StyleOptions {
    StyleOptions::new("3cm", "12pt", "Georgia")
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Accept one connection, answer with `response`, hand back the raw request.
async fn serve_once(response: Vec<u8>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });
    (base, handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

// ── Image resolution ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_attachment_is_downloaded_and_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://wiki.example.com/api/attachments.redirect?id=abc123";
    let fetcher = StubFetcher::with(&[(url, PNG_BYTES, "image/png")]);
    let renderer = Renderer::with_parts(config(dir.path()), fetcher.clone(), StubEngine::default());

    let (out, stats) = renderer
        .normalize_and_resolve("# Title\n![pic](/api/attachments.redirect?id=abc123)")
        .await
        .unwrap();

    assert!(out.contains("![pic](images/abc123.png)"), "{out}");
    let written = std::fs::read(dir.path().join("images").join("abc123.png")).unwrap();
    assert_eq!(written, PNG_BYTES);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(fetcher.calls(), vec![(url.to_string(), Some(TOKEN.to_string()))]);
}

#[tokio::test]
async fn test_missing_image_keeps_reference() {
    let dir = tempfile::tempdir().unwrap();
    let renderer =
        Renderer::with_parts(config(dir.path()), StubFetcher::default(), StubEngine::default());

    let input = "# Title\n\n![pic](/api/attachments.redirect?id=gone)\n";
    let (out, stats) = renderer.normalize_and_resolve(input).await.unwrap();

    assert_eq!(out, input);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.downloaded, 0);
    assert!(!dir.path().join("images").join("gone.png").exists());
}

#[tokio::test]
async fn test_duplicate_identifier_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://wiki.example.com/api/attachments.redirect?id=same";
    let fetcher = StubFetcher::with(&[(url, PNG_BYTES, "image/png")]);
    let renderer = Renderer::with_parts(config(dir.path()), fetcher.clone(), StubEngine::default());

    let input = "![a](/api/attachments.redirect?id=same)\n\n\
                 <img alt=\"b\" src=\"https://wiki.example.com/api/attachments.redirect?id=same\" width=\"200\">";
    let (out, stats) = renderer.normalize_and_resolve(input).await.unwrap();

    assert_eq!(out.matches("images/same.png").count(), 2, "{out}");
    assert!(out.contains(r#"<img alt="b" src="images/same.png" width="200">"#), "{out}");
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(file_names(&dir.path().join("images")), vec!["same.png"]);
}

#[tokio::test]
async fn test_foreign_images_fetched_without_token() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://cdn.example.org/pics/diagram";
    let fetcher = StubFetcher::with(&[(url, &b"GIF89a"[..], "image/gif")]);
    let renderer = Renderer::with_parts(config(dir.path()), fetcher.clone(), StubEngine::default());

    let (out, _) = renderer
        .normalize_and_resolve(&format!("![d]({url} \"Diagram\")"))
        .await
        .unwrap();

    assert_eq!(out, "![d](images/diagram.gif)");
    assert_eq!(fetcher.calls(), vec![(url.to_string(), None)]);
}

#[tokio::test]
async fn test_text_without_images_is_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let renderer =
        Renderer::with_parts(config(dir.path()), StubFetcher::default(), StubEngine::default());

    let input = "# Plain\n\nNo pictures, only [a link](https://example.com).\n";
    let (out, _) = renderer.normalize_and_resolve(input).await.unwrap();
    assert_eq!(out, input);
    assert!(!dir.path().join("images").exists());
}

// ── Rendering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_render_passes_style_to_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::default();
    let renderer = Renderer::with_parts(config(dir.path()), StubFetcher::default(), engine.clone());

    let result = renderer
        .render("# Hello\n\nWorld", "Quartalsbericht Übersicht", &georgia())
        .await
        .unwrap();

    assert_eq!(result.filename, "Quartalsbericht_Ubersicht.pdf");
    assert!(result.pdf_path.is_absolute());
    assert!(result.pdf_path.extension().is_some_and(|e| e == "pdf"));
    assert!(result
        .pdf_path
        .starts_with(std::fs::canonicalize(dir.path()).unwrap()));
    assert_eq!(std::fs::read(&result.pdf_path).unwrap(), b"%PDF-1.4 stub");

    let jobs = engine.jobs();
    assert_eq!(jobs.len(), 1);
    let values: Vec<&str> = jobs[0].variables.iter().map(|(_, v)| v.as_str()).collect();
    assert!(values.iter().any(|v| v.contains("3cm")));
    assert!(values.contains(&"12pt"));
    assert!(values.contains(&"Georgia"));
    assert_eq!(jobs[0].variable("title"), Some("Quartalsbericht Übersicht"));
    assert_eq!(jobs[0].toc_depth, Some(3));
    assert!(jobs[0].number_sections);

    // Only the published PDF remains; the temporary markdown is gone.
    assert_eq!(file_names(dir.path()), vec!["Quartalsbericht_Ubersicht.pdf"]);
}

#[tokio::test]
async fn test_render_request_uses_default_style() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::default();
    let renderer = Renderer::with_parts(config(dir.path()), StubFetcher::default(), engine.clone());

    let request: RenderRequest =
        serde_json::from_str(r##"{"document_id": null, "title": "!!!", "markdown": "# x"}"##).unwrap();
    let result = renderer.render_request(&request).await.unwrap();

    assert_eq!(result.filename, "dokument.pdf");
    let job = &engine.jobs()[0];
    assert_eq!(job.variable("geometry"), Some("margin=2.5cm"));
    assert_eq!(job.variable("fontsize"), Some("11pt"));
    assert_eq!(job.variable("mainfont"), Some("Arial"));
}

#[tokio::test]
async fn test_engine_failure_leaves_no_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let renderer =
        Renderer::with_parts(config(dir.path()), StubFetcher::default(), StubEngine::failing());

    let err = renderer.render("# x", "Report", &georgia()).await.unwrap_err();
    assert!(matches!(err, OutlinePdfError::Internal(_)));
    assert!(file_names(dir.path()).is_empty(), "{:?}", file_names(dir.path()));
}

#[tokio::test]
async fn test_concurrent_renders_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::default();
    let renderer = Renderer::with_parts(config(dir.path()), StubFetcher::default(), engine.clone());
    let style = georgia();

    let (a, b) = tokio::join!(
        renderer.render("# A", "Alpha", &style),
        renderer.render("# B", "Beta", &style),
    );
    a.unwrap();
    b.unwrap();

    let jobs = engine.jobs();
    assert_eq!(jobs.len(), 2);
    assert_ne!(jobs[0].input, jobs[1].input);
    assert_ne!(jobs[0].output, jobs[1].output);
    assert_eq!(file_names(dir.path()), vec!["Alpha.pdf", "Beta.pdf"]);
}

// ── HTTP boundaries ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_fetcher_sends_bearer_and_reads_content_type() {
    let (base, server) = serve_once(http_response("200 OK", "image/png", PNG_BYTES)).await;
    let fetcher = HttpImageFetcher::new(5).unwrap();

    let image = fetcher
        .fetch(&format!("{base}/api/attachments.redirect?id=abc"), Some(TOKEN))
        .await
        .unwrap();

    assert_eq!(image.bytes, PNG_BYTES);
    assert_eq!(image.content_type, "image/png");
    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /api/attachments.redirect?id=abc"));
    assert!(request.contains(&format!("authorization: bearer {}", TOKEN.to_lowercase())));
}

#[tokio::test]
async fn test_http_fetcher_reports_status() {
    let (base, server) = serve_once(http_response("404 Not Found", "text/plain", b"nope")).await;
    let fetcher = HttpImageFetcher::new(5).unwrap();

    let err = fetcher.fetch(&format!("{base}/x.png"), None).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }), "{err:?}");
    let request = server.await.unwrap().to_lowercase();
    assert!(!request.contains("authorization"));
}

#[tokio::test]
async fn test_http_fetcher_rejects_oversized_body() {
    let (base, _server) = serve_once(http_response("200 OK", "image/png", &[0u8; 64])).await;
    let fetcher = HttpImageFetcher::new(5).unwrap().max_bytes(16);

    let err = fetcher.fetch(&format!("{base}/big.png"), None).await.unwrap_err();
    assert!(matches!(err, FetchError::Body { .. }), "{err:?}");
}

#[tokio::test]
async fn test_http_fetcher_caps_chunked_body() {
    let mut response =
        b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
            .to_vec();
    for _ in 0..4 {
        response.extend_from_slice(b"10\r\n");
        response.extend_from_slice(&[7u8; 16]);
        response.extend_from_slice(b"\r\n");
    }
    response.extend_from_slice(b"0\r\n\r\n");
    let (base, _server) = serve_once(response).await;
    let fetcher = HttpImageFetcher::new(5).unwrap().max_bytes(40);

    let err = fetcher.fetch(&format!("{base}/stream.png"), None).await.unwrap_err();
    assert!(matches!(err, FetchError::Body { .. }), "{err:?}");
}

#[tokio::test]
async fn test_outline_client_document_info() {
    let body = br##"{"data":{"id":"3283f2f9-c0f7-4575-b5d9-76d5aa4befcb","title":"Handbuch","text":"# Hi"}}"##;
    let (base, server) = serve_once(http_response("200 OK", "application/json", body)).await;
    let client = OutlineClient::new(OutlineConfig::new(&base, TOKEN).unwrap()).unwrap();

    let doc = client
        .document(" 3283f2f9-c0f7-4575-b5d9-76d5aa4befcb ")
        .await
        .unwrap();
    assert_eq!(doc.title, "Handbuch");
    assert_eq!(doc.text, "# Hi");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/documents.info"));
    assert!(request.contains(r#""id":"3283f2f9-c0f7-4575-b5d9-76d5aa4befcb""#));
    assert!(request
        .to_lowercase()
        .contains(&format!("authorization: bearer {}", TOKEN.to_lowercase())));
}

#[tokio::test]
async fn test_outline_client_api_error() {
    let (base, _server) = serve_once(http_response(
        "401 Unauthorized",
        "application/json",
        br#"{"ok":false,"error":"authentication_required"}"#,
    ))
    .await;
    let client = OutlineClient::new(OutlineConfig::new(&base, TOKEN).unwrap()).unwrap();

    let err = client.collections().await.unwrap_err();
    match err {
        OutlinePdfError::Api { method, status, detail } => {
            assert_eq!(method, "collections.list");
            assert_eq!(status, 401);
            assert!(detail.contains("authentication_required"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_render_document_from_outline() {
    let body = br##"{"data":{"id":"3283f2f9-c0f7-4575-b5d9-76d5aa4befcb","title":"","text":"# Body"}}"##;
    let (base, _server) = serve_once(http_response("200 OK", "application/json", body)).await;
    let client = OutlineClient::new(OutlineConfig::new(&base, TOKEN).unwrap()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::default();
    let renderer = Renderer::with_parts(config(dir.path()), StubFetcher::default(), engine.clone());

    let result = renderer
        .render_document(&client, "3283f2f9-c0f7-4575-b5d9-76d5aa4befcb", &georgia())
        .await
        .unwrap();
    assert_eq!(result.filename, "Dokument.pdf");
    assert_eq!(engine.jobs()[0].variable("title"), Some("Dokument"));
}

#[tokio::test]
async fn test_doctor_rejected_token_fails() {
    let (base, _server) = serve_once(http_response("403 Forbidden", "application/json", b"{}")).await;
    let check = doctor::check_api(OutlineConfig::new(&base, TOKEN).unwrap()).await;
    assert_eq!(check.status, CheckStatus::Fail);
}

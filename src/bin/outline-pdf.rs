//! CLI binary for outline-pdf.
//!
//! A thin shim over the library crate: maps flags and environment to
//! `RenderConfig` / `OutlineConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use outline_pdf::doctor::{self, CheckStatus};
use outline_pdf::{
    validate_proxy_url, HttpImageFetcher, ImageFetcher, OutlineClient, OutlineConfig,
    PandocEngine, RenderConfig, RenderResult, Renderer, StyleOptions, StyleTemplate,
    TemplateStore,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Check the environment first
  outline-pdf doctor

  # Browse
  outline-pdf collections
  outline-pdf documents --collection 9f0b3a3e-6d1c-4f55-9a71-0d5e9b0a1c22
  outline-pdf search "quarterly report"

  # Render a document with custom styling
  outline-pdf render 3283f2f9-c0f7-4575-b5d9-76d5aa4befcb --margin 3cm --fontsize 12pt --font Georgia

  # Save a style once, reuse it
  outline-pdf templates save report --margin 3cm --fontsize 12pt --font Georgia
  outline-pdf render 3283f2f9-c0f7-4575-b5d9-76d5aa4befcb --template report

  # Render a local markdown file
  outline-pdf render-file notes.md --title "Meeting notes"

ENVIRONMENT VARIABLES:
  OUTLINE_URL              Base URL of the Outline instance
  OUTLINE_API_TOKEN        API token (Settings → API)
  OUTPUT_DIR               Where PDFs and images/ are written (default: output)
  OUTLINE_PDF_TEMPLATES    Template store file (default: templates.json)
  OUTLINE_PDF_PANDOC       pandoc binary (default: pandoc)
  OUTLINE_PDF_ENGINE       pandoc --pdf-engine (default: xelatex)
  RUST_LOG                 Overrides -v / -q log filtering
"#;

/// Render Outline wiki documents as styled PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "outline-pdf",
    version,
    about = "Render Outline wiki documents as styled PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Base URL of the Outline instance.
    #[arg(long, global = true, env = "OUTLINE_URL", default_value = "")]
    url: String,

    /// Outline API token.
    #[arg(long, global = true, env = "OUTLINE_API_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    /// Output directory for PDFs and downloaded images.
    #[arg(long, global = true, env = "OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Style template store.
    #[arg(long, global = true, env = "OUTLINE_PDF_TEMPLATES", default_value = "templates.json")]
    templates: PathBuf,

    /// Print structured JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OUTLINE_PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OUTLINE_PDF_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List collections.
    Collections,
    /// List documents, optionally of one collection.
    Documents {
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print a document's markdown.
    Show { id: String },
    /// Full-text search.
    Search { query: String },
    /// Fetch a document from Outline and render it to PDF.
    Render {
        id: String,
        #[command(flatten)]
        style: StyleArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Render a local markdown file to PDF.
    RenderFile {
        path: PathBuf,
        /// Document title; defaults to the file stem.
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        style: StyleArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Download one attachment of the Outline instance.
    Image {
        /// Absolute URL under OUTLINE_URL or a relative /api/ path.
        url: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Manage named style templates.
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Check configuration, pandoc and API access.
    Doctor {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    List,
    Show { name: String },
    /// Create or replace a template; unset fields use the defaults.
    Save {
        name: String,
        #[arg(long)]
        margin: Option<String>,
        #[arg(long)]
        fontsize: Option<String>,
        #[arg(long)]
        font: Option<String>,
    },
    Delete { name: String },
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Start from a saved template.
    #[arg(long)]
    template: Option<String>,
    /// Page margin, e.g. 2.5cm.
    #[arg(long)]
    margin: Option<String>,
    /// Font size, e.g. 11pt.
    #[arg(long)]
    fontsize: Option<String>,
    /// Main font family.
    #[arg(long)]
    font: Option<String>,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// pandoc binary.
    #[arg(long, env = "OUTLINE_PDF_PANDOC", default_value = "pandoc")]
    pandoc: String,
    /// pandoc --pdf-engine.
    #[arg(long, env = "OUTLINE_PDF_ENGINE", default_value = "xelatex")]
    pdf_engine: String,
    /// Label of the table of contents.
    #[arg(long, default_value = "Inhaltsverzeichnis")]
    toc_title: String,
    /// Heading depth of the table of contents (1–6).
    #[arg(long, default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    toc_depth: u8,
    /// Do not number sections.
    #[arg(long)]
    no_number_sections: bool,
    /// Concurrent image downloads.
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,
    /// Per-image download timeout in seconds.
    #[arg(long, default_value_t = 15)]
    fetch_timeout: u64,
    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Collections => {
            let collections = client(&cli)?.collections().await.context("Listing collections failed")?;
            if cli.json {
                return print_json(&collections);
            }
            for c in &collections {
                println!("{}  {}", dim(&c.id), bold(&c.name));
            }
        }
        Command::Documents { collection } => {
            let documents = client(&cli)?
                .documents(collection.as_deref())
                .await
                .context("Listing documents failed")?;
            if cli.json {
                return print_json(&documents);
            }
            for d in &documents {
                println!(
                    "{}  {}  {}",
                    dim(&d.id),
                    bold(&d.title),
                    dim(d.updated_at.as_deref().unwrap_or(""))
                );
            }
        }
        Command::Show { id } => {
            let document = client(&cli)?.document(id).await.context("Loading document failed")?;
            if cli.json {
                return print_json(&document);
            }
            let mut out = io::stdout().lock();
            out.write_all(document.text.as_bytes())
                .context("Failed to write to stdout")?;
            if !document.text.ends_with('\n') {
                out.write_all(b"\n").ok();
            }
        }
        Command::Search { query } => {
            let hits = client(&cli)?.search(query).await.context("Search failed")?;
            if cli.json {
                return print_json(&hits);
            }
            for hit in &hits {
                println!("{}  {}", dim(&hit.document.id), bold(&hit.document.title));
                if let Some(ref context) = hit.context {
                    println!("    {}", dim(context));
                }
            }
        }
        Command::Render { id, style, engine } => {
            let style = resolve_style(&cli, style).await?;
            let renderer = Renderer::new(render_config(&cli, engine)?).context("Invalid configuration")?;
            let client = client(&cli)?;

            let spinner = spinner(&cli, engine, "Rendering document…");
            let result = renderer.render_document(&client, id, &style).await;
            finish(spinner);
            report_render(&cli, result.context("Rendering failed")?)?;
        }
        Command::RenderFile {
            path,
            title,
            style,
            engine,
        } => {
            let markdown = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let title = title.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let style = resolve_style(&cli, style).await?;
            let renderer = Renderer::new(render_config(&cli, engine)?).context("Invalid configuration")?;

            let spinner = spinner(&cli, engine, "Rendering file…");
            let result = renderer.render(&markdown, &title, &style).await;
            finish(spinner);
            report_render(&cli, result.context("Rendering failed")?)?;
        }
        Command::Image { url, output } => {
            let origin = cli.url.trim().trim_end_matches('/');
            let absolute = validate_proxy_url(url, origin).context("URL not allowed")?;
            let fetcher = HttpImageFetcher::new(15)?;
            let bearer = Some(cli.token.as_str()).filter(|t| !t.is_empty());
            let image = fetcher
                .fetch(&absolute, bearer)
                .await
                .with_context(|| format!("Downloading {absolute} failed"))?;
            tokio::fs::write(output, &image.bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} bytes ({})  →  {}",
                    green("✔"),
                    image.bytes.len(),
                    image.content_type,
                    bold(&output.display().to_string())
                );
            }
        }
        Command::Templates { action } => run_templates(&cli, action).await?,
        Command::Doctor { engine } => {
            let pandoc = PandocEngine::new(&engine.pandoc, &engine.pdf_engine);
            let report = doctor::run_checks(&cli.url, &cli.token, &pandoc).await;
            if cli.json {
                print_json(&report)?;
            } else {
                for check in &report.checks {
                    let mark = match check.status {
                        CheckStatus::Ok => green("✔"),
                        CheckStatus::Warn => yellow("⚠"),
                        CheckStatus::Fail => red("✘"),
                    };
                    println!("{mark} {:<12} {}", check.name, dim(&check.detail));
                }
            }
            if !report.all_ok() {
                bail!("{} check(s) failed", report.failures().count());
            }
        }
    }

    Ok(())
}

fn client(cli: &Cli) -> Result<OutlineClient> {
    let config = OutlineConfig::new(&cli.url, &cli.token).context("Outline connection not configured")?;
    Ok(OutlineClient::new(config)?)
}

/// Map CLI args to `RenderConfig`.
fn render_config(cli: &Cli, engine: &EngineArgs) -> Result<RenderConfig> {
    RenderConfig::builder()
        .origin_url(cli.url.as_str())
        .api_token(cli.token.as_str())
        .output_dir(&cli.output_dir)
        .engine_program(engine.pandoc.as_str())
        .pdf_engine(engine.pdf_engine.as_str())
        .toc_title(engine.toc_title.as_str())
        .toc_depth(engine.toc_depth)
        .number_sections(!engine.no_number_sections)
        .concurrency(engine.concurrency)
        .fetch_timeout_secs(engine.fetch_timeout)
        .build()
        .context("Invalid configuration")
}

/// Template (or defaults) with the explicit flags on top.
async fn resolve_style(cli: &Cli, args: &StyleArgs) -> Result<StyleOptions> {
    let base = match args.template {
        Some(ref name) => {
            TemplateStore::new(&cli.templates)
                .get(name)
                .await
                .with_context(|| format!("Loading template '{name}' failed"))?
                .style
        }
        None => StyleOptions::default(),
    };
    Ok(base.with_overrides(
        args.margin.as_deref(),
        args.fontsize.as_deref(),
        args.font.as_deref(),
    ))
}

async fn run_templates(cli: &Cli, action: &TemplateAction) -> Result<()> {
    let store = TemplateStore::new(&cli.templates);
    match action {
        TemplateAction::List => {
            let templates = store.list().await?;
            if cli.json {
                return print_json(&templates);
            }
            if templates.is_empty() && !cli.quiet {
                eprintln!("{}", dim(&format!("no templates in {}", store.path().display())));
            }
            for t in &templates {
                println!(
                    "{:<16} margin={} fontsize={} font={}",
                    bold(&t.name),
                    t.style.margin,
                    t.style.fontsize,
                    t.style.font
                );
            }
        }
        TemplateAction::Show { name } => {
            let t = store.get(name).await?;
            if cli.json {
                return print_json(&t);
            }
            println!("margin:   {}", t.style.margin);
            println!("fontsize: {}", t.style.fontsize);
            println!("font:     {}", t.style.font);
        }
        TemplateAction::Save {
            name,
            margin,
            fontsize,
            font,
        } => {
            let template = StyleTemplate {
                name: name.clone(),
                style: StyleOptions::default().with_overrides(
                    margin.as_deref(),
                    fontsize.as_deref(),
                    font.as_deref(),
                ),
            };
            let created = store.save(&template).await?;
            if !cli.quiet {
                eprintln!(
                    "{} {} template '{}'",
                    green("✔"),
                    if created { "created" } else { "updated" },
                    name
                );
            }
        }
        TemplateAction::Delete { name } => {
            store.delete(name).await?;
            if !cli.quiet {
                eprintln!("{} deleted template '{}'", green("✔"), name);
            }
        }
    }
    Ok(())
}

fn spinner(cli: &Cli, engine: &EngineArgs, message: &'static str) -> Option<ProgressBar> {
    if cli.quiet || cli.json || engine.no_progress {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

fn report_render(cli: &Cli, result: RenderResult) -> Result<()> {
    if cli.json {
        return print_json(&result);
    }
    let images = &result.stats.images;
    if !cli.quiet {
        eprintln!(
            "{}  {} images ({} failed)  {}ms",
            if images.failed == 0 { green("✔") } else { yellow("⚠") },
            images.downloaded,
            images.failed,
            result.stats.total_duration_ms,
        );
    }
    println!("{}", result.pdf_path.display());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

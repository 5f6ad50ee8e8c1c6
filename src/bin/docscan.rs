//! CLI binary for docscan-ocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OcrConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docscan_ocr::config::{DEFAULT_MISTRAL_BASE_URL, DEFAULT_MISTRAL_MODEL, DEFAULT_SERVICE_URL};
use docscan_ocr::pipeline::input::extract_urls;
use docscan_ocr::{
    process_batch, process_to_session, validate_api_key, BatchOutput, BatchProgressCallback,
    JsonArtifact, MetadataPrecedence, NormalizeStep, Normalizer, OcrBackend, OcrConfig,
    PageDelimiter, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document. Documents may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time and display label per input index.
    started: Mutex<HashMap<usize, (Instant, String)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Remove the index's start entry, returning its label and elapsed seconds.
    fn finish_item(&self, index: usize) -> (String, f64) {
        self.started
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|(t, label)| (label, t.elapsed().as_secs_f64()))
            .unwrap_or_else(|| (format!("#{}", index + 1), 0.0))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {total} document(s) to OCR…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, input: &str) {
        let label = short_label(input);
        self.bar.set_message(label.clone());
        if let Ok(mut m) = self.started.lock() {
            m.insert(index, (Instant::now(), label));
        }
    }

    fn on_item_complete(&self, index: usize, total: usize, text_len: usize) {
        let (label, secs) = self.finish_item(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32}  {}  {}",
            green("✓"),
            index + 1,
            total,
            label,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let (label, secs) = self.finish_item(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32}  {}  {}",
            red("✗"),
            index + 1,
            total,
            label,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} document(s) processed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents processed  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

/// Last path or URL segment, clipped for the log column.
fn short_label(input: &str) -> String {
    let name = input
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input);
    if name.chars().count() > 32 {
        format!("{}\u{2026}", name.chars().take(31).collect::<String>())
    } else {
        name.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a scanned PDF through the OCR microservice, print cleaned text
  docscan scan.pdf

  # Several inputs, Markdown output
  docscan --format md page1.png page2.jpg https://example.org/decree.pdf

  # Pick up every PDF/image link pasted into a text file
  docscan --urls-from links.txt --format json

  # Use the Mistral OCR API directly and keep the artifacts
  docscan --backend mistral --save --output-dir ./data contract.pdf

  # Check an API key without processing anything
  docscan --backend mistral --validate-key

OUTPUT FORMATS:
  txt    cleaned text (default)
  md     backend Markdown, or the cleaned text in a ```txt fence
  json   {"text", "markdown", "raw_json"} per document

SESSION ARTIFACTS (--save):
  <output-dir>/<YYYYMMDDTHHMMSSZ>_<id>/<name>.txt
                                     /<name>.md
                                     /<name>.json   layout set by --json-layout

ENVIRONMENT VARIABLES:
  OCR_SERVICE_URL     OCR microservice endpoint (service backend)
  MISTRAL_API_KEY     API key, sent to either backend
  MISTRAL_BASE_URL    Mistral API base URL
  MISTRAL_OCR_MODEL   Mistral OCR model ID
  OUTPUT_DIR          Root directory for --save sessions
  RUST_LOG            Override log filtering (e.g. docscan_ocr=debug)
"#;

/// OCR PDFs and images into cleaned text, Markdown and JSON.
#[derive(Parser, Debug)]
#[command(
    name = "docscan",
    version,
    about = "OCR PDFs and images into cleaned text, Markdown and JSON",
    long_about = "Send local files or URLs (PDF, PNG, JPEG) to an OCR engine, normalise the \
extracted text and print or save it as plain text, Markdown and JSON. Works with a self-hosted \
OCR microservice or the Mistral OCR API.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Read PDF/image URLs out of a free-text file.
    #[arg(long)]
    urls_from: Option<PathBuf>,

    /// OCR backend.
    #[arg(long, env = "DOCSCAN_BACKEND", value_enum, default_value = "service")]
    backend: BackendArg,

    /// OCR microservice endpoint.
    #[arg(long, env = "OCR_SERVICE_URL", default_value = DEFAULT_SERVICE_URL)]
    service_url: String,

    /// Mistral API base URL.
    #[arg(long, env = "MISTRAL_BASE_URL", default_value = DEFAULT_MISTRAL_BASE_URL)]
    mistral_url: String,

    /// API key for the backend.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Mistral OCR model ID.
    #[arg(long, env = "MISTRAL_OCR_MODEL", default_value = DEFAULT_MISTRAL_MODEL)]
    model: String,

    /// What to print on stdout.
    #[arg(short, long, value_enum, default_value = "txt")]
    format: FormatArg,

    /// Write txt/md/json artifacts into a new session directory.
    #[arg(long)]
    save: bool,

    /// Root directory for session directories.
    #[arg(long, env = "OUTPUT_DIR", default_value = "data")]
    output_dir: PathBuf,

    /// Layout of the saved JSON artifact.
    #[arg(long, value_enum, default_value = "full")]
    json_layout: JsonLayoutArg,

    /// When to insert `--- Page i/N ---` markers between pages.
    #[arg(long, value_enum, default_value = "multi")]
    page_delimiter: DelimiterArg,

    /// Which side wins when request metadata clashes with backend metadata.
    #[arg(long, value_enum, default_value = "backend")]
    precedence: PrecedenceArg,

    /// Skip the blank lines inserted around headers and clauses.
    #[arg(long)]
    no_structure: bool,

    /// Number of documents processed at once.
    #[arg(short, long, env = "DOCSCAN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// OCR request timeout in seconds.
    #[arg(long, env = "DOCSCAN_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Check the API key against the backend and exit.
    #[arg(long)]
    validate_key: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long)]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCSCAN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Service,
    Mistral,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Txt,
    Md,
    Json,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum JsonLayoutArg {
    Full,
    Text,
    Result,
}

impl From<JsonLayoutArg> for JsonArtifact {
    fn from(v: JsonLayoutArg) -> Self {
        match v {
            JsonLayoutArg::Full => JsonArtifact::Full,
            JsonLayoutArg::Text => JsonArtifact::Text,
            JsonLayoutArg::Result => JsonArtifact::Result,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DelimiterArg {
    Never,
    Multi,
    Always,
}

impl From<DelimiterArg> for PageDelimiter {
    fn from(v: DelimiterArg) -> Self {
        match v {
            DelimiterArg::Never => PageDelimiter::Never,
            DelimiterArg::Multi => PageDelimiter::MultiPageOnly,
            DelimiterArg::Always => PageDelimiter::Always,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PrecedenceArg {
    Backend,
    Request,
}

impl From<PrecedenceArg> for MetadataPrecedence {
    fn from(v: PrecedenceArg) -> Self {
        match v {
            PrecedenceArg::Backend => MetadataPrecedence::BackendWins,
            PrecedenceArg::Request => MetadataPrecedence::RequestWins,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.validate_key;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Key validation mode ──────────────────────────────────────────────
    if cli.validate_key {
        let key = cli
            .api_key
            .as_deref()
            .context("--validate-key needs --api-key or MISTRAL_API_KEY")?;
        let valid = validate_api_key(&config, key)
            .await
            .context("Key validation failed")?;
        if !valid {
            anyhow::bail!("API key rejected by the {} backend", config.backend.name());
        }
        if !cli.quiet {
            eprintln!("{} API key accepted", green("✔"));
        }
        return Ok(());
    }

    let inputs = collect_inputs(&cli).await?;
    if inputs.is_empty() {
        anyhow::bail!("No inputs: pass file paths or URLs, or --urls-from FILE");
    }

    // ── Run OCR ──────────────────────────────────────────────────────────
    let batch = if cli.save {
        let saved = process_to_session(&inputs, &config)
            .await
            .context("OCR failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} document(s) saved  →  {}",
                green("✔"),
                saved.artifacts.len(),
                bold(&saved.dir.display().to_string()),
            );
            for a in &saved.artifacts {
                eprintln!("   {}", dim(&a.json.display().to_string()));
            }
        }
        saved.batch
    } else {
        process_batch(&inputs, &config)
            .await
            .context("OCR failed")?
    };

    print_batch(&batch, cli.format)?;

    // Per-item failures were already printed by the progress callback.
    if !cli.quiet && !show_progress {
        eprintln!(
            "Processed {}/{} documents in {}ms",
            batch.stats.succeeded, batch.stats.total, batch.stats.duration_ms
        );
        for err in batch.errors() {
            eprintln!("  {} {}", red("✗"), err);
        }
    }

    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let backend = match cli.backend {
        BackendArg::Service => OcrBackend::service(cli.service_url.clone()),
        BackendArg::Mistral => OcrBackend::Mistral {
            base_url: cli.mistral_url.clone(),
            model: cli.model.clone(),
        },
    };

    let mut normalizer = Normalizer::builder();
    if cli.no_structure {
        normalizer = normalizer.without_step(NormalizeStep::Structure);
    }

    let mut builder = OcrConfig::builder()
        .backend(backend)
        .request_timeout_secs(cli.timeout)
        .download_timeout_secs(cli.download_timeout)
        .concurrency(cli.concurrency)
        .page_delimiter(cli.page_delimiter.into())
        .metadata_precedence(cli.precedence.into())
        .normalizer(normalizer.build().context("Invalid normaliser settings")?)
        .output_dir(cli.output_dir.clone())
        .json_artifact(cli.json_layout.into());

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Positional inputs followed by URLs found in `--urls-from`.
async fn collect_inputs(cli: &Cli) -> Result<Vec<String>> {
    let mut inputs: Vec<String> = cli
        .inputs
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if let Some(ref path) = cli.urls_from {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read URL list from {:?}", path))?;
        for url in extract_urls(&text) {
            if !inputs.contains(&url) {
                inputs.push(url);
            }
        }
    }

    Ok(inputs)
}

fn print_batch(batch: &BatchOutput, format: FormatArg) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if format == FormatArg::Json {
        let docs: Vec<_> = batch
            .documents()
            .map(|d| {
                json!({
                    "input": d.input,
                    "text": d.response.text,
                    "markdown": d.response.markdown,
                    "raw_json": d.response.raw_json,
                })
            })
            .collect();
        let value = if docs.len() == 1 {
            docs.into_iter().next().unwrap_or_default()
        } else {
            serde_json::Value::Array(docs)
        };
        let out = serde_json::to_string_pretty(&value).context("Failed to serialise output")?;
        writeln!(handle, "{out}").context("Failed to write to stdout")?;
        return Ok(());
    }

    let many = batch.stats.succeeded > 1;
    for (i, doc) in batch.documents().enumerate() {
        if many {
            if i > 0 {
                writeln!(handle).context("Failed to write to stdout")?;
            }
            writeln!(handle, "==> {} <==", doc.input).context("Failed to write to stdout")?;
        }
        let body = match format {
            FormatArg::Md => &doc.response.markdown,
            _ => &doc.response.text,
        };
        handle
            .write_all(body.as_bytes())
            .context("Failed to write to stdout")?;
        if !body.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

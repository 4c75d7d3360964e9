//! CLI binary for edgequake-statements.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the result JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_statements::{
    extract, write_result, BackendKind, ExtractionConfig, ExtractionProgressCallback,
    ExtractionStatus, PageSelection, ProgressCallback, TesseractOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit code when the statement yielded nothing usable.
const EXIT_FAILED: i32 = 2;

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
/// Pages complete out of order, so start times are tracked per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising statement…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, holdings: usize) {
        let secs = self.page_elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{holdings:>3} holdings")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.page_elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) read",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) read  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local tesseract, JSON on stdout
  stmt2json statement.pdf

  # Write to file
  stmt2json statement.pdf -o statement.json

  # Vision model instead of tesseract
  stmt2json --backend vision --provider openai --model gpt-4.1-mini scan.jpg

  # German statement, first two pages only
  stmt2json --lang deu --pages 1-2 --default-currency EUR depot.pdf

EXIT CODES:
  0  success or partial result
  1  call error (file not found, backend unavailable, bad flags)
  2  extraction failed (no usable summary and holdings)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision backend)
  ANTHROPIC_API_KEY       Anthropic API key (vision backend)
  GEMINI_API_KEY          Google Gemini API key (vision backend)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                tracing filter, overrides -v / -q
"#;

/// Extract holdings and portfolio summary from bank statements.
#[derive(Parser, Debug)]
#[command(
    name = "stmt2json",
    version,
    about = "Extract holdings and portfolio summary from bank statements as JSON",
    long_about = "Rasterise a statement (PDF, PNG or JPEG; local file or URL), run OCR with \
tesseract or a vision LLM, and print the extracted portfolio summary, holdings and asset \
allocation as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local statement path or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "STMT2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Recognition backend.
    #[arg(long, env = "STMT2JSON_BACKEND", value_enum, default_value = "tesseract")]
    backend: BackendArg,

    /// Vision model ID (vision backend only).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "STMT2JSON_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages recognised concurrently.
    #[arg(short, long, env = "STMT2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-page time limit for OCR and extraction, in seconds.
    #[arg(long, env = "STMT2JSON_PAGE_TIMEOUT", default_value_t = 120)]
    page_timeout: u64,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "STMT2JSON_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STMT2JSON_PASSWORD")]
    password: Option<String>,

    /// Tesseract binary.
    #[arg(long, env = "STMT2JSON_TESSERACT_BIN", default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// Tesseract language pack(s), e.g. eng or eng+deu.
    #[arg(long, env = "STMT2JSON_LANG", default_value = "eng")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, env = "STMT2JSON_PSM", default_value_t = 6)]
    psm: u8,

    /// Skip grayscale/threshold preprocessing before tesseract.
    #[arg(long, env = "STMT2JSON_NO_PREPROCESS")]
    no_preprocess: bool,

    /// Currency assumed when the statement prints none.
    #[arg(long, env = "STMT2JSON_DEFAULT_CURRENCY", default_value = "USD")]
    default_currency: String,

    /// Confidence below which the result is flagged for review (0.0–1.0).
    #[arg(long, env = "STMT2JSON_REVIEW_THRESHOLD", default_value_t = 0.9)]
    review_threshold: f64,

    /// Custom transcription prompt for the vision backend.
    #[arg(long, env = "STMT2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Print single-line JSON.
    #[arg(long, env = "STMT2JSON_COMPACT")]
    compact: bool,

    /// Disable progress bar.
    #[arg(long, env = "STMT2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STMT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STMT2JSON_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STMT2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    Tesseract,
    Vision,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Tesseract => BackendKind::Tesseract,
            BackendArg::Vision => BackendKind::Vision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters; library INFO
    // logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress;
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
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let result = extract(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    if let Some(ref output_path) = cli.output {
        write_result(&result, output_path)
            .await
            .context("Failed to write result")?;
    } else {
        let json = if cli.compact {
            serde_json::to_string(&result)
        } else {
            serde_json::to_string_pretty(&result)
        }
        .context("Failed to serialise result")?;
        println!("{json}");
    }

    if !cli.quiet {
        let mark = match result.status {
            ExtractionStatus::Success => green("✔"),
            ExtractionStatus::Partial => cyan("⚠"),
            ExtractionStatus::Failed => red("✘"),
        };
        eprintln!(
            "{}  {}  {} holdings  {} errors  confidence {:.2}{}  {:.2}s{}",
            mark,
            bold(result.status.as_str()),
            result.holdings.len(),
            result.errors.len(),
            result.confidence_score,
            if result.requires_review {
                dim(" (review)")
            } else {
                String::new()
            },
            result.processing_time_seconds,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }

    if result.status == ExtractionStatus::Failed {
        std::process::exit(EXIT_FAILED);
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = ExtractionConfig::builder()
        .backend(cli.backend.clone().into())
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .page_timeout_secs(cli.page_timeout)
        .pages(pages)
        .tesseract(TesseractOptions {
            binary: cli.tesseract_bin.clone(),
            language: cli.lang.clone(),
            psm: cli.psm,
            ..Default::default()
        })
        .preprocess(!cli.no_preprocess)
        .default_currency(cli.default_currency.trim().to_uppercase())
        .review_threshold(cli.review_threshold)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref prompt) = cli.system_prompt {
        builder = builder.system_prompt(prompt.as_str());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

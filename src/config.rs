//! Configuration types for statement extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct for every knob makes it
//! easy to share a config across page tasks and to log it at the start of a
//! run.

use crate::error::StatementError;
use crate::pipeline::aggregate::{CategoryStrategy, KeywordCategorizer};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one extraction run (or for a long-lived engine).
///
/// # Example
/// ```rust
/// use edgequake_statements::{BackendKind, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .backend(BackendKind::Tesseract)
///     .dpi(300)
///     .concurrency(4)
///     .page_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising PDF pages. Range: 72–600. Default: 300.
    ///
    /// Classical engines are tuned for 300 DPI scans; lower values lose the
    /// decimal points in small table fonts.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 3500.
    ///
    /// Caps memory for oversized pages independently of DPI.
    pub max_rendered_pixels: u32,

    /// Maximum number of pages in flight at once. Default: 4.
    ///
    /// The recognition backend is shared, so this bounds how many calls the
    /// pipeline issues into it concurrently.
    pub concurrency: usize,

    /// Per-page budget for recognition + parsing, in seconds. Default: 120.
    ///
    /// A page exceeding it is cancelled and recorded as a `TimeoutError`;
    /// it is not retried.
    pub page_timeout_secs: u64,

    /// Which recognition backend to acquire. Default: [`BackendKind::Tesseract`].
    pub backend: BackendKind,

    /// LLM model identifier for the vision backend, e.g. "gpt-4.1-mini".
    pub model: Option<String>,

    /// LLM provider name for the vision backend (e.g. "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the vision backend. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the vision backend may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a transient vision API failure. Default: 2.
    ///
    /// Retries happen inside the page budget; the page timeout still applies.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom transcription prompt for the vision backend.
    pub system_prompt: Option<String>,

    /// Settings for the classical tesseract engine.
    pub tesseract: TesseractOptions,

    /// Binarise page images before classical recognition. Default: true.
    pub preprocess: bool,

    /// PDF user password for encrypted statements.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Currency reported when no page names one. Default: "USD".
    pub default_currency: String,

    /// Results scoring below this confidence are flagged for review. Default: 0.9.
    pub review_threshold: f64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Allocation categoriser. Default: [`KeywordCategorizer`].
    pub category_strategy: Option<Arc<dyn CategoryStrategy>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 3500,
            concurrency: 4,
            page_timeout_secs: 120,
            backend: BackendKind::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
            tesseract: TesseractOptions::default(),
            preprocess: true,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            default_currency: "USD".to_string(),
            review_threshold: 0.9,
            progress_callback: None,
            category_strategy: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("tesseract", &self.tesseract)
            .field("preprocess", &self.preprocess)
            .field("pages", &self.pages)
            .field("default_currency", &self.default_currency)
            .field("review_threshold", &self.review_threshold)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .field(
                "category_strategy",
                &self.category_strategy.as_ref().map(|_| "<dyn CategoryStrategy>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured categoriser, or the keyword default.
    pub fn categorizer(&self) -> Arc<dyn CategoryStrategy> {
        self.category_strategy
            .clone()
            .unwrap_or_else(|| Arc::new(KeywordCategorizer::default()))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs.max(1);
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn tesseract(mut self, options: TesseractOptions) -> Self {
        self.config.tesseract = options;
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into().trim().to_uppercase();
        self
    }

    pub fn review_threshold(mut self, t: f64) -> Self {
        self.config.review_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn category_strategy(mut self, strategy: Arc<dyn CategoryStrategy>) -> Self {
        self.config.category_strategy = Some(strategy);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, StatementError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(StatementError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(StatementError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.page_timeout_secs == 0 {
            return Err(StatementError::InvalidConfig(
                "Page timeout must be ≥ 1s".into(),
            ));
        }
        let cur = &c.default_currency;
        if cur.len() != 3 || !cur.chars().all(|ch| ch.is_ascii_uppercase()) {
            return Err(StatementError::InvalidConfig(format!(
                "Default currency must be a 3-letter ISO 4217 code, got '{}'",
                cur
            )));
        }
        if c.tesseract.max_parallel == 0 {
            return Err(StatementError::InvalidConfig(
                "tesseract.max_parallel must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which recognition backend the OCR adapter acquires.
///
/// Chosen by configuration only; the pipeline never inspects document
/// content to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Vision-language model reached through `edgequake-llm`.
    Vision,
    /// Classical tesseract engine (local binary). (default)
    #[default]
    Tesseract,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Vision => "vision",
            BackendKind::Tesseract => "tesseract",
        }
    }
}

/// Options for the classical tesseract backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractOptions {
    /// Binary to execute. Default: `tesseract` on `PATH`.
    pub binary: PathBuf,
    /// Language pack(s), `+`-joined. Default: "eng".
    pub language: String,
    /// Page segmentation mode. Default: 6 (single uniform block of text).
    pub psm: u8,
    /// OCR engine mode. Default: 3 (default engine selection).
    pub oem: u8,
    /// Engine processes allowed to run at once. Default: 2.
    pub max_parallel: usize,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            psm: 6,
            oem: 3,
            max_parallel: 2,
        }
    }
}

/// Specifies which pages of the statement to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

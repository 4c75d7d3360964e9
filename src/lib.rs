//! # edgequake-statements
//!
//! Extract structured portfolio data from scanned or digital bank statements.
//!
//! ## Why this crate?
//!
//! Custody and bank statements arrive as PDFs or phone scans with no text
//! layer worth trusting. This crate rasterises each page, runs OCR (the
//! local tesseract engine or a vision-language model), and turns the text
//! into a typed result: portfolio summary, holdings with checksum-verified
//! ISINs, and an asset allocation. Partial failures are reported per page
//! and per row instead of failing the whole statement.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input      resolve local file, URL or buffer; infer format
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR        tesseract CLI or VLM via edgequake-llm, pages in parallel
//!  ├─ 4. Normalize  whitespace, currency symbols, number conventions, row breaks
//!  ├─ 5. Extract    summary fields + holdings rows per page
//!  ├─ 6. Aggregate  merge pages, derive asset allocation
//!  └─ 7. Assemble   status, confidence score, review flag
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_statements::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default(); // tesseract on PATH
//!     let result = extract("statement.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `stmt2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-statements = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BackendKind, ExtractionConfig, ExtractionConfigBuilder, PageSelection, TesseractOptions,
};
pub use error::{ErrorEntry, ErrorKind, PageError, RecognitionError, RowError, StatementError};
pub use extract::{
    extract, extract_from_bytes, extract_sync, extract_to_file, extract_with_engine,
    process_document, write_result,
};
pub use output::{
    AssetAllocationEntry, ExtractionResult, ExtractionStatus, Holding, PortfolioSummary, ReviewData,
};
pub use pipeline::aggregate::{CategoryStrategy, KeywordCategorizer};
pub use pipeline::input::DocumentPayload;
pub use pipeline::ocr::{OcrBackend, OcrEngine, Recognition};
pub use pipeline::render::{Document, PageImage};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};

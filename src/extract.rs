//! Extraction entry points.
//!
//! [`extract`] is the one-shot API: resolve the input, acquire the OCR
//! engine, run the pipeline, shut the engine down. Long-lived callers
//! (servers, batch jobs) acquire an [`OcrEngine`] once and call
//! [`extract_with_engine`] or [`process_document`] per statement.
//!
//! Only call-level problems (missing file, unreachable URL, unusable
//! backend) surface as `Err`. Anything that goes wrong with the document
//! itself ends up inside the returned [`ExtractionResult`].

use crate::config::ExtractionConfig;
use crate::error::{PageError, RecognitionError, StatementError};
use crate::output::ExtractionResult;
use crate::pipeline::aggregate::{self, PageOutcome};
use crate::pipeline::assemble;
use crate::pipeline::extract::extract_page;
use crate::pipeline::input::{self, DocumentPayload};
use crate::pipeline::normalize::normalize;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::{self, Document, PageImage};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extract a statement from a local path or HTTP/HTTPS URL.
///
/// # Errors
/// Returns `Err(StatementError)` only for call-level failures:
/// - file not found / permission denied / download failure
/// - recognition backend cannot be acquired
/// - libpdfium cannot be loaded
///
/// Undecodable or empty documents yield `Ok` with a `failed` result.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let payload = input::resolve_input(input_str, config.download_timeout_secs).await?;
    run_with_fresh_engine(payload, config).await
}

/// Extract a statement held in memory. `filename` is the format hint and
/// the reported `source`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_statements::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("statement.pdf")?;
/// let result = extract_from_bytes(bytes, "statement.pdf", &ExtractionConfig::default()).await?;
/// println!("{} holdings", result.holdings.len());
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    bytes: impl Into<Vec<u8>>,
    filename: impl Into<String>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    run_with_fresh_engine(DocumentPayload::new(bytes, filename), config).await
}

async fn run_with_fresh_engine(
    payload: DocumentPayload,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    let engine = OcrEngine::acquire(config).await?;
    let result = extract_with_engine(&engine, payload, config).await;
    engine.shutdown().await;
    result
}

/// Run the full pipeline on `payload` with an already-acquired engine.
///
/// Decode errors become a `failed` result with one top-level error entry,
/// and no recognition is attempted. Host problems (libpdfium cannot be
/// loaded, the render task dies) are returned as `Err`.
pub async fn extract_with_engine(
    engine: &OcrEngine,
    payload: DocumentPayload,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    let started = Instant::now();
    let source = payload.filename.clone();

    let render_start = Instant::now();
    match render::rasterize(payload, config).await {
        Ok(document) => {
            debug!(
                "Rasterised {} pages in {}ms",
                document.page_count(),
                render_start.elapsed().as_millis()
            );
            Ok(process_pages(engine, document, config, started).await)
        }
        Err(e) if e.document_kind().is_some() => Ok(assemble::assemble_document_failure(
            &e,
            &source,
            engine.name(),
            started.elapsed(),
        )),
        Err(e) => Err(e),
    }
}

/// Run recognition, extraction, aggregation and assembly over an
/// already-rasterised document.
pub async fn process_document(
    engine: &OcrEngine,
    document: Document,
    config: &ExtractionConfig,
) -> ExtractionResult {
    let started = Instant::now();
    if document.pages.is_empty() {
        let e = StatementError::EmptyDocument {
            source_name: document.source.clone(),
        };
        return assemble::assemble_document_failure(&e, &document.source, engine.name(), started.elapsed());
    }
    process_pages(engine, document, config, started).await
}

async fn process_pages(
    engine: &OcrEngine,
    document: Document,
    config: &ExtractionConfig,
    started: Instant,
) -> ExtractionResult {
    let Document { source, pages } = document;
    let total_pages = pages.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages);
    }

    let outcomes = recognize_pages(engine, pages, config).await;
    let succeeded = outcomes.iter().filter(|o| o.extraction.is_ok()).count();

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total_pages, succeeded);
    }

    let categorizer = config.categorizer();
    let result = match aggregate::aggregate(outcomes, categorizer.as_ref(), &config.default_currency) {
        Ok(agg) => assemble::assemble(
            agg,
            &source,
            engine.name(),
            started.elapsed(),
            config.review_threshold,
        ),
        Err(failure) => assemble::assemble_aggregation_failure(
            failure,
            &source,
            engine.name(),
            total_pages,
            started.elapsed(),
        ),
    };

    info!(
        "Extraction of '{}' {}: {}/{} pages, {} holdings, {} errors, {:.2}s",
        source,
        result.status.as_str(),
        succeeded,
        total_pages,
        result.holdings.len(),
        result.errors.len(),
        result.processing_time_seconds
    );
    result
}

/// Recognise pages concurrently, at most `config.concurrency` at a time.
/// Outcomes come back sorted by page index.
async fn recognize_pages(
    engine: &OcrEngine,
    pages: Vec<PageImage>,
    config: &ExtractionConfig,
) -> Vec<PageOutcome> {
    let total_pages = pages.len();
    let timeout = Duration::from_secs(config.page_timeout_secs);

    let mut outcomes: Vec<PageOutcome> = stream::iter(pages.into_iter().map(|page| {
        let engine = engine.clone();
        let callback = config.progress_callback.clone();
        async move {
            let page_num = page.index;
            if let Some(ref cb) = callback {
                cb.on_page_start(page_num, total_pages);
            }
            let outcome = recognize_page(&engine, page, timeout).await;
            if let Some(ref cb) = callback {
                match &outcome.extraction {
                    Ok(p) => cb.on_page_complete(page_num, total_pages, p.holdings.len()),
                    Err(e) => cb.on_page_error(page_num, total_pages, e.to_string()),
                }
            }
            outcome
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    outcomes.sort_by_key(|o| o.page);
    outcomes
}

/// OCR → normalise → extract for one page, bounded by `timeout`.
///
/// A page that times out or fails recognition contributes no data.
async fn recognize_page(engine: &OcrEngine, page: PageImage, timeout: Duration) -> PageOutcome {
    let page_num = page.index;
    let work = async {
        let recognition = engine.recognize(&page.image).await?;
        let text = normalize(&recognition.text);
        let extraction = extract_page(page_num, &text, recognition.confidence);
        Ok::<_, RecognitionError>((text, extraction))
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok((text, extraction))) => {
            debug!(
                "Page {}: {} holdings, {} row errors",
                page_num,
                extraction.holdings.len(),
                extraction.row_errors.len()
            );
            PageOutcome::ok(page_num, text, extraction)
        }
        Ok(Err(e)) => {
            warn!("Page {}: recognition failed: {}", page_num, e);
            PageOutcome::failed(PageError::Recognition {
                page: page_num,
                detail: e.to_string(),
            })
        }
        Err(_) => {
            warn!("Page {}: timed out after {}s", page_num, timeout.as_secs());
            PageOutcome::failed(PageError::Timeout {
                page: page_num,
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Extract a statement and write the result JSON to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    let result = extract(input_str, config).await?;
    write_result(&result, output_path.as_ref()).await?;
    Ok(result)
}

/// Serialise `result` as pretty JSON to `path`, atomically.
pub async fn write_result(result: &ExtractionResult, path: &Path) -> Result<(), StatementError> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| StatementError::Internal(format!("JSON serialisation failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StatementError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StatementError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StatementError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, StatementError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StatementError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::output::ExtractionStatus;
    use crate::pipeline::ocr::{OcrBackend, Recognition};
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::Arc;

    struct Fixed(&'static str);

    #[async_trait]
    impl OcrBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(&self, _image: &DynamicImage) -> Result<Recognition, RecognitionError> {
            Ok(Recognition {
                text: self.0.to_string(),
                confidence: Some(0.95),
            })
        }
    }

    fn engine(text: &'static str) -> OcrEngine {
        OcrEngine::from_backend(Arc::new(Fixed(text)))
    }

    #[tokio::test]
    async fn garbage_bytes_fail_without_recognition() {
        let config = ExtractionConfig::default();
        let result = extract_with_engine(
            &engine("unused"),
            DocumentPayload::new(b"not a statement".to_vec(), "s.pdf"),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::DocumentDecode);
        assert_eq!(result.extraction_method, "fixed");
    }

    #[tokio::test]
    async fn missing_pdfium_is_a_call_error() {
        std::env::set_var("PDFIUM_LIB_PATH", "/nonexistent/libpdfium.so");
        let result = extract_with_engine(
            &engine("unused"),
            DocumentPayload::new(b"%PDF-1.7\n%%EOF\n".to_vec(), "s.pdf"),
            &ExtractionConfig::default(),
        )
        .await;
        std::env::remove_var("PDFIUM_LIB_PATH");
        assert!(
            matches!(result, Err(StatementError::PdfiumBindingFailed(_))),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn empty_document_is_reported() {
        let config = ExtractionConfig::default();
        let doc = Document::from_images("empty.pdf", vec![]);
        let result = process_document(&engine("unused"), doc, &config).await;
        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.errors[0].kind, ErrorKind::EmptyDocument);
    }

    #[tokio::test]
    async fn single_page_success() {
        let text = "Client ID: AB-1234\nStatement Date 30.09.2025\n\
                    Apple Inc US0378331005 100 15.000,00\n\
                    Total Value 15.000,00 USD";
        let doc = Document::from_images("s.png", vec![DynamicImage::new_rgb8(8, 8)]);
        let result = process_document(&engine(text), doc, &ExtractionConfig::default()).await;
        assert_eq!(result.status, ExtractionStatus::Success);
        assert!(result.errors.is_empty());
        assert_eq!(result.pages_processed, 1);
        assert_eq!(result.holdings.len(), 1);
        assert_eq!(result.holdings[0].confidence, Some(0.95));
        let summary = result.summary.unwrap();
        assert_eq!(summary.currency, "USD");
        assert_eq!(summary.client_id.as_deref(), Some("AB-1234"));
    }

    #[tokio::test]
    async fn write_result_is_atomic_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/result.json");
        let result = ExtractionResult::failed("x.pdf", "fixed", 0, vec![], 0.0);
        write_result(&result, &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["status"], "failed");
        assert!(!path.with_extension("json.tmp").exists());
    }
}

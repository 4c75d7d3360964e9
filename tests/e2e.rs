//! End-to-end tests for edgequake-statements.
//!
//! These tests run the real tesseract binary and, for PDFs, libpdfium on
//! statements in `./test_cases/`. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly
//! requested.
//!
//! Run with:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e statement_scan -- --nocapture

use edgequake_statements::{
    extract, extract_to_file, BackendKind, ErrorKind, ExtractionConfig, ExtractionResult,
    ExtractionStatus, PageSelection,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no statement at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn tesseract_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .backend(BackendKind::Tesseract)
        .build()
        .expect("valid config")
}

/// Invariants every non-failed result must satisfy.
fn assert_result_quality(result: &ExtractionResult, context: &str) {
    assert_ne!(
        result.status,
        ExtractionStatus::Failed,
        "[{context}] extraction failed: {:?}",
        result.errors
    );
    assert!(result.summary.is_some(), "[{context}] summary missing");
    assert!(!result.holdings.is_empty(), "[{context}] no holdings");

    for h in &result.holdings {
        assert_eq!(h.isin.len(), 12, "[{context}] bad ISIN {}", h.isin);
        assert!(
            h.source_page >= 1 && h.source_page <= result.pages_processed,
            "[{context}] holding {} has page {}",
            h.isin,
            h.source_page
        );
    }

    let pages: Vec<usize> = result.holdings.iter().map(|h| h.source_page).collect();
    assert!(
        pages.windows(2).all(|w| w[0] <= w[1]),
        "[{context}] holdings out of page order"
    );

    let allocated: rust_decimal::Decimal = result.asset_allocation.iter().map(|a| a.value).sum();
    assert_eq!(
        allocated,
        result.holdings_total(),
        "[{context}] allocation does not cover holdings"
    );

    assert!(
        (0.0..=1.0).contains(&result.confidence_score),
        "[{context}] confidence out of range"
    );

    println!(
        "[{context}] ✓  {} holdings, {} errors, confidence {:.2}, {:.2}s",
        result.holdings.len(),
        result.errors.len(),
        result.confidence_score,
        result.processing_time_seconds
    );
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_file_is_a_call_error() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let err = extract("/nonexistent/statement.pdf", &tesseract_config())
        .await
        .expect_err("missing file must error");
    println!("Got expected error: {err}");
}

#[tokio::test]
async fn corrupt_pdf_yields_failed_result() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("corrupt.pdf");
    std::fs::write(&path, b"%PDF-1.7\nthis is not really a pdf").expect("write");

    let result = extract(path.to_str().unwrap(), &tesseract_config())
        .await
        .expect("decode errors are reported in the result");

    assert_eq!(result.status, ExtractionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ErrorKind::DocumentDecode);
    assert_eq!(result.pages_processed, 0);
}

// ── Real statements ──────────────────────────────────────────────────────────

#[tokio::test]
async fn statement_scan_png() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement_scan.png"));

    let result = extract(path.to_str().unwrap(), &tesseract_config())
        .await
        .expect("extract() should succeed");

    assert_result_quality(&result, "statement_scan.png");
    assert_eq!(result.pages_processed, 1);
    assert_eq!(result.extraction_method, "tesseract");
}

#[tokio::test]
async fn multi_page_pdf_first_two_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("custody_statement.pdf"));

    let config = ExtractionConfig::builder()
        .backend(BackendKind::Tesseract)
        .pages(PageSelection::Range(1, 2))
        .build()
        .unwrap();
    let result = extract(path.to_str().unwrap(), &config)
        .await
        .expect("extract() should succeed");

    assert_result_quality(&result, "custody_statement.pdf p1-2");
    assert_eq!(result.pages_processed, 2);
}

#[tokio::test]
async fn result_file_is_valid_json() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement_scan.png"));
    let out = output_dir().join("statement_scan.json");

    let result = extract_to_file(path.to_str().unwrap(), &out, &tesseract_config())
        .await
        .expect("extract_to_file() should succeed");

    let text = std::fs::read_to_string(&out).expect("output written");
    let v: serde_json::Value = serde_json::from_str(&text).expect("valid JSON");
    assert_eq!(v["status"], result.status.as_str());
    assert_eq!(
        v["holdings"].as_array().map(|a| a.len()),
        Some(result.holdings.len())
    );
}

#[tokio::test]
async fn vision_backend_on_scan() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement_scan.png"));
    if std::env::var("OPENAI_API_KEY").is_err() && std::env::var("ANTHROPIC_API_KEY").is_err() {
        println!("SKIP — no vision provider API key");
        return;
    }

    let config = ExtractionConfig::builder()
        .backend(BackendKind::Vision)
        .build()
        .unwrap();
    let result = extract(path.to_str().unwrap(), &config)
        .await
        .expect("extract() should succeed");

    assert_result_quality(&result, "statement_scan.png (vision)");
    assert_eq!(result.extraction_method, "vision");
}

//! Result assembly: status classification, confidence score and timing.

use super::aggregate::{Aggregate, AggregationFailure};
use crate::error::{ErrorEntry, StatementError};
use crate::output::{ExtractionResult, ExtractionStatus, ReviewData};
use std::time::Duration;
use tracing::warn;

/// Holdings count at which the holdings component of the score saturates.
const HOLDINGS_SATURATION: usize = 10;

/// Characters of recognised text handed to a reviewer.
const REVIEW_SAMPLE_CHARS: usize = 1000;

/// `success` when nothing errored; `partial` when something errored but a
/// summary and at least one holding survived; `failed` otherwise.
pub fn classify(has_errors: bool, has_summary: bool, holdings: usize) -> ExtractionStatus {
    if !has_errors {
        ExtractionStatus::Success
    } else if has_summary && holdings > 0 {
        ExtractionStatus::Partial
    } else {
        ExtractionStatus::Failed
    }
}

/// Completeness heuristic in [0, 1].
///
/// | component                     | weight |
/// |-------------------------------|--------|
/// | 4 per holding, capped         | 40     |
/// | labelled total found          | 10     |
/// | statement date found          | 10     |
/// | client id found               | 10     |
/// | at least one holding          | 20     |
/// | alphanumeric share of text    | 10     |
pub fn confidence_score(agg: &Aggregate) -> f64 {
    let holdings = agg.holdings.len().min(HOLDINGS_SATURATION) as f64 * 4.0;
    let summary = agg.summary.as_ref();
    let flag = |b: bool| if b { 10.0 } else { 0.0 };

    let score = holdings
        + flag(agg.has_labelled_total)
        + flag(summary.is_some_and(|s| s.statement_date.is_some()))
        + flag(summary.is_some_and(|s| s.client_id.is_some()))
        + if agg.holdings.is_empty() { 0.0 } else { 20.0 }
        + 10.0 * agg.text_quality.clamp(0.0, 1.0);
    (score / 100.0).clamp(0.0, 1.0)
}

/// Build the final result from an aggregate.
pub fn assemble(
    agg: Aggregate,
    source: &str,
    extraction_method: &str,
    elapsed: Duration,
    review_threshold: f64,
) -> ExtractionResult {
    let status = classify(!agg.errors.is_empty(), agg.summary.is_some(), agg.holdings.len());
    let secs = elapsed.as_secs_f64();

    if status == ExtractionStatus::Failed {
        warn!(
            "Extraction of '{}' failed: {} errors, no usable summary and holdings",
            source,
            agg.errors.len()
        );
        let review_data = review_data(&agg.text, "Extraction failed: no usable summary and holdings");
        let mut result =
            ExtractionResult::failed(source, extraction_method, agg.pages_total, agg.errors, secs);
        result.review_data = review_data;
        return result;
    }

    let confidence_score = confidence_score(&agg);
    let requires_review = confidence_score < review_threshold;
    let review_data = if requires_review {
        review_data(
            &agg.text,
            &format!(
                "Extraction confidence {confidence_score:.2} is below the review threshold {review_threshold:.2}"
            ),
        )
    } else {
        None
    };
    ExtractionResult {
        status,
        source: source.to_string(),
        pages_processed: agg.pages_total,
        summary: agg.summary,
        holdings: agg.holdings,
        asset_allocation: agg.asset_allocation,
        processing_time_seconds: secs,
        errors: agg.errors,
        confidence_score,
        requires_review,
        extraction_method: extraction_method.to_string(),
        review_data,
    }
}

/// Review material from the aggregated text; `None` when no page produced text.
fn review_data(text: &str, message: &str) -> Option<ReviewData> {
    if text.trim().is_empty() {
        return None;
    }
    Some(ReviewData {
        extracted_text_sample: text.chars().take(REVIEW_SAMPLE_CHARS).collect(),
        message: message.to_string(),
    })
}

/// Failed result for a document where every page errored.
pub fn assemble_aggregation_failure(
    failure: AggregationFailure,
    source: &str,
    extraction_method: &str,
    pages_processed: usize,
    elapsed: Duration,
) -> ExtractionResult {
    warn!("{}", failure.error);
    ExtractionResult::failed(
        source,
        extraction_method,
        pages_processed,
        failure.errors,
        elapsed.as_secs_f64(),
    )
}

/// Failed result for a document that could not be decoded or had no pages.
///
/// The error becomes a single top-level entry (page 0).
pub fn assemble_document_failure(
    error: &StatementError,
    source: &str,
    extraction_method: &str,
    elapsed: Duration,
) -> ExtractionResult {
    let kind = error
        .document_kind()
        .unwrap_or(crate::error::ErrorKind::DocumentDecode);
    warn!("Document '{}' rejected: {}", source, error);
    ExtractionResult::failed(
        source,
        extraction_method,
        0,
        vec![ErrorEntry::document(kind, error.to_string())],
        elapsed.as_secs_f64(),
    )
}

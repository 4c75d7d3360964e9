//! Output types: the externally visible extraction result.
//!
//! [`ExtractionResult`] serialises to the response JSON consumed by the
//! invocation layer. Monetary fields are [`Decimal`] internally and are
//! written as JSON numbers.

use crate::error::ErrorEntry;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Document-level portfolio header.
///
/// At most one per document. Fields are merged first-writer-wins in page
/// order, so a later page never overwrites what an earlier page set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_portfolio_value: Decimal,
    /// ISO 4217 code.
    pub currency: String,
    pub client_id: Option<String>,
    /// Serialised as an ISO-8601 date.
    pub statement_date: Option<NaiveDate>,
}

/// One securities position, in document reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub security_name: String,
    /// Always checksum-valid.
    pub isin: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub market_value: Decimal,
    /// 1-based page the row was read from.
    pub source_page: usize,
    /// Recognition confidence of the source page (0–1), when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Share of the portfolio held in one category. Derived from holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocationEntry {
    pub category: String,
    /// 0–100.
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

/// Final status classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    /// Every page extracted cleanly.
    Success,
    /// Some page or row errored, but a summary and at least one holding exist.
    Partial,
    /// Nothing usable was extracted.
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Success => "success",
            ExtractionStatus::Partial => "partial",
            ExtractionStatus::Failed => "failed",
        }
    }
}

/// The sole externally visible artifact of an extraction run.
///
/// Invariant: when `status` is [`ExtractionStatus::Failed`], `summary` is
/// `None` and `holdings` / `asset_allocation` are empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    /// Filename hint of the processed document.
    pub source: String,
    pub pages_processed: usize,
    pub summary: Option<PortfolioSummary>,
    pub holdings: Vec<Holding>,
    pub asset_allocation: Vec<AssetAllocationEntry>,
    pub processing_time_seconds: f64,
    pub errors: Vec<ErrorEntry>,
    /// Heuristic completeness score in [0, 1].
    pub confidence_score: f64,
    /// `confidence_score` fell below the configured review threshold.
    pub requires_review: bool,
    /// Name of the recognition backend that produced the text.
    pub extraction_method: String,
    /// Material for a human reviewer, present when `requires_review` is set
    /// and some page produced text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_data: Option<ReviewData>,
}

/// What a reviewer needs to check a low-confidence extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewData {
    /// Leading characters of the normalised text, in page order.
    pub extracted_text_sample: String,
    pub message: String,
}

impl ExtractionResult {
    /// A `failed` result carrying only error entries.
    pub fn failed(
        source: impl Into<String>,
        extraction_method: impl Into<String>,
        pages_processed: usize,
        errors: Vec<ErrorEntry>,
        processing_time_seconds: f64,
    ) -> Self {
        Self {
            status: ExtractionStatus::Failed,
            source: source.into(),
            pages_processed,
            summary: None,
            holdings: Vec::new(),
            asset_allocation: Vec::new(),
            processing_time_seconds,
            errors,
            confidence_score: 0.0,
            requires_review: true,
            extraction_method: extraction_method.into(),
            review_data: None,
        }
    }

    /// Sum of all holding market values.
    pub fn holdings_total(&self) -> Decimal {
        self.holdings.iter().map(|h| h.market_value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn holding_serialises_amounts_as_numbers() {
        let h = Holding {
            security_name: "Apple Inc".into(),
            isin: "US0378331005".into(),
            quantity: dec!(100),
            market_value: dec!(15000.00),
            source_page: 1,
            confidence: None,
        };
        let v: serde_json::Value = serde_json::to_value(&h).unwrap();
        assert_eq!(v["quantity"], serde_json::json!(100.0));
        assert_eq!(v["market_value"], serde_json::json!(15000.0));
        assert!(v.get("confidence").is_none());
    }

    #[test]
    fn summary_date_is_iso() {
        let s = PortfolioSummary {
            total_portfolio_value: dec!(1234567.89),
            currency: "USD".into(),
            client_id: None,
            statement_date: NaiveDate::from_ymd_opt(2025, 9, 30),
        };
        let v: serde_json::Value = serde_json::to_value(&s).unwrap();
        assert_eq!(v["statement_date"], "2025-09-30");
        assert_eq!(v["client_id"], serde_json::Value::Null);
    }

    #[test]
    fn failed_result_shape() {
        let r = ExtractionResult::failed(
            "x.pdf",
            "tesseract",
            0,
            vec![ErrorEntry::document(ErrorKind::DocumentDecode, "bad")],
            0.1,
        );
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["summary"], serde_json::Value::Null);
        assert_eq!(v["holdings"].as_array().unwrap().len(), 0);
        assert_eq!(v["errors"][0]["kind"], "DocumentDecodeError");
        assert_eq!(v["errors"][0]["page"], 0);
        assert!(v.get("review_data").is_none());
    }
}

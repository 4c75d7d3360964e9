//! Document-level aggregation of per-page outcomes.
//!
//! Pages arrive already sorted by index. Summary fields merge
//! first-writer-wins, holdings concatenate in page order, and the asset
//! allocation is derived from the merged holdings through a pluggable
//! [`CategoryStrategy`].

use super::extract::PageExtraction;
use crate::error::{ErrorEntry, PageError, StatementError};
use crate::output::{AssetAllocationEntry, Holding, PortfolioSummary};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Category assigned when no strategy rule matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// What the pipeline produced for one page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// 1-based page index.
    pub page: usize,
    /// Normalised text, empty when the page errored.
    pub text: String,
    pub extraction: Result<PageExtraction, PageError>,
}

impl PageOutcome {
    pub fn ok(page: usize, text: String, extraction: PageExtraction) -> Self {
        Self {
            page,
            text,
            extraction: Ok(extraction),
        }
    }

    pub fn failed(error: PageError) -> Self {
        Self {
            page: error.page(),
            text: String::new(),
            extraction: Err(error),
        }
    }
}

/// Assigns a holding to an allocation category.
pub trait CategoryStrategy: Send + Sync {
    /// `None` falls back to [`UNCATEGORIZED`].
    fn categorize(&self, holding: &Holding) -> Option<String>;
}

/// Keyword rules over the security name, checked in order.
///
/// A rule matches when any word of the name starts with one of its
/// `prefixes` or equals one of its `words` (case-insensitive).
#[derive(Debug, Clone)]
pub struct KeywordCategorizer {
    rules: Vec<CategoryRule>,
}

#[derive(Debug, Clone)]
struct CategoryRule {
    category: String,
    prefixes: Vec<String>,
    words: Vec<String>,
}

impl KeywordCategorizer {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; earlier rules take precedence.
    pub fn with_rule(mut self, category: impl Into<String>, prefixes: &[&str], words: &[&str]) -> Self {
        self.rules.push(CategoryRule {
            category: category.into(),
            prefixes: prefixes.iter().map(|s| s.to_lowercase()).collect(),
            words: words.iter().map(|s| s.to_lowercase()).collect(),
        });
        self
    }
}

impl Default for KeywordCategorizer {
    fn default() -> Self {
        Self::empty()
            .with_rule("Bonds", &["bond", "note", "treasur", "govt", "debenture", "anleihe"], &["gov"])
            .with_rule(
                "Structured Products",
                &["struct", "certif", "warrant", "autocall"],
                &["product", "products"],
            )
            .with_rule(
                "Equities",
                &["equit", "stock", "share"],
                &["inc", "corp", "co", "ag", "plc", "sa", "nv", "se", "ltd", "holding", "holdings"],
            )
            .with_rule("Cash", &["cash", "liquidit", "deposit", "money"], &[])
    }
}

impl CategoryStrategy for KeywordCategorizer {
    fn categorize(&self, holding: &Holding) -> Option<String> {
        let name = holding.security_name.to_lowercase();
        let words: Vec<&str> = name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.rules
            .iter()
            .find(|rule| {
                words.iter().any(|w| {
                    rule.words.iter().any(|k| k == w)
                        || rule.prefixes.iter().any(|p| w.starts_with(p.as_str()))
                })
            })
            .map(|rule| rule.category.clone())
    }
}

/// Document-level data before status classification.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub summary: Option<PortfolioSummary>,
    pub holdings: Vec<Holding>,
    pub asset_allocation: Vec<AssetAllocationEntry>,
    /// Page and row errors in page order.
    pub errors: Vec<ErrorEntry>,
    pub pages_total: usize,
    pub pages_succeeded: usize,
    /// Share of alphanumeric characters in the recognised text, 0–1.
    pub text_quality: f64,
    /// The total was read from a label rather than summed from holdings.
    pub has_labelled_total: bool,
    /// Normalised text of the successful pages, joined in page order.
    pub text: String,
}

/// Every page errored. Carries the per-page entries for the failed result.
#[derive(Debug)]
pub struct AggregationFailure {
    pub error: StatementError,
    pub errors: Vec<ErrorEntry>,
}

/// Merge per-page outcomes (sorted by page) into one document.
pub fn aggregate(
    pages: Vec<PageOutcome>,
    strategy: &dyn CategoryStrategy,
    default_currency: &str,
) -> Result<Aggregate, AggregationFailure> {
    let pages_total = pages.len();
    let mut errors = Vec::new();
    let mut holdings = Vec::new();
    let mut pages_succeeded = 0;

    let mut total = None;
    let mut currency = None;
    let mut page_currency = None;
    let mut client_id = None;
    let mut statement_date = None;

    let mut alnum = 0usize;
    let mut visible = 0usize;
    let mut texts: Vec<String> = Vec::new();

    for outcome in pages {
        match outcome.extraction {
            Err(e) => errors.push(ErrorEntry::from(&e)),
            Ok(page) => {
                pages_succeeded += 1;
                for c in outcome.text.chars().filter(|c| !c.is_whitespace()) {
                    visible += 1;
                    if c.is_alphanumeric() {
                        alnum += 1;
                    }
                }
                if !outcome.text.is_empty() {
                    texts.push(outcome.text);
                }

                let s = page.summary;
                if total.is_none() && s.total_value.is_some() {
                    total = s.total_value;
                    currency = s.currency;
                }
                page_currency = page_currency.or(s.page_currency);
                client_id = client_id.or(s.client_id);
                statement_date = statement_date.or(s.statement_date);

                errors.extend(page.row_errors.iter().map(ErrorEntry::from));
                holdings.extend(page.holdings);
            }
        }
    }

    if pages_succeeded == 0 {
        let first_error = errors
            .first()
            .map(|e| format!("Page {}: {}", e.page, e.detail))
            .unwrap_or_else(|| "no pages".to_string());
        return Err(AggregationFailure {
            error: StatementError::Aggregation {
                total: pages_total,
                first_error,
            },
            errors,
        });
    }

    let has_labelled_total = total.is_some();
    let total = total.or_else(|| {
        (!holdings.is_empty()).then(|| holdings.iter().map(|h: &Holding| h.market_value).sum())
    });
    let summary = total.map(|total_portfolio_value| PortfolioSummary {
        total_portfolio_value,
        currency: currency
            .or(page_currency)
            .unwrap_or_else(|| default_currency.to_string()),
        client_id,
        statement_date,
    });

    let asset_allocation = allocate(&holdings, strategy);
    debug!(
        "Aggregated {} holdings from {}/{} pages, {} errors",
        holdings.len(),
        pages_succeeded,
        pages_total,
        errors.len()
    );

    Ok(Aggregate {
        summary,
        holdings,
        asset_allocation,
        errors,
        pages_total,
        pages_succeeded,
        text_quality: if visible == 0 {
            0.0
        } else {
            alnum as f64 / visible as f64
        },
        has_labelled_total,
        text: texts.join("\n"),
    })
}

/// Group holdings by category. Values sum exactly to the holdings total;
/// percentages are rounded to two decimals. Ordered by value, largest first.
pub fn allocate(holdings: &[Holding], strategy: &dyn CategoryStrategy) -> Vec<AssetAllocationEntry> {
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for h in holdings {
        let category = strategy
            .categorize(h)
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *by_category.entry(category).or_default() += h.market_value;
    }

    let grand_total: Decimal = by_category.values().sum();
    let mut entries: Vec<AssetAllocationEntry> = by_category
        .into_iter()
        .map(|(category, value)| {
            let percentage = if grand_total.is_zero() {
                Decimal::ZERO
            } else {
                (value * Decimal::ONE_HUNDRED / grand_total).round_dp(2)
            };
            AssetAllocationEntry {
                category,
                percentage,
                value,
            }
        })
        .collect();
    entries.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.category.cmp(&b.category)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RowError};
    use crate::pipeline::extract::SummaryFragment;
    use rust_decimal_macros::dec;

    fn holding(name: &str, value: Decimal, page: usize) -> Holding {
        Holding {
            security_name: name.into(),
            isin: "US0378331005".into(),
            quantity: dec!(1),
            market_value: value,
            source_page: page,
            confidence: None,
        }
    }

    fn page(n: usize, summary: SummaryFragment, holdings: Vec<Holding>) -> PageOutcome {
        PageOutcome::ok(
            n,
            "Apple Inc US0378331005 1 10.00".into(),
            PageExtraction {
                page: n,
                summary,
                holdings,
                row_errors: Vec::new(),
            },
        )
    }

    #[test]
    fn keyword_categories() {
        let c = KeywordCategorizer::default();
        let cat = |n: &str| c.categorize(&holding(n, dec!(1), 1));
        assert_eq!(cat("US Treasury Note 2030").as_deref(), Some("Bonds"));
        assert_eq!(cat("Apple Inc").as_deref(), Some("Equities"));
        assert_eq!(cat("Roche Holding AG").as_deref(), Some("Equities"));
        assert_eq!(cat("Barrier Reverse Convertible Certificate").as_deref(), Some("Structured Products"));
        assert_eq!(cat("USD Cash Account").as_deref(), Some("Cash"));
        assert_eq!(cat("Global Income Fund"), None);
    }

    #[test]
    fn first_writer_wins_across_pages() {
        let p1 = SummaryFragment {
            client_id: Some("AB-1234".into()),
            ..Default::default()
        };
        let p2 = SummaryFragment {
            total_value: Some(dec!(100)),
            currency: Some("EUR".into()),
            client_id: Some("ZZ-9999".into()),
            ..Default::default()
        };
        let p3 = SummaryFragment {
            total_value: Some(dec!(999)),
            currency: Some("USD".into()),
            ..Default::default()
        };
        let agg = aggregate(
            vec![page(1, p1, vec![]), page(2, p2, vec![]), page(3, p3, vec![])],
            &KeywordCategorizer::default(),
            "USD",
        )
        .unwrap();
        let s = agg.summary.unwrap();
        assert_eq!(s.client_id.as_deref(), Some("AB-1234"));
        assert_eq!(s.total_portfolio_value, dec!(100));
        assert_eq!(s.currency, "EUR");
        assert!(agg.has_labelled_total);
    }

    #[test]
    fn holdings_keep_page_order_and_total_falls_back_to_sum() {
        let agg = aggregate(
            vec![
                page(1, SummaryFragment::default(), vec![holding("Apple Inc", dec!(15000), 1)]),
                page(2, SummaryFragment::default(), vec![holding("US Treasury Note", dec!(5000.50), 2)]),
            ],
            &KeywordCategorizer::default(),
            "CHF",
        )
        .unwrap();
        assert_eq!(agg.holdings[0].source_page, 1);
        assert_eq!(agg.holdings[1].source_page, 2);
        let s = agg.summary.unwrap();
        assert_eq!(s.total_portfolio_value, dec!(20000.50));
        assert_eq!(s.currency, "CHF");
        assert!(!agg.has_labelled_total);
    }

    #[test]
    fn allocation_sums_to_holdings_total() {
        let holdings = vec![
            holding("Apple Inc", dec!(15000.00), 1),
            holding("Microsoft Corp", dec!(20000.00), 1),
            holding("US Treasury Note", dec!(10000.33), 2),
            holding("Mystery Fund", dec!(1.01), 2),
        ];
        let alloc = allocate(&holdings, &KeywordCategorizer::default());
        let value_sum: Decimal = alloc.iter().map(|a| a.value).sum();
        let holdings_sum: Decimal = holdings.iter().map(|h| h.market_value).sum();
        assert_eq!(value_sum, holdings_sum);

        let pct_sum: Decimal = alloc.iter().map(|a| a.percentage).sum();
        assert!((pct_sum - dec!(100)).abs() <= dec!(0.05), "{pct_sum}");

        assert_eq!(alloc[0].category, "Equities");
        assert_eq!(alloc[0].value, dec!(35000.00));
        assert_eq!(alloc.last().unwrap().category, UNCATEGORIZED);
    }

    #[test]
    fn row_errors_are_collected() {
        let mut outcome = page(1, SummaryFragment::default(), vec![]);
        if let Ok(p) = outcome.extraction.as_mut() {
            p.row_errors.push(RowError::NumericParse {
                page: 1,
                row: "x".into(),
                reason: "bad".into(),
            });
        }
        let agg = aggregate(vec![outcome], &KeywordCategorizer::default(), "USD").unwrap();
        assert_eq!(agg.errors.len(), 1);
        assert_eq!(agg.errors[0].kind, ErrorKind::NumericParse);
        assert!(agg.summary.is_none());
    }

    #[test]
    fn all_pages_failed() {
        let pages = vec![
            PageOutcome::failed(PageError::Timeout { page: 1, secs: 5 }),
            PageOutcome::failed(PageError::Recognition {
                page: 2,
                detail: "boom".into(),
            }),
        ];
        let failure = aggregate(pages, &KeywordCategorizer::default(), "USD").unwrap_err();
        assert_eq!(failure.errors.len(), 2);
        assert!(matches!(failure.error, StatementError::Aggregation { total: 2, .. }));
    }
}

//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as pages are recognised. The CLI uses it to drive an indicatif
//! progress bar; services can forward the events to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_statements::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RowCounter {
//!     holdings: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RowCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, holdings: usize) {
//!         self.holdings.fetch_add(holdings, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(RowCounter { holdings: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages run concurrently, so `on_page_*` may be called from several tasks
/// at once and in completion order rather than page order. All methods
/// default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rasterisation, before any page is recognised.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is handed to the recognition backend.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page was recognised and parsed.
    ///
    /// `holdings` is the number of rows accepted on that page.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, holdings: usize) {
        let _ = (page_num, total_pages, holdings);
    }

    /// Called when a page failed recognition or timed out.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

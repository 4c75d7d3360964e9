//! Pipeline stages for statement extraction.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and a stage (say, the recognition backend) can be swapped
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ normalize ──▶ extract ──▶ aggregate ──▶ assemble
//! (bytes)   (pages)   (text)   (canonical)   (per page)  (document)    (result)
//! ```
//!
//! 1. [`input`]     resolves a path, URL or buffer to bytes and infers the format
//! 2. [`render`]    rasterises selected pages on the blocking pool
//! 3. [`ocr`]       recognises each page through the configured backend
//! 4. [`normalize`] canonicalises whitespace, currencies, amounts and row breaks
//! 5. [`extract`]   reads summary fields and holdings rows from one page
//! 6. [`aggregate`] merges pages and derives the asset allocation
//! 7. [`assemble`]  classifies the status and scores the result
//!
//! Stages 3–5 run per page under the page timeout; everything else runs once
//! per document.

pub mod aggregate;
pub mod assemble;
pub mod extract;
pub mod input;
pub mod isin;
pub mod normalize;
pub mod numbers;
pub mod ocr;
pub mod preprocess;
pub mod render;

//! OCR adapter: one interface over interchangeable recognition backends.
//!
//! A backend turns one page image into raw text plus an optional confidence.
//! The pipeline only ever sees [`OcrEngine`]; which backend sits behind it
//! is decided by [`crate::config::BackendKind`] at acquisition time and
//! never by document content.
//!
//! Engines are cheap to clone and safe to share across page tasks. Acquire
//! once per process (or per run), call [`OcrEngine::recognize`] from as many
//! tasks as you like, and [`OcrEngine::shutdown`] when done.

pub mod tesseract;
pub mod vision;

use crate::config::{BackendKind, ExtractionConfig};
use crate::error::{RecognitionError, StatementError};
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use tracing::info;

/// Raw output of one recognition call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean engine confidence in [0, 1], when the backend reports one.
    pub confidence: Option<f32>,
}

/// A recognition engine.
///
/// Implementations must be safe to call concurrently; any internal limit on
/// parallel calls is the implementation's business.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Short identifier reported as the result's `extraction_method`.
    fn name(&self) -> &str;

    async fn recognize(&self, image: &DynamicImage) -> Result<Recognition, RecognitionError>;

    /// Release engine resources. Called once, after the last `recognize`.
    async fn shutdown(&self) {}
}

/// Shared handle to the configured backend.
#[derive(Clone)]
pub struct OcrEngine {
    backend: Arc<dyn OcrBackend>,
}

impl std::fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEngine")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl OcrEngine {
    /// Acquire the backend selected by `config.backend`.
    ///
    /// # Errors
    /// [`StatementError::ProviderNotConfigured`] when no vision provider can
    /// be resolved, [`StatementError::BackendUnavailable`] when the tesseract
    /// binary cannot be run.
    pub async fn acquire(config: &ExtractionConfig) -> Result<Self, StatementError> {
        let backend: Arc<dyn OcrBackend> = match config.backend {
            BackendKind::Vision => Arc::new(vision::VisionBackend::from_config(config)?),
            BackendKind::Tesseract => Arc::new(tesseract::TesseractBackend::detect(config).await?),
        };
        info!("Acquired OCR backend: {}", backend.name());
        Ok(Self { backend })
    }

    /// Wrap an already-built backend (custom engines, tests).
    pub fn from_backend(backend: Arc<dyn OcrBackend>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub async fn recognize(&self, image: &DynamicImage) -> Result<Recognition, RecognitionError> {
        self.backend.recognize(image).await
    }

    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
        info!("OCR backend {} shut down", self.backend.name());
    }
}

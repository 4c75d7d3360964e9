//! Vision-language backend: page image → transcription via `edgequake-llm`.
//!
//! The page is sent as a lossless base64 PNG together with a transcription
//! prompt (see [`crate::prompts`]). The model answers with plain text, one
//! table row per line, which then goes through the same normaliser as
//! classical OCR output.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads retries out: with 500 ms base and 2 retries the waits are
//! 500 ms → 1 s. All attempts run inside the page timeout.

use super::{OcrBackend, Recognition};
use crate::config::ExtractionConfig;
use crate::error::{RecognitionError, StatementError};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

const BACKEND_NAME: &str = "vision";
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

/// Vision-model recognition backend.
pub struct VisionBackend {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionBackend {
    /// Resolve the provider from the config (see [`resolve_provider`]).
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, StatementError> {
        let provider = resolve_provider(config)?;
        Ok(Self::with_provider(provider, config))
    }

    /// Use an already-built provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl OcrBackend for VisionBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    /// The request carries the transcription prompt as the system message
    /// and the page PNG as the only user content.
    async fn recognize(&self, image: &DynamicImage) -> Result<Recognition, RecognitionError> {
        let start = Instant::now();
        let image_data = encode_page(image)
            .map_err(|e| RecognitionError::new(BACKEND_NAME, format!("PNG encoding failed: {e}")))?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Vision retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "Vision call: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(Recognition {
                        text: strip_outer_fences(&response.content),
                        confidence: None,
                    });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Vision attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(RecognitionError::new(
            BACKEND_NAME,
            format!(
                "{} attempt(s) failed; last error: {}",
                self.max_retries + 1,
                last_err.unwrap_or_else(|| "Unknown error".to_string())
            ),
        ))
    }
}

/// Encode a page as a base64 PNG ready for the API.
///
/// PNG rather than JPEG: compression artefacts on small digits are exactly
/// what turns `8` into `3`. `detail: "high"` keeps fine print legible on
/// tiling models.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Models sometimes wrap the whole answer in a code fence.
fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, StatementError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StatementError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, StatementError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StatementError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 70), u64::MAX);
        assert_eq!(backoff_ms(u64::MAX, 2), u64::MAX);
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn strips_wrapping_fence() {
        let raw = "```text\nApple Inc US0378331005 100 15,000.00\nTotal Value 15,000.00\n```";
        assert_eq!(
            strip_outer_fences(raw),
            "Apple Inc US0378331005 100 15,000.00\nTotal Value 15,000.00"
        );
        assert_eq!(strip_outer_fences("plain"), "plain");
    }
}

//! Page rasterisation: document bytes → one `DynamicImage` per page.
//!
//! PDFs go through pdfium; PNG and JPEG inputs decode to a single page.
//!
//! ## Why spawn_blocking?
//!
//! pdfium uses thread-local state internally and is not safe to call from
//! async contexts, and image decoding is CPU-bound. Both run on the blocking
//! pool so the Tokio workers keep driving recognition of earlier pages.
//!
//! ## Sizing
//!
//! Pages render at `dpi`, but the longest edge never exceeds
//! `max_rendered_pixels`. A legal-size scan at 600 DPI would otherwise be
//! 5,100 × 8,400 px.

use super::input::{DocumentFormat, DocumentPayload};
use crate::config::{ExtractionConfig, PageSelection};
use crate::error::StatementError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number in the source document.
    pub index: usize,
    pub image: DynamicImage,
}

/// A decoded document: its filename hint and its pages in order.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub pages: Vec<PageImage>,
}

impl Document {
    /// Wrap already-rasterised pages, numbered from 1.
    pub fn from_images(source: impl Into<String>, images: Vec<DynamicImage>) -> Self {
        Self {
            source: source.into(),
            pages: images
                .into_iter()
                .enumerate()
                .map(|(i, image)| PageImage {
                    index: i + 1,
                    image,
                })
                .collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Decode `payload` and rasterise the selected pages.
///
/// Fails with [`StatementError::DocumentDecode`] (or a password error) when
/// the bytes cannot be decoded, and with [`StatementError::EmptyDocument`]
/// when no page survives the selection.
pub async fn rasterize(
    payload: DocumentPayload,
    config: &ExtractionConfig,
) -> Result<Document, StatementError> {
    let format = payload.format()?;
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let selection = config.pages.clone();
    let source = payload.filename.clone();

    let pages = tokio::task::spawn_blocking(move || match format {
        DocumentFormat::Pdf => render_pdf_blocking(
            &payload,
            dpi,
            max_pixels,
            password.as_deref(),
            &selection,
        ),
        DocumentFormat::Png | DocumentFormat::Jpeg => {
            decode_image_blocking(&payload, format, max_pixels, &selection)
        }
    })
    .await
    .map_err(|e| StatementError::Internal(format!("Render task panicked: {}", e)))??;

    if pages.is_empty() {
        return Err(StatementError::EmptyDocument {
            source_name: source,
        });
    }
    info!("Rasterised {} page(s) of '{}'", pages.len(), source);
    Ok(Document { source, pages })
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then a library next to the working
/// directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, StatementError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path)
            .map_err(|e| StatementError::PdfiumBindingFailed(format!("{path}: {e:?}")))?,
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| StatementError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn render_pdf_blocking(
    payload: &DocumentPayload,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<Vec<PageImage>, StatementError> {
    let pdfium = bind_pdfium()?;
    let source_name = payload.filename.clone();

    let document = pdfium
        .load_pdf_from_byte_slice(&payload.bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    StatementError::WrongPassword {
                        source_name: source_name.clone(),
                    }
                } else {
                    StatementError::PasswordRequired {
                        source_name: source_name.clone(),
                    }
                }
            } else {
                StatementError::DocumentDecode {
                    source_name: source_name.clone(),
                    detail: err_str,
                }
            }
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    let mut results = Vec::with_capacity(indices.len());

    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| StatementError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let width_px = (page.width().value / 72.0 * dpi as f32).round() as u32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px.clamp(1, max_pixels) as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            StatementError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(PageImage {
            index: idx + 1,
            image,
        });
    }

    Ok(results)
}

fn decode_image_blocking(
    payload: &DocumentPayload,
    format: DocumentFormat,
    max_pixels: u32,
    selection: &PageSelection,
) -> Result<Vec<PageImage>, StatementError> {
    if selection.to_indices(1).is_empty() {
        warn!("Page selection excludes the only page of '{}'", payload.filename);
        return Ok(Vec::new());
    }

    let image_format = match format {
        DocumentFormat::Png => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    };
    let image = image::load_from_memory_with_format(&payload.bytes, image_format).map_err(|e| {
        StatementError::DocumentDecode {
            source_name: payload.filename.clone(),
            detail: e.to_string(),
        }
    })?;

    let (w, h) = image.dimensions();
    let image = if w.max(h) > max_pixels {
        debug!("Downscaling {}x{} image to fit {} px", w, h, max_pixels);
        image.resize(max_pixels, max_pixels, FilterType::Lanczos3)
    } else {
        image
    };

    Ok(vec![PageImage { index: 1, image }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(w, h, Rgb([255u8, 255, 255])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn png_is_one_page() {
        let config = ExtractionConfig::default();
        let doc = rasterize(DocumentPayload::new(png_bytes(40, 20), "scan.png"), &config)
            .await
            .unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].index, 1);
        assert_eq!(doc.source, "scan.png");
    }

    #[tokio::test]
    async fn oversized_image_is_downscaled() {
        let config = ExtractionConfig::builder()
            .max_rendered_pixels(1000)
            .build()
            .unwrap();
        let doc = rasterize(DocumentPayload::new(png_bytes(2000, 500), "wide.png"), &config)
            .await
            .unwrap();
        assert_eq!(doc.pages[0].image.width(), 1000);
        assert_eq!(doc.pages[0].image.height(), 250);
    }

    #[tokio::test]
    async fn corrupt_image_is_decode_error() {
        let mut bytes = png_bytes(10, 10);
        bytes.truncate(12);
        let err = rasterize(DocumentPayload::new(bytes, "bad.png"), &ExtractionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StatementError::DocumentDecode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn selection_past_single_page_is_empty() {
        let config = ExtractionConfig::builder()
            .pages(PageSelection::Single(2))
            .build()
            .unwrap();
        let err = rasterize(DocumentPayload::new(png_bytes(10, 10), "one.png"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, StatementError::EmptyDocument { .. }));
    }

    #[test]
    fn from_images_numbers_pages() {
        let doc = Document::from_images(
            "mem",
            vec![DynamicImage::new_rgb8(1, 1), DynamicImage::new_rgb8(2, 2)],
        );
        assert_eq!(doc.pages[1].index, 2);
    }
}

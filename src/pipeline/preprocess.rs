//! Image preparation for the classical OCR backend.
//!
//! Scanned statements come in with grey backgrounds, coloured table bands
//! and JPEG noise. Tesseract reads clean black-on-white text far better, so
//! pages are converted to grayscale and binarised with Otsu's threshold.

use image::{DynamicImage, GrayImage, Luma};

/// Grayscale + global Otsu binarisation.
pub fn binarize(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let threshold = otsu_threshold(&gray);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, Luma([v])) in gray.enumerate_pixels() {
        let px = if *v > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([px]));
    }
    DynamicImage::ImageLuma8(out)
}

/// Threshold that maximises the between-class variance of the histogram.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for Luma([v]) in gray.pixels() {
        hist[*v as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 127;
    }

    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();
    let mut sum_bg = 0.0;
    let mut weight_bg = 0u64;
    let mut best = (0u8, f64::MIN);

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best.1 {
            best = (t as u8, between);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bimodal_histogram() {
        let mut img = GrayImage::new(10, 1);
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([if x < 5 { 40 } else { 210 }]));
        }
        let t = otsu_threshold(&img);
        assert!((40..210).contains(&t), "threshold {t}");

        let out = binarize(&DynamicImage::ImageLuma8(img)).to_luma8();
        assert_eq!(out.get_pixel(0, 0).0, [0]);
        assert_eq!(out.get_pixel(9, 0).0, [255]);
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let img = GrayImage::from_pixel(4, 4, Luma([200]));
        let out = binarize(&DynamicImage::ImageLuma8(img)).to_luma8();
        let first = out.get_pixel(0, 0).0;
        assert!(out.pixels().all(|p| p.0 == first));
    }
}

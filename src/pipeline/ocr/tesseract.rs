//! Classical OCR backend: the `tesseract` command-line engine.
//!
//! Each page is preprocessed (grayscale + Otsu, see
//! [`crate::pipeline::preprocess`]), written to a temporary PNG and fed to
//! `tesseract <png> stdout … tsv`. The TSV output gives per-word confidences,
//! which are averaged into the page confidence, and the word grid, which is
//! re-joined into one text line per detected line.
//!
//! Engine processes are bounded by a semaphore (`max_parallel`) independent
//! of page concurrency; tesseract already uses several threads per process.

use super::{OcrBackend, Recognition};
use crate::config::{ExtractionConfig, TesseractOptions};
use crate::error::{RecognitionError, StatementError};
use crate::pipeline::preprocess::binarize;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

const BACKEND_NAME: &str = "tesseract";

/// Tesseract CLI backend.
pub struct TesseractBackend {
    options: TesseractOptions,
    preprocess: bool,
    permits: Semaphore,
}

impl TesseractBackend {
    /// Check that the binary runs (`tesseract --version`) and build the backend.
    pub async fn detect(config: &ExtractionConfig) -> Result<Self, StatementError> {
        let options = config.tesseract.clone();
        let unavailable = |detail: String| StatementError::BackendUnavailable {
            backend: BACKEND_NAME.to_string(),
            detail,
        };

        let output = Command::new(&options.binary)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| unavailable(format!("cannot run '{}': {e}", options.binary.display())))?;
        if !output.status.success() {
            return Err(unavailable(format!(
                "'{} --version' exited with {}",
                options.binary.display(),
                output.status
            )));
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        info!("Using {} (lang={}, psm={})", version, options.language, options.psm);

        Ok(Self::new(options, config.preprocess))
    }

    /// Build without probing the binary.
    pub fn new(options: TesseractOptions, preprocess: bool) -> Self {
        let permits = Semaphore::new(options.max_parallel.max(1));
        Self {
            options,
            preprocess,
            permits,
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn recognize(&self, image: &DynamicImage) -> Result<Recognition, RecognitionError> {
        let err = |detail: String| RecognitionError::new(BACKEND_NAME, detail);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| err("engine is shut down".into()))?;

        let image = image.clone();
        let preprocess = self.preprocess;
        let png = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile, String> {
            let prepared = if preprocess { binarize(&image) } else { image };
            let mut file = tempfile::Builder::new()
                .prefix("stmt-page-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| format!("temp file: {e}"))?;
            prepared
                .write_to(file.as_file_mut(), ImageFormat::Png)
                .map_err(|e| format!("PNG encoding failed: {e}"))?;
            Ok(file)
        })
        .await
        .map_err(|e| err(format!("preprocess task panicked: {e}")))?
        .map_err(err)?;

        let output = Command::new(&self.options.binary)
            .arg(png.path())
            .arg("stdout")
            .arg("--oem")
            .arg(self.options.oem.to_string())
            .arg("--psm")
            .arg(self.options.psm.to_string())
            .arg("-l")
            .arg(&self.options.language)
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| err(format!("failed to run engine: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(err(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let recognition = parse_tsv(&tsv);
        debug!(
            "tesseract: {} chars, confidence {:?}",
            recognition.text.len(),
            recognition.confidence
        );
        Ok(recognition)
    }

    async fn shutdown(&self) {
        self.permits.close();
    }
}

/// Rebuild text lines from tesseract TSV and average the word confidences.
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. Word rows are level 5; structural rows carry
/// confidence `-1` and are ignored.
pub fn parse_tsv(tsv: &str) -> Recognition {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut conf_sum = 0.0f64;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));
        lines.entry(key).or_default().push(text.to_string());

        if let Ok(conf) = cols[10].parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let text = lines
        .into_values()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence =
        (conf_count > 0).then(|| ((conf_sum / conf_count as f64) / 100.0).clamp(0.0, 1.0) as f32);
    Recognition { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, line: u32, n: u32, conf: f32, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{n}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn tsv_rebuilds_lines_and_confidence() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            "4\t1\t1\t1\t1\t0\t0\t0\t100\t10\t-1\t".to_string(),
            word(1, 1, 1, 96.0, "Apple"),
            word(1, 1, 2, 94.0, "Inc"),
            word(1, 1, 3, 90.0, "US0378331005"),
            word(1, 2, 1, 80.0, "Total"),
            word(1, 2, 2, 90.0, "Value"),
            word(2, 1, 1, -1.0, " "),
        ]
        .join("\n");

        let rec = parse_tsv(&tsv);
        assert_eq!(rec.text, "Apple Inc US0378331005\nTotal Value");
        let conf = rec.confidence.unwrap();
        assert!((conf - 0.9).abs() < 1e-6, "{conf}");
    }

    #[test]
    fn empty_tsv_has_no_confidence() {
        let rec = parse_tsv(HEADER);
        assert_eq!(rec.text, "");
        assert_eq!(rec.confidence, None);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let config = ExtractionConfig::builder()
            .tesseract(TesseractOptions {
                binary: PathBuf::from("/nonexistent/tesseract-binary"),
                ..Default::default()
            })
            .build()
            .unwrap();
        let err = TesseractBackend::detect(&config).await.err().unwrap();
        assert!(matches!(err, StatementError::BackendUnavailable { .. }));
    }

    /// Stand-in engine that logs start/end around a short sleep and prints
    /// one recognised word.
    #[cfg(unix)]
    fn fake_engine(dir: &std::path::Path, log: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-tesseract");
        let body = format!(
            "#!/bin/sh\n\
             echo start >> '{log}'\n\
             sleep 0.3\n\
             echo end >> '{log}'\n\
             printf '{HEADER}\\n5\\t1\\t1\\t1\\t1\\t1\\t0\\t0\\t10\\t10\\t90\\tok\\n'\n",
            log = log.display(),
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn semaphore_bounds_engine_processes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let backend = TesseractBackend::new(
            TesseractOptions {
                binary: fake_engine(dir.path(), &log),
                max_parallel: 2,
                ..Default::default()
            },
            false,
        );

        let image = DynamicImage::new_rgb8(4, 4);
        let results =
            futures::future::join_all((0..5).map(|_| backend.recognize(&image))).await;
        for r in &results {
            assert_eq!(r.as_ref().unwrap().text, "ok");
        }

        let events = std::fs::read_to_string(&log).unwrap();
        let (mut running, mut peak, mut starts) = (0i32, 0i32, 0);
        for event in events.lines() {
            match event {
                "start" => {
                    running += 1;
                    starts += 1;
                    peak = peak.max(running);
                }
                "end" => running -= 1,
                other => panic!("unexpected log line {other:?}"),
            }
        }
        assert_eq!(starts, 5);
        assert!(peak <= 2, "{peak} engine processes ran at once");
    }

    #[tokio::test]
    async fn closed_backend_rejects_calls() {
        let backend = TesseractBackend::new(TesseractOptions::default(), false);
        backend.shutdown().await;
        let err = backend
            .recognize(&DynamicImage::new_rgb8(4, 4))
            .await
            .unwrap_err();
        assert!(err.detail.contains("shut down"));
    }
}

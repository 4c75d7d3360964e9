//! Input resolution: turn a path, URL or in-memory buffer into document bytes.
//!
//! The rasterizer works on bytes, so a downloaded statement never touches the
//! file system. The format is inferred from the filename hint and checked
//! against the file's magic bytes before anything is decoded.

use crate::error::StatementError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Raw document bytes plus the filename hint used for format inference and
/// reported as the result's `source`.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl DocumentPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    /// Infer the document format; see [`DocumentFormat::infer`].
    pub fn format(&self) -> Result<DocumentFormat, StatementError> {
        DocumentFormat::infer(&self.filename, &self.bytes)
    }
}

/// Supported statement containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentFormat {
    fn from_extension(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "png" => Some(DocumentFormat::Png),
            "jpg" | "jpeg" => Some(DocumentFormat::Jpeg),
            _ => None,
        }
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(DocumentFormat::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(DocumentFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(DocumentFormat::Jpeg)
        } else {
            None
        }
    }

    /// Infer the format from the filename extension and the magic bytes.
    ///
    /// The magic bytes decide. An extension that names a different
    /// supported format, or bytes that match no supported format, is a
    /// decode error.
    pub fn infer(filename: &str, bytes: &[u8]) -> Result<Self, StatementError> {
        let decode_err = |detail: String| StatementError::DocumentDecode {
            source_name: filename.to_string(),
            detail,
        };
        if bytes.is_empty() {
            return Err(decode_err("empty file".into()));
        }
        let Some(magic) = Self::from_magic(bytes) else {
            let mut head = [0u8; 4];
            let n = bytes.len().min(4);
            head[..n].copy_from_slice(&bytes[..n]);
            return Err(decode_err(format!(
                "unrecognised file signature {:02X?}; expected PDF, PNG or JPEG",
                &head[..n]
            )));
        };
        match Self::from_extension(filename) {
            Some(ext) if ext != magic => Err(decode_err(format!(
                "file name says {} but contents are {}",
                ext.as_str(),
                magic.as_str()
            ))),
            _ => Ok(magic),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Png => "PNG",
            DocumentFormat::Jpeg => "JPEG",
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to document bytes.
///
/// URLs are downloaded with the given timeout; anything else is read as a
/// local path.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<DocumentPayload, StatementError> {
    if input.trim().is_empty() {
        return Err(StatementError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<DocumentPayload, StatementError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(StatementError::PermissionDenied { path });
        }
        Err(_) => return Err(StatementError::FileNotFound { path }),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Read local statement: {} ({} bytes)", path.display(), bytes.len());
    Ok(DocumentPayload { bytes, filename })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<DocumentPayload, StatementError> {
    info!("Downloading statement from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StatementError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            StatementError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StatementError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(StatementError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(map_send_err)?;

    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Ok(DocumentPayload {
        bytes: bytes.to_vec(),
        filename,
    })
}

/// Last non-empty path segment with an extension, or `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

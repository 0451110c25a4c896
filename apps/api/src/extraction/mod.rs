//! Text extraction from uploaded CV documents.
//!
//! The pipeline talks to a `TextExtractor` only; the default backend reads
//! PDFs locally and delegates images to a remote vision-OCR endpoint.
//! The contract is never-raise: every failure comes back as a string that
//! starts with [`EXTRACTION_ERROR_PREFIX`] so the scoring stage can detect
//! it and skip the scorer for that file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

/// Marker prefix carried by extraction failures.
pub const EXTRACTION_ERROR_PREFIX: &str = "[extraction-error]";

/// True when `text` is unusable for scoring: empty or an error marker.
pub fn is_extraction_failure(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.starts_with(EXTRACTION_ERROR_PREFIX)
}

fn extraction_error(detail: impl std::fmt::Display) -> String {
    format!("{EXTRACTION_ERROR_PREFIX} {detail}")
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts plain text from the document at `path`.
    /// Always returns a string; failures carry [`EXTRACTION_ERROR_PREFIX`].
    async fn extract(&self, path: &str) -> String;
}

/// Default backend: `pdf-extract` for PDFs, remote OCR for image formats.
pub struct DocumentExtractor {
    client: Client,
    ocr_api_url: String,
    ocr_api_key: String,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    text: String,
}

impl DocumentExtractor {
    pub fn new(ocr_api_url: String, ocr_api_key: String) -> Arc<Self> {
        Arc::new(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(90))
                .build()
                .expect("Failed to build HTTP client"),
            ocr_api_url,
            ocr_api_key,
        })
    }

    async fn extract_pdf(&self, path: &str) -> String {
        let path = path.to_string();
        // pdf-extract is synchronous; keep it off the async workers.
        let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await;

        match result {
            Ok(Ok(text)) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    extraction_error("PDF contained no extractable text")
                } else {
                    text
                }
            }
            Ok(Err(e)) => extraction_error(format!("failed to read PDF: {e}")),
            Err(e) => extraction_error(format!("extraction task failed: {e}")),
        }
    }

    async fn extract_image(&self, path: &str, mime_type: &str) -> String {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => return extraction_error(format!("cannot read file: {e}")),
        };

        let response = self
            .client
            .post(&self.ocr_api_url)
            .bearer_auth(&self.ocr_api_key)
            .header("content-type", mime_type.to_string())
            .body(bytes)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return extraction_error(format!("OCR request failed: {e}")),
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OCR backend returned {status}: {body}");
            return extraction_error(format!("OCR backend returned {status}"));
        }

        match response.json::<OcrResponse>().await {
            Ok(ocr) if !ocr.text.trim().is_empty() => ocr.text.trim().to_string(),
            Ok(_) => extraction_error("OCR produced no text"),
            Err(e) => extraction_error(format!("invalid OCR response: {e}")),
        }
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, path: &str) -> String {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let text = match extension.as_str() {
            "pdf" => self.extract_pdf(path).await,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" => {
                let mime = match extension.as_str() {
                    "jpg" | "jpeg" => "image/jpeg",
                    "png" => "image/png",
                    "gif" => "image/gif",
                    "bmp" => "image/bmp",
                    _ => "image/tiff",
                };
                self.extract_image(path, mime).await
            }
            other => extraction_error(format!("unsupported file type '.{other}'")),
        };

        if is_extraction_failure(&text) {
            warn!("Extraction failed for {path}: {text}");
        } else {
            info!("Extracted {} characters from {path}", text.len());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_marker_is_detected() {
        assert!(is_extraction_failure(&extraction_error("boom")));
        assert!(is_extraction_failure("  [extraction-error] anything"));
    }

    #[test]
    fn test_empty_text_counts_as_failure() {
        assert!(is_extraction_failure(""));
        assert!(is_extraction_failure("   \n "));
    }

    #[test]
    fn test_normal_text_is_not_a_failure() {
        assert!(!is_extraction_failure("John Doe\nSoftware Engineer"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_yields_marker() {
        let extractor = DocumentExtractor::new("http://localhost:0".into(), "key".into());
        let text = extractor.extract("/tmp/cv.docx").await;
        assert!(text.starts_with(EXTRACTION_ERROR_PREFIX));
        assert!(text.contains("docx"));
    }
}

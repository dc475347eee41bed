//! Local OCR using poppler's `pdftoppm` and the `tesseract` binary.

use crate::extractor::ExtractionTier;
use crate::normalize::clean_ocr_artifacts;
use async_trait::async_trait;
use mizan_core::error::{MizanError, Result};
use mizan_core::types::{DocumentSource, ExtractionMethod, PageText};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Rasterises PDF pages and runs dual-language OCR page by page.
pub struct OcrTier {
    threshold: f32,
    languages: String,
    dpi: u32,
    psm: u32,
    pdftoppm_bin: String,
    tesseract_bin: String,
}

impl OcrTier {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            languages: "ara+eng".to_string(),
            dpi: 200,
            psm: 6,
            pdftoppm_bin: "pdftoppm".to_string(),
            tesseract_bin: "tesseract".to_string(),
        }
    }

    pub fn with_languages(mut self, languages: impl Into<String>) -> Self {
        self.languages = languages.into();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }

    /// Override the binaries used, e.g. absolute paths.
    pub fn with_binaries(
        mut self,
        pdftoppm: impl Into<String>,
        tesseract: impl Into<String>,
    ) -> Self {
        self.pdftoppm_bin = pdftoppm.into();
        self.tesseract_bin = tesseract.into();
        self
    }

    async fn run(program: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                MizanError::extraction(format!(
                    "Failed to run {}: {} (is it installed?)",
                    program, e
                ))
            })?;

        if !output.status.success() {
            return Err(MizanError::extraction(format!(
                "{} failed: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn rasterize(&self, pdf_path: &Path, work_dir: &Path) -> Result<Vec<PathBuf>> {
        let prefix = work_dir.join("page");
        let dpi = self.dpi.to_string();
        Self::run(
            &self.pdftoppm_bin,
            &[
                "-r",
                &dpi,
                "-png",
                &pdf_path.to_string_lossy(),
                &prefix.to_string_lossy(),
            ],
        )
        .await?;

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(number) = page_image_number(&path) {
                images.push((number, path));
            }
        }
        images.sort_by_key(|(number, _)| *number);
        Ok(images.into_iter().map(|(_, path)| path).collect())
    }

    async fn recognize(&self, image: &Path) -> Result<String> {
        let psm = self.psm.to_string();
        let stdout = Self::run(
            &self.tesseract_bin,
            &[
                &image.to_string_lossy(),
                "stdout",
                "-l",
                &self.languages,
                "--psm",
                &psm,
            ],
        )
        .await?;
        Ok(clean_ocr_artifacts(&String::from_utf8_lossy(&stdout)))
    }
}

/// Page number of a `page-<n>.png` file written by pdftoppm.
fn page_image_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".png")?;
    let digits = stem.strip_prefix("page-")?;
    digits.parse().ok()
}

/// Lower-cased image extension of `file_name`, if it names a supported image.
fn image_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

#[async_trait]
impl ExtractionTier for OcrTier {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn threshold(&self) -> Option<f32> {
        Some(self.threshold)
    }

    async fn extract(&self, source: &DocumentSource) -> Result<Vec<PageText>> {
        let work_dir = tempfile::tempdir()?;

        // The caller's file name never reaches the filesystem
        if let Some(ext) = image_extension(&source.file_name) {
            let image = work_dir.path().join(format!("input.{}", ext));
            tokio::fs::write(&image, &source.bytes).await?;
            let text = self.recognize(&image).await?;
            return Ok(PageText::from_pages([text]));
        }

        if !source.is_pdf() {
            return Err(MizanError::extraction(format!(
                "OCR requires a PDF or image input, got {}",
                source.file_name
            )));
        }

        let pdf_path = work_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, &source.bytes).await?;

        let images = self.rasterize(&pdf_path, work_dir.path()).await?;
        if images.is_empty() {
            return Err(MizanError::extraction("pdftoppm produced no page images"));
        }
        debug!("Running OCR over {} pages of {}", images.len(), source.file_name);

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            pages.push(self.recognize(image).await?);
        }
        Ok(PageText::from_pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_image_number() {
        assert_eq!(page_image_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_image_number(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_image_number(Path::new("/tmp/x/input.pdf")), None);
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("scan.PNG").as_deref(), Some("png"));
        assert_eq!(image_extension("fatwa.tiff").as_deref(), Some("tiff"));
        assert_eq!(image_extension("standard.pdf"), None);
        assert_eq!(image_extension("no-extension"), None);
    }

    #[test]
    fn test_image_extension_ignores_directories() {
        assert_eq!(image_extension("../../etc/cron.d/evil.png").as_deref(), Some("png"));
        assert_eq!(image_extension("scan.png/../../x"), None);
    }

    #[tokio::test]
    async fn test_image_staged_under_fixed_name() {
        let tier = OcrTier::new(0.6).with_binaries("mizan-no-such-pdftoppm", "/bin/echo");
        let source = DocumentSource::new("../../outside/scan.png", "BNM", b"img".to_vec());
        let pages = match tier.extract(&source).await {
            Ok(pages) => pages,
            // No /bin/echo on this host
            Err(_) => return,
        };
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.contains("input.png"));
        assert!(!pages[0].text.contains("outside"));
    }

    #[tokio::test]
    async fn test_plain_text_is_rejected() {
        let tier = OcrTier::new(0.6);
        let source = DocumentSource::new("notes.txt", "BNM", b"plain".to_vec());
        assert!(tier.extract(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let tier = OcrTier::new(0.6)
            .with_binaries("mizan-no-such-pdftoppm", "mizan-no-such-tesseract");
        let source = DocumentSource::new("scan.pdf", "AAOIFI", b"%PDF-1.4".to_vec());
        let err = tier.extract(&source).await.unwrap_err();
        assert!(err.to_string().contains("mizan-no-such-pdftoppm"));
    }
}

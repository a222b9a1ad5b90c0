use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{ExtractionError, OcrError};
use crate::tools::run_tool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub layout: String,
}

pub trait TextExtractor: Sync {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError>;

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        self.extract(path).map(|extraction| extraction.text)
    }
}

/// Text via `pdftotext <pdf> -`, token boxes via `pdftotext -bbox <pdf> -`.
#[derive(Debug, Clone, Default)]
pub struct Pdftotext {
    timeout: Option<Duration>,
}

impl Pdftotext {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn run(&self, pdf_path: &Path, bbox: bool) -> Result<String, ExtractionError> {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8");
        if bbox {
            command.arg("-bbox");
        }
        command.arg(pdf_path).arg("-");

        let raw = run_tool(command, self.timeout).map_err(|source| ExtractionError::Tool {
            path: pdf_path.to_path_buf(),
            source,
        })?;

        Ok(clean_tool_text(&raw))
    }
}

impl TextExtractor for Pdftotext {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError> {
        let text = self.run(path, false)?;
        let layout = self.run(path, true)?;
        Ok(Extraction { text, layout })
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        self.run(path, false)
    }
}

/// Renders a searchable PDF next to a page image.
pub trait PdfRenderer {
    fn render(&self, image: &Path) -> Result<PathBuf, OcrError>;
}

/// `tesseract -l <lang> <image> <image-without-extension> pdf`.
#[derive(Debug, Clone)]
pub struct TesseractRenderer {
    lang: String,
    timeout: Option<Duration>,
}

impl TesseractRenderer {
    pub fn new(lang: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            lang: lang.into(),
            timeout,
        }
    }
}

impl PdfRenderer for TesseractRenderer {
    fn render(&self, image: &Path) -> Result<PathBuf, OcrError> {
        let output_base = image.with_extension("");
        let mut command = Command::new("tesseract");
        command
            .arg("-l")
            .arg(&self.lang)
            .arg(image)
            .arg(&output_base)
            .arg("pdf");

        run_tool(command, self.timeout).map_err(|source| OcrError::Tool {
            image: image.to_path_buf(),
            source,
        })?;

        let pdf = image.with_extension("pdf");
        if !pdf.is_file() {
            return Err(OcrError::MissingOutput { output: pdf });
        }
        Ok(pdf)
    }
}

pub fn clean_tool_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\u{0000}', "")
}

/// True when the text carries nothing worth training on.
pub fn is_blank_text(text: &str) -> bool {
    text.chars()
        .all(|character| character.is_whitespace() || character == '\u{000C}')
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One scanned page as found on disk, split into `<basename>_<n>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub path: PathBuf,
    pub basename: String,
    pub sequence_number: Option<u32>,
    pub extension: String,
}

/// A group of page images that passed series validation. Pages are kept in
/// ascending sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCandidate {
    pub directory: PathBuf,
    pub basename: String,
    pub extension: String,
    pub pages: Vec<PageImage>,
}

impl SeriesCandidate {
    pub fn sequence_numbers(&self) -> BTreeSet<u32> {
        self.pages
            .iter()
            .filter_map(|page| page.sequence_number)
            .collect()
    }

    pub fn page_paths(&self) -> Vec<PathBuf> {
        self.pages.iter().map(|page| page.path.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedDocument {
    pub output_path: PathBuf,
    pub source_pages: Vec<PageImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub text: String,
    pub layout: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedEntry {
    pub output_path: String,
    pub source_pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUnit {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub root: String,
    pub dry_run: bool,
    pub pdf_count: usize,
    pub image_count: usize,
    pub consolidated: Vec<ConsolidatedEntry>,
    pub failed_series: Vec<FailedUnit>,
    pub rendered_pdfs: Vec<String>,
    pub failed_renders: Vec<FailedUnit>,
    pub missing_pdfs: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCounts {
    pub pdf_count: usize,
    pub stored: usize,
    pub duplicates: usize,
    /// Rows dropped because their path now holds content filed elsewhere.
    pub stale_removed: usize,
    pub failed: usize,
    pub docs_total: i64,
}

/// What a trained label names: one stored document, or the folder holding it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LabelBy {
    Document,
    Folder,
}

impl LabelBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Folder => "folder",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderSuggestion {
    pub folder: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSuggestions {
    pub document: String,
    pub suggestions: Vec<FolderSuggestion>,
}

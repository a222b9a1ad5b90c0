use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::util::STATE_DIR_NAME;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "tif", "tiff", "jpg"];
pub const PDF_EXTENSION: &str = "pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PageImage,
    Pdf,
}

/// Page images grouped by their parent directory, plus every PDF found.
/// Both are sorted, so two scans of an unchanged tree compare equal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub images_by_dir: BTreeMap<PathBuf, Vec<PathBuf>>,
    pub pdfs: Vec<PathBuf>,
    /// Entries below the root that could not be read and were left out.
    pub unreadable: Vec<String>,
}

impl Catalog {
    pub fn image_count(&self) -> usize {
        self.images_by_dir.values().map(Vec::len).sum()
    }

    pub fn images(&self) -> impl Iterator<Item = &PathBuf> {
        self.images_by_dir.values().flatten()
    }

    /// Images that have no PDF with the same path stem next to them.
    pub fn missing_pdfs(&self) -> Vec<PathBuf> {
        let pdf_stems: BTreeSet<PathBuf> = self
            .pdfs
            .iter()
            .map(|pdf| pdf.with_extension(""))
            .collect();

        self.images()
            .filter(|image| !pdf_stems.contains(&image.with_extension("")))
            .cloned()
            .collect()
    }
}

pub fn classify(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case(PDF_EXTENSION) {
        return Some(FileKind::Pdf);
    }
    IMAGE_EXTENSIONS
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        .then_some(FileKind::PageImage)
}

/// Walks `root` for PDFs and page images. An unreadable entry below the root
/// is logged and recorded in `unreadable`; only a failure on the root itself
/// is an error.
pub fn scan(root: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_state_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() > 0 => {
                let path = err
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                warn!(path = %path, error = %err, "skipping unreadable entry");
                catalog.unreadable.push(path);
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to walk {}", root.display()));
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        match classify(&path) {
            Some(FileKind::Pdf) => catalog.pdfs.push(path),
            Some(FileKind::PageImage) => {
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                catalog.images_by_dir.entry(dir).or_default().push(path);
            }
            None => {}
        }
    }

    catalog.pdfs.sort();
    debug!(
        root = %root.display(),
        pdfs = catalog.pdfs.len(),
        images = catalog.image_count(),
        "catalogued tree"
    );

    Ok(catalog)
}

fn is_state_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == STATE_DIR_NAME
}

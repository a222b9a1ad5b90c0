use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog;
use crate::cli::IndexArgs;
use crate::commands::scan::{self, ScanOptions};
use crate::extract::{Pdftotext, TextExtractor};
use crate::model::{Document, IndexCounts};
use crate::store::DocumentStore;
use crate::util::{default_db_path, manifest_dir, sha256_file, utc_compact_string};

pub fn run(args: IndexArgs) -> Result<()> {
    let started_ts = Utc::now();
    let root = &args.root;

    let pdfs = if args.skip_scan {
        catalog::scan(root)?.pdfs
    } else {
        let outcome = scan::scan_with_tools(
            root,
            &args.tools,
            ScanOptions {
                force_ocr: args.tools.force_ocr,
                dry_run: false,
            },
        )?;
        let manifest_path = manifest_dir(root)
            .join(format!("scan_run_{}.json", utc_compact_string(started_ts)));
        scan::write_scan_manifests(root, &manifest_path, &outcome.manifest)?;
        outcome.pdfs
    };

    let db_path = args.db_path.clone().unwrap_or_else(|| default_db_path(root));
    info!(db_path = %db_path.display(), pdf_count = pdfs.len(), "starting index");

    let store = DocumentStore::open(&db_path)?;
    let extractor = Pdftotext::new(args.tools.timeout());
    let counts = index_documents(&store, &extractor, &pdfs)?;

    info!(
        stored = counts.stored,
        duplicates = counts.duplicates,
        stale_removed = counts.stale_removed,
        failed = counts.failed,
        docs_total = counts.docs_total,
        "index completed"
    );

    Ok(())
}

/// Hashes and extracts every PDF in parallel, then stores them one by one.
/// A PDF whose content is already stored under another path is skipped as a
/// duplicate, and any older row for its own path is dropped. A PDF that
/// cannot be read or extracted is skipped with a warning.
pub fn index_documents<E: TextExtractor>(
    store: &DocumentStore,
    extractor: &E,
    pdfs: &[PathBuf],
) -> Result<IndexCounts> {
    let prepared: Vec<(&PathBuf, Result<Document>)> = pdfs
        .par_iter()
        .map(|pdf| (pdf, prepare_document(extractor, pdf)))
        .collect();

    let mut counts = IndexCounts {
        pdf_count: pdfs.len(),
        stored: 0,
        duplicates: 0,
        stale_removed: 0,
        failed: 0,
        docs_total: 0,
    };

    for (pdf, document) in prepared {
        let document = match document {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %pdf.display(), error = %format!("{err:#}"), "skipping document");
                counts.failed += 1;
                continue;
            }
        };

        if let Some(existing) = store.path_for_hash(&document.content_hash)? {
            if existing != document.path {
                info!(
                    path = %document.path,
                    duplicate_of = %existing,
                    sha256 = %document.content_hash,
                    "skipping duplicate document"
                );
                counts.duplicates += 1;
                if store.remove(&document.path)? {
                    info!(path = %document.path, "removed outdated row for duplicate path");
                    counts.stale_removed += 1;
                }
                continue;
            }
        }

        store.put(&document)?;
        counts.stored += 1;
    }

    counts.docs_total = store.count()?;
    Ok(counts)
}

fn prepare_document<E: TextExtractor>(extractor: &E, pdf: &Path) -> Result<Document> {
    let content_hash = sha256_file(pdf)?;
    let extraction = extractor
        .extract(pdf)
        .with_context(|| format!("failed to extract {}", pdf.display()))?;

    Ok(Document {
        path: pdf.display().to_string(),
        text: extraction.text,
        layout: extraction.layout,
        content_hash,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::{ExtractionError, ToolError};
    use crate::extract::Extraction;

    /// Uses the file contents as the extracted text; files starting with
    /// "broken" fail like an unreadable PDF.
    struct FileTextExtractor;

    impl TextExtractor for FileTextExtractor {
        fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError> {
            let text = fs::read_to_string(path).unwrap();
            if text.starts_with("broken") {
                return Err(ExtractionError::Tool {
                    path: path.to_path_buf(),
                    source: ToolError::Status {
                        program: "pdftotext".to_string(),
                        code: Some(1),
                        stderr: "Syntax Error: Couldn't find trailer dictionary".to_string(),
                    },
                });
            }
            Ok(Extraction {
                layout: format!("<page>{text}</page>"),
                text,
            })
        }
    }

    fn write(root: &Path, name: &str, contents: &str) -> PathBuf {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn stores_documents_and_skips_duplicates_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let pdfs = vec![
            write(root, "bank/stmt.pdf", "relevé de compte"),
            write(root, "inbox/stmt_copy.pdf", "relevé de compte"),
            write(root, "tax/broken.pdf", "broken bytes"),
            write(root, "tax/2023.pdf", "impôt sur le revenu"),
        ];

        let store = DocumentStore::open_in_memory().unwrap();
        let counts = index_documents(&store, &FileTextExtractor, &pdfs).unwrap();

        assert_eq!(counts.pdf_count, 4);
        assert_eq!(counts.stored, 2);
        assert_eq!(counts.duplicates, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.docs_total, 2);

        let stored = store.get_all().unwrap();
        assert_eq!(stored[0].path, pdfs[0].display().to_string());
        assert_eq!(stored[0].layout, "<page>relevé de compte</page>");
        assert_eq!(stored[0].content_hash, sha256_file(&pdfs[0]).unwrap());
        assert_eq!(stored[1].path, pdfs[3].display().to_string());
    }

    #[test]
    fn reindexing_same_paths_does_not_report_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = vec![write(dir.path(), "a.pdf", "alpha"), write(dir.path(), "b.pdf", "beta")];

        let store = DocumentStore::open_in_memory().unwrap();
        index_documents(&store, &FileTextExtractor, &pdfs).unwrap();
        let counts = index_documents(&store, &FileTextExtractor, &pdfs).unwrap();

        assert_eq!(counts.stored, 2);
        assert_eq!(counts.duplicates, 0);
        assert_eq!(counts.docs_total, 2);
    }

    #[test]
    fn path_rewritten_with_filed_content_loses_its_old_row() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = vec![write(dir.path(), "a.pdf", "alpha"), write(dir.path(), "b.pdf", "beta")];

        let store = DocumentStore::open_in_memory().unwrap();
        index_documents(&store, &FileTextExtractor, &pdfs).unwrap();
        fs::write(&pdfs[1], "alpha").unwrap();
        let counts = index_documents(&store, &FileTextExtractor, &pdfs).unwrap();

        assert_eq!(counts.duplicates, 1);
        assert_eq!(counts.stale_removed, 1);
        assert_eq!(counts.docs_total, 1);
        let stored = store.get_all().unwrap();
        assert_eq!(stored[0].path, pdfs[0].display().to_string());
        assert!(stored.iter().all(|doc| doc.text != "beta"));
    }
}

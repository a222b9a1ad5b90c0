use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog::{self, Catalog};
use crate::cli::{ScanArgs, ToolArgs};
use crate::consolidate::{ImageMagickMerger, ImageMerger, SeriesConsolidator, merged_output_path};
use crate::extract::{PdfRenderer, TesseractRenderer};
use crate::model::{ConsolidatedDocument, ConsolidatedEntry, FailedUnit, ScanManifest};
use crate::series::detect_series_in;
use crate::util::{display_paths, manifest_dir, now_utc_string, utc_compact_string, write_json_pretty};

pub const LATEST_SCAN_MANIFEST: &str = "scan_latest.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub force_ocr: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub manifest: ScanManifest,
    pub pdfs: Vec<PathBuf>,
}

/// Result of consolidating the page images of one directory.
#[derive(Debug, Default)]
pub struct DirectoryOutcome {
    /// Merged outputs plus every image that was left as it was.
    pub images: Vec<PathBuf>,
    pub consolidated: Vec<ConsolidatedDocument>,
    pub planned: Vec<PathBuf>,
    pub failures: Vec<FailedUnit>,
}

pub fn run(args: ScanArgs) -> Result<()> {
    let started_ts = Utc::now();
    let options = ScanOptions {
        force_ocr: args.tools.force_ocr,
        dry_run: args.dry_run,
    };

    info!(root = %args.root.display(), dry_run = args.dry_run, "starting scan");
    let outcome = scan_with_tools(&args.root, &args.tools, options)?;
    log_outcome(&outcome.manifest);

    if args.dry_run {
        info!("scan dry-run complete");
        return Ok(());
    }

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir(&args.root).join(format!("scan_run_{}.json", utc_compact_string(started_ts)))
    });
    write_scan_manifests(&args.root, &manifest_path, &outcome.manifest)?;

    Ok(())
}

pub fn scan_with_tools(root: &Path, tools: &ToolArgs, options: ScanOptions) -> Result<ScanOutcome> {
    let consolidator = SeriesConsolidator::new(ImageMagickMerger::new(
        tools.convert_program.clone(),
        tools.timeout(),
    ));
    let renderer = TesseractRenderer::new(tools.ocr_lang.clone(), tools.timeout());

    scan_tree(root, &consolidator, &renderer, options)
}

pub fn write_scan_manifests(root: &Path, manifest_path: &Path, manifest: &ScanManifest) -> Result<()> {
    write_json_pretty(manifest_path, manifest)?;
    write_json_pretty(&manifest_dir(root).join(LATEST_SCAN_MANIFEST), manifest)?;
    info!(path = %manifest_path.display(), "wrote scan manifest");
    Ok(())
}

/// Catalogues `root`, consolidates page series directory by directory, then
/// renders PDFs for images that still lack one. Failures of one series or
/// one image are recorded and never stop the rest of the tree.
pub fn scan_tree<M: ImageMerger, R: PdfRenderer>(
    root: &Path,
    consolidator: &SeriesConsolidator<M>,
    renderer: &R,
    options: ScanOptions,
) -> Result<ScanOutcome> {
    let mut manifest = ScanManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        root: root.display().to_string(),
        dry_run: options.dry_run,
        pdf_count: 0,
        image_count: 0,
        consolidated: Vec::new(),
        failed_series: Vec::new(),
        rendered_pdfs: Vec::new(),
        failed_renders: Vec::new(),
        missing_pdfs: Vec::new(),
        warnings: Vec::new(),
    };

    let initial = catalog::scan(root)?;
    manifest.warnings.extend(
        initial
            .unreadable
            .iter()
            .map(|path| format!("unreadable entry skipped: {path}")),
    );
    for (directory, images) in &initial.images_by_dir {
        let outcome = consolidate_directory(directory, images, consolidator, options.dry_run);
        debug!(
            directory = %directory.display(),
            images = outcome.images.len(),
            "directory consolidated"
        );

        manifest
            .consolidated
            .extend(outcome.consolidated.iter().map(consolidated_entry));
        manifest.consolidated.extend(outcome.planned.iter().map(|output| ConsolidatedEntry {
            output_path: output.display().to_string(),
            source_pages: Vec::new(),
        }));
        manifest.failed_series.extend(outcome.failures);
    }

    let mut current = if manifest.consolidated.is_empty() || options.dry_run {
        initial
    } else {
        catalog::scan(root)?
    };

    let to_render = if options.force_ocr {
        current.images().cloned().collect()
    } else {
        current.missing_pdfs()
    };

    for image in &to_render {
        if options.dry_run {
            info!(path = %image.display(), "would render PDF");
            continue;
        }

        info!(path = %image.display(), "making PDF");
        match renderer.render(image) {
            Ok(pdf) => manifest.rendered_pdfs.push(pdf.display().to_string()),
            Err(err) => {
                warn!(path = %image.display(), error = %err, "OCR failed; image left without PDF");
                manifest.failed_renders.push(FailedUnit {
                    path: image.display().to_string(),
                    reason: error_chain(&err),
                });
            }
        }
    }

    if !manifest.rendered_pdfs.is_empty() {
        current = catalog::scan(root)?;
    }

    report_missing_pdfs(&current, &mut manifest, options.dry_run);
    manifest.pdf_count = current.pdfs.len();
    manifest.image_count = current.image_count();

    Ok(ScanOutcome {
        manifest,
        pdfs: current.pdfs,
    })
}

pub fn consolidate_directory<M: ImageMerger>(
    directory: &Path,
    images: &[PathBuf],
    consolidator: &SeriesConsolidator<M>,
    dry_run: bool,
) -> DirectoryOutcome {
    let partition = detect_series_in(directory, images);
    let mut outcome = DirectoryOutcome::default();

    for series in partition.series {
        if dry_run {
            let output = merged_output_path(&series);
            info!(
                output = %output.display(),
                pages = ?series.sequence_numbers(),
                "would consolidate series"
            );
            outcome.images.extend(series.page_paths());
            outcome.planned.push(output);
            continue;
        }

        match consolidator.consolidate(&series) {
            Ok(document) => {
                info!(
                    output = %document.output_path.display(),
                    pages = document.source_pages.len(),
                    "consolidated series"
                );
                outcome.images.push(document.output_path.clone());
                outcome.consolidated.push(document);
            }
            Err(err) => {
                warn!(
                    directory = %directory.display(),
                    basename = %series.basename,
                    error = %err,
                    "series left unconsolidated"
                );
                outcome.images.extend(series.page_paths());
                outcome.failures.push(FailedUnit {
                    path: merged_output_path(&series).display().to_string(),
                    reason: error_chain(&err),
                });
            }
        }
    }

    outcome
        .images
        .extend(partition.remainder.into_iter().map(|page| page.path));
    outcome.images.sort();
    outcome
}

fn report_missing_pdfs(catalog: &Catalog, manifest: &mut ScanManifest, dry_run: bool) {
    let missing = catalog.missing_pdfs();
    if missing.is_empty() {
        return;
    }

    if !dry_run {
        warn!(count = missing.len(), "not all images have corresponding PDFs");
        for image in &missing {
            warn!(path = %image.display(), "image has no PDF");
        }
        manifest.warnings.push(format!(
            "{} image(s) still have no corresponding PDF",
            missing.len()
        ));
    }
    manifest.missing_pdfs = display_paths(&missing);
}

fn consolidated_entry(document: &ConsolidatedDocument) -> ConsolidatedEntry {
    ConsolidatedEntry {
        output_path: document.output_path.display().to_string(),
        source_pages: document
            .source_pages
            .iter()
            .map(|page| page.path.display().to_string())
            .collect(),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn log_outcome(manifest: &ScanManifest) {
    info!(
        consolidated = manifest.consolidated.len(),
        failed_series = manifest.failed_series.len(),
        rendered = manifest.rendered_pdfs.len(),
        failed_renders = manifest.failed_renders.len(),
        missing_pdfs = manifest.missing_pdfs.len(),
        pdf_count = manifest.pdf_count,
        "scan completed"
    );
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;
    use crate::error::{MergeError, OcrError, ToolError};

    struct ConcatMerger;

    impl ImageMerger for ConcatMerger {
        fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf, MergeError> {
            let mut bytes = Vec::new();
            for page in pages {
                bytes.extend(fs::read(page).unwrap());
            }
            fs::write(output, bytes).unwrap();
            Ok(output.to_path_buf())
        }
    }

    struct FailingMerger;

    impl ImageMerger for FailingMerger {
        fn merge(&self, _pages: &[PathBuf], output: &Path) -> Result<PathBuf, MergeError> {
            Err(MergeError::Tool {
                output: output.to_path_buf(),
                source: ToolError::Status {
                    program: "convert".to_string(),
                    code: Some(1),
                    stderr: String::new(),
                },
            })
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        fail: bool,
        rendered: RefCell<Vec<PathBuf>>,
    }

    impl PdfRenderer for RecordingRenderer {
        fn render(&self, image: &Path) -> Result<PathBuf, OcrError> {
            self.rendered.borrow_mut().push(image.to_path_buf());
            if self.fail {
                return Err(OcrError::MissingOutput {
                    output: image.with_extension("pdf"),
                });
            }
            let pdf = image.with_extension("pdf");
            fs::write(&pdf, b"%PDF-1.4").unwrap();
            Ok(pdf)
        }
    }

    fn touch(root: &Path, names: &[&str]) {
        for name in names {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, name.as_bytes()).unwrap();
        }
    }

    fn listing(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn scan_consolidates_series_and_renders_missing_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(
            root,
            &[
                "D/a_1.png",
                "D/a_2.png",
                "D/a_3.png",
                "D/b_1.png",
                "D/b_3.png",
                "D/letter.jpg",
                "D/letter.pdf",
            ],
        );

        let renderer = RecordingRenderer::default();
        let outcome = scan_tree(
            root,
            &SeriesConsolidator::new(ConcatMerger),
            &renderer,
            ScanOptions::default(),
        )
        .unwrap();

        assert_eq!(
            listing(root),
            vec![
                "D/a.pdf",
                "D/a.tiff",
                "D/b_1.pdf",
                "D/b_1.png",
                "D/b_3.pdf",
                "D/b_3.png",
                "D/letter.jpg",
                "D/letter.pdf",
            ]
        );
        assert_eq!(
            *renderer.rendered.borrow(),
            vec![root.join("D/a.tiff"), root.join("D/b_1.png"), root.join("D/b_3.png")]
        );
        assert_eq!(outcome.manifest.consolidated.len(), 1);
        assert_eq!(outcome.manifest.consolidated[0].source_pages.len(), 3);
        assert!(outcome.manifest.missing_pdfs.is_empty());
        assert_eq!(outcome.pdfs.len(), 4);
    }

    #[test]
    fn second_scan_of_consolidated_tree_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["D/a_1.png", "D/a_2.png", "E/x_1.tif", "E/x_2.tif"]);

        let consolidator = SeriesConsolidator::new(ConcatMerger);
        scan_tree(root, &consolidator, &RecordingRenderer::default(), ScanOptions::default())
            .unwrap();
        let before = listing(root);

        let renderer = RecordingRenderer::default();
        let outcome = scan_tree(root, &consolidator, &renderer, ScanOptions::default()).unwrap();

        assert_eq!(listing(root), before);
        assert!(outcome.manifest.consolidated.is_empty());
        assert!(outcome.manifest.failed_series.is_empty());
        assert!(renderer.rendered.borrow().is_empty());
    }

    #[test]
    fn merge_failure_leaves_directory_untouched_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["D/a_1.png", "D/a_2.png", "D/a_3.png"]);

        let renderer = RecordingRenderer {
            fail: true,
            ..Default::default()
        };
        let outcome = scan_tree(
            root,
            &SeriesConsolidator::new(FailingMerger),
            &renderer,
            ScanOptions::default(),
        )
        .unwrap();

        assert_eq!(listing(root), vec!["D/a_1.png", "D/a_2.png", "D/a_3.png"]);
        assert_eq!(outcome.manifest.failed_series.len(), 1);
        assert!(outcome.manifest.failed_series[0].reason.contains("impossible for a"));
        // Every page was still tried individually by OCR.
        assert_eq!(renderer.rendered.borrow().len(), 3);
        assert_eq!(outcome.manifest.failed_renders.len(), 3);
        assert_eq!(outcome.manifest.missing_pdfs.len(), 3);
        assert_eq!(outcome.manifest.warnings.len(), 1);
    }

    #[test]
    fn dry_run_plans_without_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["D/a_1.png", "D/a_2.png", "D/solo.jpg"]);

        let renderer = RecordingRenderer::default();
        let outcome = scan_tree(
            root,
            &SeriesConsolidator::new(ConcatMerger),
            &renderer,
            ScanOptions {
                force_ocr: false,
                dry_run: true,
            },
        )
        .unwrap();

        assert_eq!(listing(root), vec!["D/a_1.png", "D/a_2.png", "D/solo.jpg"]);
        assert_eq!(outcome.manifest.consolidated.len(), 1);
        assert_eq!(
            outcome.manifest.consolidated[0].output_path,
            root.join("D/a.tiff").display().to_string()
        );
        assert!(renderer.rendered.borrow().is_empty());
        assert!(outcome.manifest.warnings.is_empty());
    }

    #[test]
    fn force_ocr_renders_images_that_already_have_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["scan.png", "scan.pdf"]);

        let renderer = RecordingRenderer::default();
        scan_tree(
            root,
            &SeriesConsolidator::new(ConcatMerger),
            &renderer,
            ScanOptions {
                force_ocr: true,
                dry_run: false,
            },
        )
        .unwrap();

        assert_eq!(*renderer.rendered.borrow(), vec![root.join("scan.png")]);
    }

    #[test]
    fn consolidate_directory_returns_outputs_and_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["a_1.png", "a_2.png", "b_1.png", "b_3.png", "cover.png"]);
        let images: Vec<PathBuf> = ["a_1.png", "a_2.png", "b_1.png", "b_3.png", "cover.png"]
            .iter()
            .map(|name| root.join(name))
            .collect();

        let outcome =
            consolidate_directory(root, &images, &SeriesConsolidator::new(ConcatMerger), false);

        assert_eq!(
            outcome.images,
            vec![
                root.join("a.tiff"),
                root.join("b_1.png"),
                root.join("b_3.png"),
                root.join("cover.png")
            ]
        );
        assert_eq!(outcome.consolidated.len(), 1);
        assert!(outcome.failures.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_warned_about_and_siblings_still_scanned() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, &["D/a_1.png", "D/a_2.png"]);
        let locked = root.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let enforced = fs::read_dir(&locked).is_err();

        let outcome = scan_tree(
            root,
            &SeriesConsolidator::new(ConcatMerger),
            &RecordingRenderer::default(),
            ScanOptions::default(),
        );
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let outcome = outcome.unwrap();

        assert_eq!(outcome.manifest.consolidated.len(), 1);
        assert_eq!(outcome.pdfs, vec![root.join("D/a.pdf")]);
        let warned = outcome
            .manifest
            .warnings
            .iter()
            .any(|warning| warning.contains("unreadable") && warning.contains("locked"));
        assert_eq!(warned, enforced);
    }
}

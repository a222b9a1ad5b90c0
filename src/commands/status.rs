use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::scan::LATEST_SCAN_MANIFEST;
use crate::model::ScanManifest;
use crate::store::DocumentStore;
use crate::tools::command_available;
use crate::util::{default_db_path, manifest_dir};

const EXTERNAL_TOOLS: [&str; 3] = ["pdftotext", "tesseract", "convert"];

pub fn run(args: StatusArgs) -> Result<()> {
    let scan_manifest_path = manifest_dir(&args.root).join(LATEST_SCAN_MANIFEST);
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.root));

    info!(root = %args.root.display(), "status requested");

    for program in EXTERNAL_TOOLS {
        if command_available(program) {
            info!(program, "external tool available");
        } else {
            warn!(program, "external tool not found on PATH");
        }
    }

    if scan_manifest_path.exists() {
        let raw = fs::read(&scan_manifest_path)
            .with_context(|| format!("failed to read {}", scan_manifest_path.display()))?;
        let manifest: ScanManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", scan_manifest_path.display()))?;

        info!(
            generated_at = %manifest.generated_at,
            pdf_count = manifest.pdf_count,
            image_count = manifest.image_count,
            consolidated = manifest.consolidated.len(),
            failed_series = manifest.failed_series.len(),
            failed_renders = manifest.failed_renders.len(),
            missing_pdfs = manifest.missing_pdfs.len(),
            "loaded last scan manifest"
        );
        for warning in &manifest.warnings {
            warn!(warning = %warning, "last scan warning");
        }
    } else {
        warn!(path = %scan_manifest_path.display(), "scan manifest missing");
    }

    if db_path.exists() {
        let store = DocumentStore::open(&db_path)?;
        info!(
            path = %db_path.display(),
            schema_version = %store.schema_version()?.unwrap_or_default(),
            docs = store.count()?,
            distinct_contents = store.distinct_hash_count()?,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

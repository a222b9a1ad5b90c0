use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog;
use crate::cli::SuggestArgs;
use crate::commands::scan::{self, ScanOptions};
use crate::corpus::CorpusTrainer;
use crate::error::ExtractionError;
use crate::extract::{Pdftotext, TextExtractor, is_blank_text};
use crate::model::DocumentSuggestions;
use crate::ranking::rank_folders;
use crate::scorer::{BayesScorer, SimilarityScorer};
use crate::store::DocumentStore;
use crate::util::{default_db_path, sha256_file};

#[derive(Debug, Serialize)]
struct SuggestResponse {
    label_by: String,
    top_k: usize,
    trained_documents: usize,
    skipped_documents: usize,
    results: Vec<SuggestResult>,
}

#[derive(Debug, Serialize)]
struct SuggestResult {
    #[serde(flatten)]
    suggestions: DocumentSuggestions,
    duplicate_of: Option<String>,
}

pub fn run(args: SuggestArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.root));
    if !db_path.exists() {
        bail!(
            "no document store at {}; run `paperfile index` on the filed documents first",
            db_path.display()
        );
    }

    let store = DocumentStore::open(&db_path)?;
    let documents = store.get_all()?;

    let mut trainer = CorpusTrainer::new(BayesScorer::new()?, args.label_by);
    info!(documents = documents.len(), "training existing DB");
    let stats = trainer.train_all(&documents);
    info!(
        trained = stats.trained,
        skipped_empty = stats.skipped_empty,
        labels = trainer.scorer().label_count(),
        label_by = args.label_by.as_str(),
        "training completed"
    );
    if stats.trained == 0 {
        warn!("no trained documents; every ranking will be empty");
    }

    let candidates = if !args.files.is_empty() {
        args.files.clone()
    } else if args.skip_scan {
        catalog::scan(&args.root)?.pdfs
    } else {
        scan::scan_with_tools(
            &args.root,
            &args.tools,
            ScanOptions {
                force_ocr: args.tools.force_ocr,
                dry_run: false,
            },
        )?
        .pdfs
    };

    let extractor = Pdftotext::new(args.tools.timeout());
    let mut results = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let duplicate_of = match sha256_file(candidate) {
            Ok(hash) => store.path_for_hash(&hash)?,
            Err(err) => {
                warn!(path = %candidate.display(), error = %format!("{err:#}"), "skipping document");
                continue;
            }
        };

        match suggest_for(&trainer, &extractor, candidate, args.top_k) {
            Ok(suggestions) => results.push(SuggestResult {
                suggestions,
                duplicate_of,
            }),
            Err(err) => {
                warn!(path = %candidate.display(), error = %err, "skipping document");
            }
        }
    }

    let response = SuggestResponse {
        label_by: args.label_by.as_str().to_string(),
        top_k: args.top_k,
        trained_documents: stats.trained,
        skipped_documents: stats.skipped_empty,
        results,
    };

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

/// Extracts the text of one new document and ranks candidate folders for it.
pub fn suggest_for<S: SimilarityScorer, E: TextExtractor>(
    trainer: &CorpusTrainer<S>,
    extractor: &E,
    document: &Path,
    top_k: usize,
) -> Result<DocumentSuggestions, ExtractionError> {
    let text = extractor.extract_text(document)?;
    if is_blank_text(&text) {
        return Err(ExtractionError::Empty {
            path: document.to_path_buf(),
        });
    }

    let scores = trainer.scorer().score(&text);
    Ok(DocumentSuggestions {
        document: document.display().to_string(),
        suggestions: rank_folders(&scores, trainer.label_by(), top_k),
    })
}

fn write_json_response(response: &SuggestResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize suggestion json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &SuggestResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    for (index, result) in response.results.iter().enumerate() {
        writeln!(output, "New document {}: {}", index, result.suggestions.document)?;
        if let Some(existing) = &result.duplicate_of {
            writeln!(output, "Already filed as: {existing}")?;
        }
        if result.suggestions.suggestions.is_empty() {
            writeln!(output, "No path suggestion")?;
            continue;
        }
        writeln!(output, "Path suggestion:")?;
        for (rank, suggestion) in result.suggestions.suggestions.iter().enumerate() {
            writeln!(
                output,
                "[{}] Move into folder: {} (score {:.1})",
                rank, suggestion.folder, suggestion.score
            )?;
        }
    }

    output.flush()?;
    Ok(())
}

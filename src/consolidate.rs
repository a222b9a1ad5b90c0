use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ConsolidationError, MergeError};
use crate::model::{ConsolidatedDocument, SeriesCandidate};
use crate::tools::run_tool;

pub const MERGED_EXTENSION: &str = "tiff";

/// Merges ordered page images into one multi-page image at `output`.
pub trait ImageMerger {
    fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf, MergeError>;
}

/// ImageMagick `convert <pages...> <output>`.
#[derive(Debug, Clone)]
pub struct ImageMagickMerger {
    program: String,
    timeout: Option<Duration>,
}

impl ImageMagickMerger {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl ImageMerger for ImageMagickMerger {
    fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf, MergeError> {
        let mut command = Command::new(&self.program);
        command.args(pages).arg(output);

        run_tool(command, self.timeout).map_err(|source| MergeError::Tool {
            output: output.to_path_buf(),
            source,
        })?;

        Ok(output.to_path_buf())
    }
}

pub fn merged_output_path(series: &SeriesCandidate) -> PathBuf {
    series
        .directory
        .join(format!("{}.{}", series.basename, MERGED_EXTENSION))
}

pub struct SeriesConsolidator<M> {
    merger: M,
}

impl<M: ImageMerger> SeriesConsolidator<M> {
    pub fn new(merger: M) -> Self {
        Self { merger }
    }

    /// Merges the series, verifies the merged file exists, then removes the
    /// page files. Nothing is deleted unless the merge produced its output.
    pub fn consolidate(
        &self,
        series: &SeriesCandidate,
    ) -> Result<ConsolidatedDocument, ConsolidationError> {
        let output = merged_output_path(series);
        if output.exists() {
            return Err(ConsolidationError::OutputExists {
                basename: series.basename.clone(),
                output,
            });
        }

        let pages = series.page_paths();
        let merged = self
            .merger
            .merge(&pages, &output)
            .and_then(|merged| {
                if merged.is_file() {
                    Ok(merged)
                } else {
                    Err(MergeError::MissingOutput { output: merged })
                }
            });

        let merged = match merged {
            Ok(merged) => merged,
            Err(source) => {
                remove_partial_output(&output);
                return Err(ConsolidationError::Merge {
                    basename: series.basename.clone(),
                    source,
                });
            }
        };

        let mut removed = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            info!(path = %page.display(), "deleting merged page file");
            if let Err(source) = fs::remove_file(page) {
                return Err(ConsolidationError::Cleanup {
                    basename: series.basename.clone(),
                    removed,
                    remaining: pages[index..].to_vec(),
                    source,
                });
            }
            removed.push(page.clone());
        }

        Ok(ConsolidatedDocument {
            output_path: merged,
            source_pages: series.pages.clone(),
        })
    }
}

fn remove_partial_output(output: &Path) {
    if !output.exists() {
        return;
    }
    if let Err(err) = fs::remove_file(output) {
        warn!(path = %output.display(), error = %err, "failed to remove partial merge output");
    }
}

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read output of {program}: {source}")]
    Output {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} returned non-zero exit status {code:?}: {stderr}")]
    Status {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("text extraction failed for {path}")]
    Tool {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("extracted text for {path} is empty")]
    Empty { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("image merge into {output} failed")]
    Tool {
        output: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("image merge reported success but {output} was not produced")]
    MissingOutput { output: PathBuf },
}

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("conversion to multipage TIFF impossible for {basename}")]
    Merge {
        basename: String,
        #[source]
        source: MergeError,
    },

    #[error("refusing to consolidate {basename}: {output} already exists")]
    OutputExists { basename: String, output: PathBuf },

    #[error(
        "merged {basename} but could not remove {} of its page files",
        remaining.len()
    )]
    Cleanup {
        basename: String,
        removed: Vec<PathBuf>,
        remaining: Vec<PathBuf>,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR rendering failed for {image}")]
    Tool {
        image: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("OCR reported success but {output} was not produced")]
    MissingOutput { output: PathBuf },
}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::model::LabelBy;
use crate::ranking::DEFAULT_TOP_K;

#[derive(Parser, Debug)]
#[command(
    name = "paperfile",
    version,
    about = "Consolidate scanned papers, index them, and suggest where new ones belong"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge page-image series and OCR images that have no PDF yet.
    Scan(ScanArgs),
    /// Scan, then extract and store every PDF under the root.
    Index(IndexArgs),
    /// Rank existing folders for each new PDF.
    Suggest(SuggestArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    #[arg(long, default_value = "fra")]
    pub ocr_lang: String,

    /// Render a PDF for every image, not only those missing one.
    #[arg(long, default_value_t = false)]
    pub force_ocr: bool,

    #[arg(long, default_value = "convert")]
    pub convert_program: String,

    /// Kill external tools (convert, tesseract, pdftotext) after this long.
    #[arg(long)]
    pub tool_timeout_secs: Option<u64>,
}

impl ToolArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub skip_scan: bool,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SuggestArgs {
    /// Directory holding the newly arrived documents.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Store of already filed documents; defaults to the one under --root.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Suggest for these PDFs instead of every PDF under --root.
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, value_enum, default_value_t = LabelBy::Document)]
    pub label_by: LabelBy,

    #[arg(long, default_value_t = false)]
    pub skip_scan: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

use std::path::Path;

use tracing::debug;

use crate::extract::is_blank_text;
use crate::model::{Document, LabelBy};
use crate::scorer::SimilarityScorer;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrainingStats {
    pub trained: usize,
    pub skipped_empty: usize,
}

/// Folder part of a stored document path: everything before the last
/// component. A bare filename has the empty folder.
pub fn folder_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|parent| parent.display().to_string())
        .unwrap_or_default()
}

pub fn label_for(document_path: &str, label_by: LabelBy) -> String {
    match label_by {
        LabelBy::Document => document_path.to_string(),
        LabelBy::Folder => folder_of(document_path),
    }
}

/// Owns one scorer for the lifetime of a filing session.
pub struct CorpusTrainer<S> {
    scorer: S,
    label_by: LabelBy,
    stats: TrainingStats,
}

impl<S: SimilarityScorer> CorpusTrainer<S> {
    pub fn new(scorer: S, label_by: LabelBy) -> Self {
        Self {
            scorer,
            label_by,
            stats: TrainingStats::default(),
        }
    }

    /// Returns false when the document carried no usable text.
    pub fn train_document(&mut self, document: &Document) -> bool {
        if is_blank_text(&document.text) {
            debug!(path = %document.path, "skipping document without text");
            self.stats.skipped_empty += 1;
            return false;
        }

        let label = label_for(&document.path, self.label_by);
        self.scorer.train(&label, &document.text);
        self.stats.trained += 1;
        true
    }

    pub fn train_all<'a, I>(&mut self, documents: I) -> TrainingStats
    where
        I: IntoIterator<Item = &'a Document>,
    {
        for document in documents {
            self.train_document(document);
        }
        self.stats
    }

    pub fn label_by(&self) -> LabelBy {
        self.label_by
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }
}

use std::collections::{BTreeMap, HashMap};

use crate::corpus::folder_of;
use crate::model::{FolderSuggestion, LabelBy};

pub const DEFAULT_TOP_K: usize = 4;

/// Sums label scores per folder. Folders with many weak matches can outrank
/// a folder with a single strong one.
pub fn aggregate_by_folder(
    scores: &HashMap<String, f64>,
    label_by: LabelBy,
) -> BTreeMap<String, f64> {
    // Walk labels in sorted order so float sums are reproducible.
    let ordered: BTreeMap<&String, f64> = scores.iter().map(|(k, v)| (k, *v)).collect();

    let mut folders = BTreeMap::<String, f64>::new();
    for (label, score) in ordered {
        let folder = match label_by {
            LabelBy::Document => folder_of(label),
            LabelBy::Folder => label.clone(),
        };
        *folders.entry(folder).or_insert(0.0) += score;
    }
    folders
}

/// Folders ordered by descending aggregated score, ties by folder path,
/// truncated to `top_k`.
pub fn rank_folders(
    scores: &HashMap<String, f64>,
    label_by: LabelBy,
    top_k: usize,
) -> Vec<FolderSuggestion> {
    let mut ranked: Vec<FolderSuggestion> = aggregate_by_folder(scores, label_by)
        .into_iter()
        .map(|(folder, score)| FolderSuggestion { folder, score })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.folder.cmp(&b.folder))
    });
    ranked.truncate(top_k);
    ranked
}

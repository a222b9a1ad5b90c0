use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::{PageImage, SeriesCandidate};

pub const MIN_SERIES_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRejection {
    TooFewPages,
    DoesNotStartAtOne,
    NotContiguous,
    MixedExtensions,
}

impl SeriesRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooFewPages => "too_few_pages",
            Self::DoesNotStartAtOne => "does_not_start_at_one",
            Self::NotContiguous => "not_contiguous",
            Self::MixedExtensions => "mixed_extensions",
        }
    }
}

/// Outcome of series detection for one directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeriesPartition {
    pub series: Vec<SeriesCandidate>,
    pub remainder: Vec<PageImage>,
}

/// Splits a file stem at its last underscore into `(basename, number)`.
///
/// The tail must be a non-empty run of ASCII digits that fits in a `u32`;
/// anything else yields no number.
pub fn split_page_stem(stem: &str) -> (&str, Option<u32>) {
    let Some((basename, tail)) = stem.rsplit_once('_') else {
        return (stem, None);
    };

    if basename.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return (stem, None);
    }

    match tail.parse::<u32>() {
        Ok(number) => (basename, Some(number)),
        Err(_) => (stem, None),
    }
}

impl PageImage {
    pub fn from_path(path: &Path) -> PageImage {
        let stem = path
            .file_stem()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (basename, sequence_number) = split_page_stem(&stem);

        PageImage {
            path: path.to_path_buf(),
            basename: basename.to_string(),
            sequence_number,
            extension,
        }
    }
}

/// True iff `numbers` is exactly `{1, ..., n}` where `n = numbers.len()`.
///
/// Sum and maximum alone are not enough: `{1, 1, 4, 4}` has the same sum and
/// maximum as `{1, 2, 3, 4}`, so the sorted values are compared position by
/// position.
pub fn is_complete_numbering(numbers: &[u32]) -> bool {
    if numbers.is_empty() {
        return false;
    }
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();

    sorted.iter().zip(1_u32..).all(|(&value, expected)| value == expected)
}

pub fn validate_group(pages: &[PageImage]) -> Result<(), SeriesRejection> {
    if pages.len() < MIN_SERIES_LEN {
        return Err(SeriesRejection::TooFewPages);
    }

    let mut numbers: Vec<u32> = pages.iter().filter_map(|page| page.sequence_number).collect();
    numbers.sort_unstable();

    if numbers.first() != Some(&1) {
        return Err(SeriesRejection::DoesNotStartAtOne);
    }
    if numbers.len() != pages.len() || !is_complete_numbering(&numbers) {
        return Err(SeriesRejection::NotContiguous);
    }

    let extensions: BTreeSet<&str> = pages.iter().map(|page| page.extension.as_str()).collect();
    if extensions.len() != 1 {
        return Err(SeriesRejection::MixedExtensions);
    }

    Ok(())
}

/// Partitions the page images of a single directory into valid series and
/// the images left untouched.
///
/// Images without a numeric tail never join a group. A group that fails
/// validation is passed through whole; no partial series is recovered.
pub fn detect_series(directory: &Path, images: Vec<PageImage>) -> SeriesPartition {
    let mut partition = SeriesPartition::default();
    let mut groups: BTreeMap<String, Vec<PageImage>> = BTreeMap::new();

    for image in images {
        if image.sequence_number.is_some() {
            groups.entry(image.basename.clone()).or_default().push(image);
        } else {
            partition.remainder.push(image);
        }
    }

    for (basename, mut pages) in groups {
        match validate_group(&pages) {
            Ok(()) => {
                pages.sort_by_key(|page| page.sequence_number);
                let extension = pages[0].extension.clone();
                debug!(
                    directory = %directory.display(),
                    basename = %basename,
                    pages = pages.len(),
                    "valid series"
                );
                partition.series.push(SeriesCandidate {
                    directory: directory.to_path_buf(),
                    basename,
                    extension,
                    pages,
                });
            }
            Err(rejection) => {
                if pages.len() >= MIN_SERIES_LEN {
                    debug!(
                        directory = %directory.display(),
                        basename = %basename,
                        reason = rejection.as_str(),
                        "not a series"
                    );
                }
                partition.remainder.extend(pages);
            }
        }
    }

    partition.remainder.sort_by(|a, b| a.path.cmp(&b.path));
    partition
}

pub fn detect_series_in(directory: &Path, paths: &[PathBuf]) -> SeriesPartition {
    let images = paths.iter().map(|path| PageImage::from_path(path)).collect();
    detect_series(directory, images)
}

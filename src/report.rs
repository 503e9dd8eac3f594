//! Run summary and the optional JSON index written next to the output.

use crate::error::Result;
use crate::model::{Document, PageSize, SkipCounts};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub index: usize,
    pub size: PageSize,
    pub words: usize,
    pub skipped: SkipCounts,
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub page_count: usize,
    /// Pages the side-car had no block for.
    pub padded_pages: usize,
    /// Side-car pages beyond the background page count.
    pub dropped_pages: usize,
    pub word_count: usize,
    pub skipped: SkipCounts,
    pub pages: Vec<PageSummary>,
}

impl RunSummary {
    pub fn new(
        input: &Path,
        output: &Path,
        document: &Document,
        padded_pages: usize,
        dropped_pages: usize,
    ) -> Self {
        let mut skipped = SkipCounts::default();
        let pages = document
            .pages
            .iter()
            .map(|page| {
                skipped.add(page.skipped);
                PageSummary {
                    index: page.index,
                    size: page.size,
                    words: page.words.len(),
                    skipped: page.skipped,
                }
            })
            .collect();

        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            page_count: document.pages.len(),
            padded_pages,
            dropped_pages,
            word_count: document.word_count(),
            skipped,
            pages,
        }
    }
}

/// Writes the summary as pretty-printed JSON.
pub fn write_index(summary: &RunSummary, path: &Path) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    info!("Wrote run index to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, Page, Word};

    fn document() -> Document {
        let bbox = BoundingBox::new(0, 0, 10, 10).unwrap();
        Document {
            pages: vec![
                Page {
                    index: 0,
                    size: PageSize { width: 100.0, height: 200.0 },
                    reference: None,
                    words: vec![Word::new(bbox, "a"), Word::new(bbox, "b")],
                    skipped: SkipCounts { bbox: 1, empty: 2 },
                },
                Page {
                    index: 1,
                    size: PageSize { width: 100.0, height: 200.0 },
                    reference: None,
                    words: Vec::new(),
                    skipped: SkipCounts::default(),
                },
            ],
        }
    }

    #[test]
    fn summarizes_pages_and_skips() {
        let summary = RunSummary::new(Path::new("in.pdf"), Path::new("in-readable.pdf"), &document(), 1, 0);
        assert_eq!(summary.page_count, 2);
        assert_eq!(summary.word_count, 2);
        assert_eq!(summary.skipped, SkipCounts { bbox: 1, empty: 2 });
        assert_eq!(summary.pages[1].words, 0);
        assert_eq!(summary.padded_pages, 1);
    }

    #[test]
    fn index_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in-readable.json");
        let summary = RunSummary::new(Path::new("in.pdf"), Path::new("in-readable.pdf"), &document(), 0, 0);
        write_index(&summary, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["page_count"], 2);
        assert_eq!(value["pages"][0]["skipped"]["empty"], 2);
        assert_eq!(value["pages"][0]["size"]["width"], 100.0);
    }
}

//! Pipeline Driver
//!
//! Sequences one run: OCR, side-car extraction, reshaping, page composition
//! and the final write. All intermediate files live in a scoped work
//! directory that is removed however the run ends, and the output only
//! appears under its final name once every page is composed.

use crate::background::{BackgroundSource, Rasterizer};
use crate::document_builder;
use crate::error::{Error, Result};
use crate::hocr;
use crate::model::{Document, Page, SidecarPage};
use crate::ocr::OcrEngine;
use crate::report::{self, RunSummary};
use crate::reshaper::Reshaper;
use crate::Config;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    OcrInvoked,
    Extracted,
    Reshaped,
    /// Number of pages composed.
    Composited(usize),
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::OcrInvoked => write!(f, "ocr-invoked"),
            Stage::Extracted => write!(f, "extracted"),
            Stage::Reshaped => write!(f, "reshaped"),
            Stage::Composited(n) => write!(f, "composited({n})"),
            Stage::Finalized => write!(f, "finalized"),
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Pipeline stage {} -> {}", stage, next);
    *stage = next;
}

/// Side-car pages matched to the background page count.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub pages: Vec<SidecarPage>,
    pub padded: usize,
    pub dropped: usize,
}

/// The background decides how many pages there are: missing side-car pages
/// become empty pages, surplus ones are discarded.
pub fn reconcile(mut pages: Vec<SidecarPage>, background_pages: usize) -> Reconciled {
    let found = pages.len();
    let dropped = found.saturating_sub(background_pages);
    let padded = background_pages.saturating_sub(found);

    if dropped > 0 {
        warn!(
            "OCR side-car has {} pages but the scan has {}; ignoring the last {}.",
            found, background_pages, dropped
        );
        pages.truncate(background_pages);
    }
    if padded > 0 {
        warn!(
            "OCR side-car has {} pages but the scan has {}; {} pages get no text.",
            found, background_pages, padded
        );
        pages.resize_with(background_pages, SidecarPage::default);
    }

    Reconciled {
        pages,
        padded,
        dropped,
    }
}

/// Pairs every background page with its side-car words.
pub fn assemble(pages: Vec<SidecarPage>, background: &dyn BackgroundSource) -> Result<Document> {
    let pages = pages
        .into_iter()
        .enumerate()
        .map(|(index, sidecar)| -> Result<Page> {
            let size = background.page_size(index)?;
            Ok(Page::from_sidecar(index, size, sidecar))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Document { pages })
}

/// Fills in the logical text of every word.
pub fn reshape(document: &mut Document, reshaper: &Reshaper) {
    for word in document.words_mut() {
        word.logical = Some(reshaper.logical_text(&word.visual));
    }
}

/// Writes `bytes` to a temporary file beside `path` and renames it into
/// place, so `path` never holds a partial document.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn progress_bar(pages: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(pages as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Composing pages [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar
}

/// Checks the configuration and the input before any work starts.
pub fn preflight(config: &Config) -> Result<()> {
    config.validate()?;
    if !config.input_file.is_file() {
        return Err(Error::InputNotFound(config.input_file.clone()));
    }
    Ok(())
}

/// Runs the whole pipeline for `config.input_file`: `engine` recognizes the
/// input, `rasterizer` renders the engine's image-only PDF.
pub fn process(engine: &dyn OcrEngine, rasterizer: &dyn Rasterizer, config: &Config) -> Result<RunSummary> {
    let mut stage = Stage::Init;
    preflight(config)?;
    let output_path = config.output_path();

    let workdir = tempfile::Builder::new().prefix("rtlpdf-").tempdir()?;
    debug!("Work directory {:?}", workdir.path());

    let artifacts = engine.recognize(&config.input_file, &config.lang, workdir.path())?;
    advance(&mut stage, Stage::OcrInvoked);

    let extraction = hocr::parse_file(&artifacts.sidecar)?;
    let background = rasterizer.open(&artifacts.image_pdf)?;
    let reconciled = reconcile(extraction.pages, background.page_count());
    let mut document = assemble(reconciled.pages, background.as_ref())?;
    advance(&mut stage, Stage::Extracted);

    reshape(&mut document, &Reshaper::new(config.keep_harakat));
    info!("Reshaped {} words into logical order.", document.word_count());
    advance(&mut stage, Stage::Reshaped);

    let progress = progress_bar(document.pages.len(), config.show_progress);
    let bytes = document_builder::build_pdf(&document, background.as_ref(), &config.layout, &progress)?;
    progress.finish_and_clear();
    advance(&mut stage, Stage::Composited(document.pages.len()));

    write_atomically(&output_path, &bytes)?;
    info!("Wrote {} pages to {:?}", document.pages.len(), output_path);

    let summary = RunSummary::new(
        &config.input_file,
        &output_path,
        &document,
        reconciled.padded,
        reconciled.dropped,
    );
    if config.generate_index {
        report::write_index(&summary, &config.index_path())?;
    }
    advance(&mut stage, Stage::Finalized);

    drop(background);
    workdir.close()?;
    Ok(summary)
}

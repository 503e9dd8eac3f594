//! rtlpdf - Core Library
//!
//! Gives a scanned right-to-left PDF an invisible text layer in logical
//! reading order. The external OCR engine supplies word boxes and an
//! image-only copy of the input; this crate reshapes and reorders each word
//! and composes new pages with the text hidden behind the scan.

use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

pub mod background;
pub mod document_builder;
pub mod error;
pub mod hocr;
pub mod model;
pub mod ocr;
pub mod pipeline;
pub mod report;
pub mod reshaper;

pub use background::RenderSettings;
pub use document_builder::{FontSize, Layout, MIN_FONT_SIZE};
pub use error::Error;
pub use report::RunSummary;

/// Accepted range for background rendering resolution.
pub const MIN_DPI: f32 = 36.0;
pub const MAX_DPI: f32 = 1200.0;

/// Application configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_file: PathBuf,
    /// Defaults to `<input-stem>-readable.<ext>` next to the input.
    pub output_file: Option<PathBuf>,
    /// OCR language code, e.g. "ara".
    pub lang: String,
    pub ocr_program: PathBuf,
    pub layout: Layout,
    /// Resolution the background pages are rendered at.
    pub render: RenderSettings,
    pub keep_harakat: bool,
    /// Write a JSON index of the run next to the output.
    pub generate_index: bool,
    pub show_progress: bool,
}

impl Config {
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: None,
            lang: "ara".to_string(),
            ocr_program: PathBuf::from("ocrmypdf"),
            layout: Layout::default(),
            render: RenderSettings::default(),
            keep_harakat: false,
            generate_index: false,
            show_progress: false,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| readable_path(&self.input_file))
    }

    /// The JSON index sits beside the output with a `.json` extension.
    pub fn index_path(&self) -> PathBuf {
        self.output_path().with_extension("json")
    }

    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> error::Result<()> {
        let usage = |msg: &str| Err(Error::Usage(msg.to_string()));
        if self.lang.trim().is_empty() {
            return usage("OCR language must not be empty");
        }
        if let FontSize::Fixed(size) = self.layout.font_size {
            if !size.is_finite() || size < MIN_FONT_SIZE {
                return usage(&format!("font size must be at least {MIN_FONT_SIZE}"));
            }
        }
        if !self.render.dpi.is_finite() || !(MIN_DPI..=MAX_DPI).contains(&self.render.dpi) {
            return usage(&format!("rendering DPI must be between {MIN_DPI} and {MAX_DPI}"));
        }
        if !(1..=100).contains(&self.layout.jpeg_quality) {
            return usage("JPEG quality must be between 1 and 100");
        }
        if self.output_path() == self.input_file {
            return usage("output path must differ from the input path");
        }
        Ok(())
    }
}

/// `<stem>-readable.<ext>` in the input's directory; `pdf` when the input
/// has no extension.
pub fn readable_path(input: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("-readable.");
    name.push(input.extension().unwrap_or("pdf".as_ref()));
    input.with_file_name(name)
}

/// Runs the whole pipeline with the `ocrmypdf` engine named in the config
/// and PDFium for rendering.
pub fn run(config: Config) -> Result<RunSummary> {
    info!("Initializing processing with config: {:?}", config);
    let context = || format!("Failed to add a text layer to {:?}", config.input_file);
    pipeline::preflight(&config).with_context(context)?;

    let engine = ocr::OcrMyPdf::new(&config.ocr_program);
    let rasterizer = background::PdfiumRasterizer::bind(config.render).with_context(context)?;
    let summary = pipeline::process(&engine, &rasterizer, &config).with_context(context)?;
    Ok(summary)
}

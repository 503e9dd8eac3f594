//! Error types for rtlpdf.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rtlpdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a run.
///
/// Problems with individual words (bad geometry, empty text) never show up
/// here; the extractor counts and skips them.
#[derive(Error, Debug)]
pub enum Error {
    /// The tool was invoked with invalid arguments.
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// The source path does not resolve to a file.
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The external OCR process could not be started or exited non-zero.
    #[error("OCR engine failed: {0}")]
    OcrEngine(String),

    /// The hOCR side-car is not parseable as hOCR markup.
    #[error("Malformed OCR side-car: {0}")]
    OcrSidecarFormat(String),

    /// A page's background image cannot be decoded.
    #[error("Cannot render background of page {page}: {reason}")]
    ImageRender { page: usize, reason: String },

    /// PDFium could not be bound or could not open the image-only PDF.
    #[error("PDF rasterizer error: {0}")]
    Rasterizer(String),

    /// Error encoding or decoding an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error serializing the JSON index.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            Error::InputNotFound(_) => 3,
            Error::OcrEngine(_) => 4,
            Error::OcrSidecarFormat(_) => 5,
            Error::ImageRender { .. } => 6,
            _ => 1,
        }
    }
}

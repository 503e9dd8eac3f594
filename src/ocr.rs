//! OCR Module
//!
//! Runs the external recognition engine that turns a scanned PDF into an
//! hOCR side-car plus an image-only PDF. The engine sits behind the
//! [`OcrEngine`] trait so the pipeline can be driven with a stand-in.

use crate::error::{Error, Result};
use log::{debug, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// File names the engine writes inside the run's work directory.
pub const SIDECAR_FILE: &str = "scan.hocr";
pub const IMAGE_PDF_FILE: &str = "scan-img.pdf";

/// What a recognition run leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrArtifacts {
    /// Word-level hOCR side-car.
    pub sidecar: PathBuf,
    /// Image-only rendering of the input, one page per output page.
    pub image_pdf: PathBuf,
}

impl OcrArtifacts {
    /// Default artifact locations inside `workdir`.
    pub fn in_dir(workdir: &Path) -> Self {
        Self {
            sidecar: workdir.join(SIDECAR_FILE),
            image_pdf: workdir.join(IMAGE_PDF_FILE),
        }
    }
}

/// A single, synchronous recognition call. Implementations write their
/// outputs under `workdir` and are never retried.
pub trait OcrEngine {
    fn recognize(&self, input: &Path, language: &str, workdir: &Path) -> Result<OcrArtifacts>;
}

/// The `ocrmypdf` command-line tool.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    program: PathBuf,
}

impl OcrMyPdf {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Argument list for one invocation.
    pub fn arguments(input: &Path, language: &str, artifacts: &OcrArtifacts) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-l",
            language,
            "--rotate-pages",
            "--deskew",
            "--force-ocr",
            "--sidecar",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(artifacts.sidecar.clone().into());
        args.push(input.into());
        args.push(artifacts.image_pdf.clone().into());
        args
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new("ocrmypdf")
    }
}

impl OcrEngine for OcrMyPdf {
    fn recognize(&self, input: &Path, language: &str, workdir: &Path) -> Result<OcrArtifacts> {
        let artifacts = OcrArtifacts::in_dir(workdir);
        let args = Self::arguments(input, language, &artifacts);
        info!("Running {:?} on {:?} with language '{}'...", self.program, input, language);
        debug!("OCR arguments: {:?}", args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| Error::OcrEngine(format!("failed to start {:?}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::OcrEngine(format!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        for path in [&artifacts.sidecar, &artifacts.image_pdf] {
            if !path.is_file() {
                return Err(Error::OcrEngine(format!(
                    "{:?} succeeded but did not write {:?}",
                    self.program, path
                )));
            }
        }
        info!("OCR finished, side-car at {:?}", artifacts.sidecar);
        Ok(artifacts)
    }
}

//! Background Module
//!
//! Supplies the per-page scan images the text layer is drawn over. The OCR
//! engine's image-only PDF is authoritative for the page count and page
//! sizes. Pages are rasterized with PDFium, so page rotation, image
//! placement and every image codec PDFium understands are handled the way a
//! viewer would show them.

use crate::error::{Error, Result};
use crate::model::PageSize;
use image::{DynamicImage, RgbaImage};
use log::{debug, info};
use pdfium_render::prelude::*;
use std::path::Path;

/// A page-count-authoritative source of background images.
pub trait BackgroundSource {
    fn page_count(&self) -> usize;

    /// Displayed page width and height in points, after page rotation.
    fn page_size(&self, index: usize) -> Result<PageSize>;

    /// Renders the page's background bitmap, upright.
    fn render_page(&self, index: usize) -> Result<DynamicImage>;
}

/// Opens image-only documents as background sources.
pub trait Rasterizer {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn BackgroundSource + 'a>>;
}

/// Configuration for page rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Rendering resolution.
    pub dpi: f32,
    /// Longest side of a rendered page, in pixels.
    pub max_dimension: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            max_dimension: 10_000,
        }
    }
}

impl RenderSettings {
    /// Pixel size for a page, keeping its aspect ratio under `max_dimension`.
    pub fn target_size(&self, size: PageSize) -> (i32, i32) {
        let scale = self.dpi / 72.0;
        let mut width = (size.width * scale).round().max(1.0);
        let mut height = (size.height * scale).round().max(1.0);

        let max = self.max_dimension as f32;
        if width > max || height > max {
            let ratio = max / width.max(height);
            width = (width * ratio).round().max(1.0);
            height = (height * ratio).round().max(1.0);
        }
        (width as i32, height as i32)
    }
}

/// PDFium bound once per run.
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
    settings: RenderSettings,
}

impl PdfiumRasterizer {
    /// Binds to a PDFium library next to the executable or installed system-wide.
    pub fn bind(settings: RenderSettings) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib")))
            .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/local/lib")))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Error::Rasterizer(format!("could not find the PDFium library: {e}")))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
            settings,
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn BackgroundSource + 'a>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| Error::Rasterizer(format!("cannot load {path:?}: {e}")))?;
        let background = PdfBackground {
            document,
            settings: self.settings,
        };
        info!("Loaded {} background pages from {:?}", background.page_count(), path);
        Ok(Box::new(background))
    }
}

/// An image-only PDF opened with PDFium.
pub struct PdfBackground<'a> {
    document: PdfDocument<'a>,
    settings: RenderSettings,
}

impl<'a> PdfBackground<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>> {
        let render_error = |reason: String| Error::ImageRender { page: index, reason };
        let page_index = index
            .try_into()
            .map_err(|_| render_error("page index out of range".to_string()))?;
        self.document
            .pages()
            .get(page_index)
            .map_err(|e| render_error(e.to_string()))
    }
}

impl BackgroundSource for PdfBackground<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        let page = self.page(index)?;
        Ok(PageSize {
            width: page.width().value,
            height: page.height().value,
        })
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage> {
        let page = self.page(index)?;
        let size = PageSize {
            width: page.width().value,
            height: page.height().value,
        };
        let (width, height) = self.settings.target_size(size);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Error::ImageRender {
                page: index,
                reason: e.to_string(),
            })?;
        let image = to_background(
            bitmap.width() as u32,
            bitmap.height() as u32,
            bitmap.as_rgba_bytes(),
        )
        .ok_or_else(|| Error::ImageRender {
            page: index,
            reason: "bitmap size does not match its pixel buffer".to_string(),
        })?;

        debug!("Rendered background of page {} ({}x{})", index, image.width(), image.height());
        Ok(image)
    }
}

/// Wraps a rendered RGBA buffer, dropping to grayscale when every pixel is gray.
pub fn to_background(width: u32, height: u32, rgba: Vec<u8>) -> Option<DynamicImage> {
    let image = RgbaImage::from_raw(width, height, rgba)?;
    let gray = image.pixels().all(|p| p[0] == p[1] && p[1] == p[2]);
    let image = DynamicImage::ImageRgba8(image);
    Some(if gray {
        DynamicImage::ImageLuma8(image.to_luma8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    })
}

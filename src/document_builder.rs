//! Document Builder Module
//!
//! Composes the output PDF: every page is its scan image stretched over the
//! full page, with each word laid over its bounding box as an invisible text
//! run. The text layer uses a glyphless Identity-H font whose ToUnicode map
//! carries the reshaped, reordered characters, so viewers select, search and
//! copy the logical text.

use crate::background::BackgroundSource;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Document, Frame, Page};
use image::{DynamicImage, ImageOutputFormat};
use indicatif::ProgressBar;
use log::{debug, info};
use pdf_writer::types::{CidFontType, FontFlags, SystemInfo, TextRenderingMode, UnicodeCmap};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str};
use std::collections::BTreeMap;
use std::io::Cursor;

const FONT_NAME: Name<'static> = Name(b"F1");
const FONT_BASE_NAME: Name<'static> = Name(b"GlyphLessFont");
const INVISIBLE_STATE: Name<'static> = Name(b"GS0");
const IMAGE_NAME: Name<'static> = Name(b"Scan");

const SYSTEM_INFO: SystemInfo<'static> = SystemInfo {
    registry: Str(b"Adobe"),
    ordering: Str(b"Identity"),
    supplement: 0,
};

// Advance of every glyph, in 1/1000 of the font size.
const GLYPH_WIDTH: f32 = 500.0;

/// Smallest font size a run is given: the floor for box-derived sizes and
/// the lowest accepted fixed size.
pub const MIN_FONT_SIZE: f32 = 0.5;

/// How large each invisible run is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FontSize {
    /// The same nominal size for every word.
    Fixed(f32),
    /// The word box height, in points.
    BoxHeight,
}

impl Default for FontSize {
    fn default() -> Self {
        FontSize::Fixed(1.0)
    }
}

/// Text-layer and image settings for composition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub font_size: FontSize,
    /// Stretch each run horizontally to the width of its box.
    pub fit_width: bool,
    pub jpeg_quality: u8,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            font_size: FontSize::default(),
            fit_width: false,
            jpeg_quality: 85,
        }
    }
}

/// One positioned, invisible string on a page, in PDF points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    /// Horizontal scaling in percent, when stretched to the box.
    pub horizontal_scaling: Option<f32>,
    pub text: String,
}

/// Converts a top-down image y coordinate to a bottom-up page y coordinate.
pub fn flip_y(y: f32, page_height: f32) -> f32 {
    page_height - y
}

/// Baseline origin of a word box: its left edge and its bottom edge, in
/// page space. `frame` maps reference pixels to points.
pub fn to_page_origin(bbox: &BoundingBox, page_height: f32, frame: &Frame) -> (f32, f32) {
    (frame.x(bbox.x0), flip_y(frame.y(bbox.y1), page_height))
}

/// Lays out the text runs of a page. Pure: the same page and layout always
/// give the same runs.
pub fn text_runs(page: &Page, layout: &Layout) -> Vec<TextRun> {
    let frame = page.frame();
    let (scale_x, scale_y) = frame.scale;
    page.words
        .iter()
        .filter(|w| !w.text().is_empty())
        .map(|word| {
            let (x, y) = to_page_origin(&word.bbox, page.size.height, &frame);
            let font_size = match layout.font_size {
                FontSize::Fixed(size) => size,
                FontSize::BoxHeight => (word.bbox.height() as f32 * scale_y).max(MIN_FONT_SIZE),
            };

            let horizontal_scaling = layout.fit_width.then(|| {
                let natural = word.text().chars().count() as f32 * GLYPH_WIDTH / 1000.0 * font_size;
                let target = word.bbox.width() as f32 * scale_x;
                if natural > 0.0 && target > 0.0 {
                    target / natural * 100.0
                } else {
                    100.0
                }
            });

            TextRun {
                x,
                y,
                font_size,
                horizontal_scaling,
                text: word.text().to_string(),
            }
        })
        .collect()
}

/// Character-to-CID assignment shared by every page of the document.
#[derive(Debug, Default)]
struct GlyphMap {
    ids: BTreeMap<char, u16>,
}

impl GlyphMap {
    /// Encodes `text` as big-endian two-byte CIDs, assigning new ones as needed.
    /// CID 0 stays `.notdef`; characters past the 16-bit range map to it.
    fn encode(&mut self, text: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        for c in text.chars() {
            let next = u16::try_from(self.ids.len() + 1).ok();
            let id = match (self.ids.get(&c), next) {
                (Some(&id), _) => id,
                (None, Some(id)) => {
                    self.ids.insert(c, id);
                    id
                }
                (None, None) => 0,
            };
            bytes.extend_from_slice(&id.to_be_bytes());
        }
        bytes
    }

    fn to_unicode(&self) -> UnicodeCmap {
        let mut cmap = UnicodeCmap::new(Name(b"Rtlpdf-Identity-UCS"), SYSTEM_INFO);
        for (&c, &id) in &self.ids {
            cmap.pair(id, c);
        }
        cmap
    }
}

/// Builds the output PDF for all pages of `document`, in order.
pub fn build_pdf(
    document: &Document,
    background: &dyn BackgroundSource,
    layout: &Layout,
    progress: &ProgressBar,
) -> Result<Vec<u8>> {
    let mut pdf = Pdf::new();
    let mut last_id = 0;
    let mut next_ref = || {
        last_id += 1;
        Ref::new(last_id)
    };

    // Define top-level document objects
    let catalog_ref = next_ref();
    let page_tree_ref = next_ref();
    let font_ref = next_ref();
    let cid_font_ref = next_ref();
    let descriptor_ref = next_ref();
    let cmap_ref = next_ref();
    let state_ref = next_ref();
    pdf.catalog(catalog_ref).pages(page_tree_ref);

    let page_refs: Vec<Ref> = document.pages.iter().map(|_| next_ref()).collect();
    let mut glyphs = GlyphMap::default();

    for (page, &page_ref) in document.pages.iter().zip(&page_refs) {
        let image = background.render_page(page.index)?;
        let refs = PageRefs {
            page: page_ref,
            parent: page_tree_ref,
            content: next_ref(),
            image: next_ref(),
            font: font_ref,
            state: state_ref,
        };
        build_single_page(&mut pdf, refs, page, &image, layout, &mut glyphs)?;
        progress.inc(1);
    }

    pdf.pages(page_tree_ref)
        .kids(page_refs.iter().copied())
        .count(page_refs.len() as i32);

    write_text_font(&mut pdf, font_ref, cid_font_ref, descriptor_ref, cmap_ref, &glyphs);
    pdf.ext_graphics(state_ref)
        .non_stroking_alpha(0.0)
        .stroking_alpha(0.0);

    info!(
        "Composed {} pages with {} distinct text-layer characters.",
        document.pages.len(),
        glyphs.ids.len()
    );
    Ok(pdf.finish())
}

struct PageRefs {
    page: Ref,
    parent: Ref,
    content: Ref,
    image: Ref,
    font: Ref,
    state: Ref,
}

/// Writes the page dictionary, its content stream and its image XObject.
fn build_single_page(
    pdf: &mut Pdf,
    refs: PageRefs,
    page: &Page,
    image: &DynamicImage,
    layout: &Layout,
    glyphs: &mut GlyphMap,
) -> Result<()> {
    let (width, height) = (page.size.width, page.size.height);

    // 1. Page dictionary
    let mut page_writer = pdf.page(refs.page);
    page_writer.media_box(Rect::new(0.0, 0.0, width, height));
    page_writer.parent(refs.parent);
    page_writer.contents(refs.content);
    let mut resources = page_writer.resources();
    resources.fonts().pair(FONT_NAME, refs.font);
    resources.x_objects().pair(IMAGE_NAME, refs.image);
    resources.ext_g_states().pair(INVISIBLE_STATE, refs.state);
    resources.finish();
    page_writer.finish();

    // 2. Background over the whole page, then the invisible text layer
    let mut content = Content::new();
    content.save_state();
    content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
    content.x_object(IMAGE_NAME);
    content.restore_state();

    let runs = text_runs(page, layout);
    if !runs.is_empty() {
        content.save_state();
        content.set_parameters(INVISIBLE_STATE);
        content.begin_text();
        content.set_text_rendering_mode(TextRenderingMode::Invisible);
        for run in &runs {
            content.set_font(FONT_NAME, run.font_size);
            content.set_horizontal_scaling(run.horizontal_scaling.unwrap_or(100.0));
            content.set_text_matrix([1.0, 0.0, 0.0, 1.0, run.x, run.y]);
            content.show(Str(&glyphs.encode(&run.text)));
        }
        content.end_text();
        content.restore_state();
    }
    pdf.stream(refs.content, &content.finish());

    // 3. Image XObject, JPEG-compressed
    let (encoded, gray) = encode_background(image, layout.jpeg_quality).map_err(|e| Error::ImageRender {
        page: page.index,
        reason: e.to_string(),
    })?;
    let mut image_xobject = pdf.image_xobject(refs.image, &encoded);
    image_xobject.filter(Filter::DctDecode);
    image_xobject.width(image.width() as i32);
    image_xobject.height(image.height() as i32);
    if gray {
        image_xobject.color_space().device_gray();
    } else {
        image_xobject.color_space().device_rgb();
    }
    image_xobject.bits_per_component(8);
    image_xobject.finish();

    debug!(
        "Page {}: {}x{} pt, {} text runs, {} image bytes",
        page.index,
        width,
        height,
        runs.len(),
        encoded.len()
    );
    Ok(())
}

/// JPEG-encodes a background, keeping grayscale scans single-channel.
fn encode_background(image: &DynamicImage, quality: u8) -> image::ImageResult<(Vec<u8>, bool)> {
    let gray = matches!(image, DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_));
    let prepared = if gray {
        DynamicImage::ImageLuma8(image.to_luma8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    let mut encoded = Vec::new();
    prepared.write_to(&mut Cursor::new(&mut encoded), ImageOutputFormat::Jpeg(quality))?;
    Ok((encoded, gray))
}

fn write_text_font(
    pdf: &mut Pdf,
    font_ref: Ref,
    cid_font_ref: Ref,
    descriptor_ref: Ref,
    cmap_ref: Ref,
    glyphs: &GlyphMap,
) {
    pdf.type0_font(font_ref)
        .base_font(FONT_BASE_NAME)
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_ref)
        .to_unicode(cmap_ref);

    let mut cid_font = pdf.cid_font(cid_font_ref);
    cid_font.subtype(CidFontType::Type2);
    cid_font.base_font(FONT_BASE_NAME);
    cid_font.system_info(SYSTEM_INFO);
    cid_font.font_descriptor(descriptor_ref);
    cid_font.default_width(GLYPH_WIDTH);
    cid_font.cid_to_gid_map_predefined(Name(b"Identity"));
    cid_font.finish();

    pdf.font_descriptor(descriptor_ref)
        .name(FONT_BASE_NAME)
        .flags(FontFlags::NON_SYMBOLIC)
        .bbox(Rect::new(0.0, 0.0, GLYPH_WIDTH, 1000.0))
        .italic_angle(0.0)
        .ascent(1000.0)
        .descent(0.0)
        .cap_height(1000.0)
        .stem_v(80.0);

    pdf.cmap(cmap_ref, &glyphs.to_unicode().finish());
}

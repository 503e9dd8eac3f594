//! Data Model
//!
//! Words, pages and the document that flow from the hOCR extractor through
//! the reshaper into the page compositor.

use serde::Serialize;

/// Axis-aligned box in OCR reference pixels, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    /// Builds a box, returning `None` when a corner pair is inverted.
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Option<Self> {
        (x0 <= x1 && y0 <= y1).then_some(Self { x0, y0, x1, y1 })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// A single recognized word.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub bbox: BoundingBox,
    /// Text as the OCR engine emitted it.
    pub visual: String,
    /// Text after reshaping and bidi reordering.
    pub logical: Option<String>,
}

impl Word {
    pub fn new(bbox: BoundingBox, visual: impl Into<String>) -> Self {
        Self {
            bbox,
            visual: visual.into(),
            logical: None,
        }
    }

    /// The text that goes into the text layer: logical when reshaped.
    pub fn text(&self) -> &str {
        self.logical.as_deref().unwrap_or(&self.visual)
    }
}

/// Number of word elements the extractor dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    /// Missing, malformed or inverted `bbox`.
    pub bbox: usize,
    /// No text left after stripping.
    pub empty: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.bbox + self.empty
    }

    pub fn add(&mut self, other: SkipCounts) {
        self.bbox += other.bbox;
        self.empty += other.empty;
    }
}

/// One `ocr_page` block of the side-car.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarPage {
    pub words: Vec<Word>,
    /// The page's own bbox: the pixel frame the word boxes refer to.
    pub reference: Option<BoundingBox>,
    pub skipped: SkipCounts,
}

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// A page ready for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Index into the background source.
    pub index: usize,
    pub size: PageSize,
    pub reference: Option<BoundingBox>,
    pub words: Vec<Word>,
    pub skipped: SkipCounts,
}

impl Page {
    pub fn from_sidecar(index: usize, size: PageSize, sidecar: SidecarPage) -> Self {
        Self {
            index,
            size,
            reference: sidecar.reference,
            words: sidecar.words,
            skipped: sidecar.skipped,
        }
    }

    /// How reference pixels map onto this page. 1:1 without a usable
    /// reference box.
    pub fn frame(&self) -> Frame {
        match self.reference {
            Some(r) if r.width() > 0 && r.height() > 0 => Frame {
                origin: (r.x0 as f32, r.y0 as f32),
                scale: (
                    self.size.width / r.width() as f32,
                    self.size.height / r.height() as f32,
                ),
            },
            _ => Frame::IDENTITY,
        }
    }
}

/// Reference-pixel frame of a page: the pixel at `origin` is the page's
/// top-left corner, and `scale` converts pixels to points per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub origin: (f32, f32),
    pub scale: (f32, f32),
}

impl Frame {
    pub const IDENTITY: Frame = Frame {
        origin: (0.0, 0.0),
        scale: (1.0, 1.0),
    };

    /// Horizontal distance from the page's left edge, in points.
    pub fn x(&self, px: u32) -> f32 {
        (px as f32 - self.origin.0) * self.scale.0
    }

    /// Vertical distance from the page's top edge, in points.
    pub fn y(&self, px: u32) -> f32 {
        (px as f32 - self.origin.1) * self.scale.1
    }
}

/// The pages of one run, in background order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn word_count(&self) -> usize {
        self.pages.iter().map(|p| p.words.len()).sum()
    }

    pub fn words_mut(&mut self) -> impl Iterator<Item = &mut Word> {
        self.pages.iter_mut().flat_map(|p| p.words.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_boxes_are_rejected() {
        assert!(BoundingBox::new(10, 0, 5, 20).is_none());
        assert!(BoundingBox::new(0, 30, 5, 20).is_none());
        let b = BoundingBox::new(3, 4, 3, 10).unwrap();
        assert_eq!((b.width(), b.height()), (0, 6));
    }

    #[test]
    fn word_text_prefers_logical() {
        let bbox = BoundingBox::new(0, 0, 1, 1).unwrap();
        let mut word = Word::new(bbox, "abc");
        assert_eq!(word.text(), "abc");
        word.logical = Some("cba".into());
        assert_eq!(word.text(), "cba");
    }

    #[test]
    fn scale_uses_reference_frame() {
        let page = Page {
            index: 0,
            size: PageSize { width: 612.0, height: 792.0 },
            reference: BoundingBox::new(0, 0, 2550, 3300),
            words: Vec::new(),
            skipped: SkipCounts::default(),
        };
        let (sx, sy) = page.frame().scale;
        assert!((sx - 0.24).abs() < 1e-6);
        assert!((sy - 0.24).abs() < 1e-6);

        let unscaled = Page { reference: None, ..page };
        assert_eq!(unscaled.frame(), Frame::IDENTITY);
    }

    #[test]
    fn frame_is_relative_to_the_reference_corner() {
        // A 200x100 px frame starting at (100, 50) on a 400x200 pt page.
        let page = Page {
            index: 0,
            size: PageSize { width: 400.0, height: 200.0 },
            reference: BoundingBox::new(100, 50, 300, 150),
            words: Vec::new(),
            skipped: SkipCounts::default(),
        };
        let frame = page.frame();
        assert_eq!(frame.scale, (2.0, 2.0));
        assert_eq!((frame.x(100), frame.y(50)), (0.0, 0.0));
        assert_eq!((frame.x(300), frame.y(150)), (400.0, 200.0));
        assert_eq!(frame.x(150), 100.0);
    }
}

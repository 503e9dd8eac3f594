//! hOCR Module
//!
//! Extracts per-page word boxes and text from the hOCR side-car written by
//! the OCR engine. The markup is walked with a small lenient tag lexer: only
//! `ocr_page` and `ocrx_word` elements matter, everything else is structure
//! to skip over.

use crate::error::{Error, Result};
use crate::model::{BoundingBox, SidecarPage, SkipCounts, Word};
use log::{debug, info};
use regex::Regex;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static BBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bbox\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)").expect("bbox pattern compiles")
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// All pages of a side-car, in page-stream order.
#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub pages: Vec<SidecarPage>,
}

impl Extraction {
    pub fn word_count(&self) -> usize {
        self.pages.iter().map(|p| p.words.len()).sum()
    }

    /// Skipped word elements summed over all pages.
    pub fn skipped(&self) -> SkipCounts {
        let mut total = SkipCounts::default();
        for page in &self.pages {
            total.add(page.skipped);
        }
        total
    }
}

/// Reads and parses an hOCR file. Invalid UTF-8 is replaced, not rejected.
pub fn parse_file(path: &Path) -> Result<Extraction> {
    let bytes = fs::read(path)?;
    let extraction = parse(&String::from_utf8_lossy(&bytes))?;
    let skipped = extraction.skipped();
    info!(
        "Extracted {} words on {} pages from {:?} (skipped {} without a usable bbox, {} empty).",
        extraction.word_count(),
        extraction.pages.len(),
        path,
        skipped.bbox,
        skipped.empty
    );
    Ok(extraction)
}

/// Parses hOCR markup into per-page word lists.
pub fn parse(markup: &str) -> Result<Extraction> {
    if markup.trim().is_empty() {
        return Err(malformed("side-car is empty"));
    }

    let mut lexer = Lexer { src: markup, pos: 0 };
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut pages: Vec<SidecarPage> = Vec::new();
    let mut word: Option<PendingWord> = None;
    let mut saw_markup = false;

    while let Some(token) = lexer.next_token()? {
        match token {
            Token::Open { name, attrs, self_closing } => {
                saw_markup = true;
                let in_page = stack.iter().any(|e| e.role == Role::Page);
                let role = if in_page && word.is_none() && has_class(attrs, "ocrx_word") {
                    Role::Word
                } else if !in_page && has_class(attrs, "ocr_page") {
                    Role::Page
                } else {
                    Role::Other
                };

                match role {
                    Role::Page => pages.push(SidecarPage {
                        reference: attribute(attrs, "title").and_then(|t| parse_bbox(&t)),
                        ..SidecarPage::default()
                    }),
                    Role::Word => {
                        word = Some(PendingWord {
                            title: attribute(attrs, "title").map(Cow::into_owned),
                            text: String::new(),
                        })
                    }
                    Role::Other => {}
                }

                if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
                    if role == Role::Word {
                        finish_word(word.take(), pages.last_mut());
                    }
                    continue;
                }
                if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                    lexer.skip_raw_text(&name)?;
                }
                stack.push(OpenElement { name, role });
            }
            Token::Close { name } => {
                saw_markup = true;
                // Elements left open inside the closed one end with it.
                let Some(depth) = stack.iter().rposition(|e| e.name == name) else {
                    debug!("Ignoring closing tag </{}> with no open element.", name);
                    continue;
                };
                for element in stack.drain(depth..).rev() {
                    if element.role == Role::Word {
                        finish_word(word.take(), pages.last_mut());
                    }
                }
            }
            Token::Text(text) => {
                if let Some(pending) = word.as_mut() {
                    pending.text.push_str(decode_entities(text).trim());
                }
            }
        }
    }

    if !saw_markup {
        return Err(malformed("no markup found, expected hOCR"));
    }
    if let Some(element) = stack.iter().find(|e| e.role != Role::Other) {
        return Err(malformed(format!("unclosed <{}> element", element.name)));
    }

    Ok(Extraction { pages })
}

/// Recovers the four integers of a `bbox x0 y0 x1 y1` property.
pub fn parse_bbox(title: &str) -> Option<BoundingBox> {
    let caps = BBOX.captures(title)?;
    let n = |i: usize| caps[i].parse::<u32>().ok();
    BoundingBox::new(n(1)?, n(2)?, n(3)?, n(4)?)
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::OcrSidecarFormat(reason.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Page,
    Word,
    Other,
}

struct OpenElement {
    name: String,
    role: Role,
}

struct PendingWord {
    title: Option<String>,
    text: String,
}

fn finish_word(pending: Option<PendingWord>, page: Option<&mut SidecarPage>) {
    let (Some(pending), Some(page)) = (pending, page) else {
        return;
    };
    if pending.text.is_empty() {
        debug!("Skipping word with no text (title {:?}).", pending.title);
        page.skipped.empty += 1;
        return;
    }
    match pending.title.as_deref().and_then(parse_bbox) {
        Some(bbox) => page.words.push(Word::new(bbox, pending.text)),
        None => {
            debug!("Skipping word {:?}: no usable bbox in {:?}.", pending.text, pending.title);
            page.skipped.bbox += 1;
        }
    }
}

enum Token<'a> {
    Open {
        name: String,
        attrs: &'a str,
        self_closing: bool,
    },
    Close {
        name: String,
    },
    Text(&'a str),
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        let src = self.src;
        loop {
            let rest = &src[self.pos..];
            if rest.is_empty() {
                return Ok(None);
            }

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                return Ok(Some(Token::Text(&rest[..end])));
            }

            if let Some(body) = rest.strip_prefix("<!--") {
                let end = body
                    .find("-->")
                    .ok_or_else(|| self.unterminated("comment"))?;
                self.pos += "<!--".len() + end + "-->".len();
                continue;
            }

            if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').ok_or_else(|| self.unterminated("declaration"))?;
                self.pos += end + 1;
                continue;
            }

            if let Some(body) = rest.strip_prefix("</") {
                let end = body.find('>').ok_or_else(|| self.unterminated("closing tag"))?;
                let name = body[..end].trim().to_ascii_lowercase();
                self.pos += "</".len() + end + 1;
                return Ok(Some(Token::Close { name }));
            }

            // A '<' that does not start a tag name is plain text.
            if !rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.pos += 1;
                return Ok(Some(Token::Text(&rest[..1])));
            }

            let end = tag_end(rest).ok_or_else(|| self.unterminated("tag"))?;
            let inner = &rest[1..end];
            let (inner, self_closing) = match inner.strip_suffix('/') {
                Some(inner) => (inner, true),
                None => (inner, false),
            };
            let name_len = inner
                .find(|c: char| c.is_whitespace() || c == '/')
                .unwrap_or(inner.len());
            self.pos += end + 1;
            return Ok(Some(Token::Open {
                name: inner[..name_len].to_ascii_lowercase(),
                attrs: &inner[name_len..],
                self_closing,
            }));
        }
    }

    /// Moves to the closing tag of a raw text element without tokenizing its body.
    fn skip_raw_text(&mut self, name: &str) -> Result<()> {
        let closing = format!("</{name}");
        let start = self.src[self.pos..]
            .to_ascii_lowercase()
            .find(&closing)
            .ok_or_else(|| self.unterminated(name))?;
        self.pos += start;
        Ok(())
    }

    fn unterminated(&self, what: &str) -> Error {
        malformed(format!("unterminated {what} at byte {}", self.pos))
    }
}

/// Index of the '>' closing a tag, ignoring any inside quoted values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn attribute<'a>(attrs: &'a str, wanted: &str) -> Option<Cow<'a, str>> {
    let mut rest = attrs;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let value = match rest.strip_prefix('=') {
            Some(after) => {
                let after = after.trim_start();
                match after.chars().next() {
                    Some(q @ ('"' | '\'')) => {
                        let body = &after[1..];
                        let end = body.find(q).unwrap_or(body.len());
                        rest = body.get(end + 1..).unwrap_or("");
                        &body[..end]
                    }
                    _ => {
                        let end = after.find(char::is_whitespace).unwrap_or(after.len());
                        rest = &after[end..];
                        &after[..end]
                    }
                }
            }
            None => "",
        };

        if name.eq_ignore_ascii_case(wanted) {
            return Some(decode_entities(value));
        }
    }
}

fn has_class(attrs: &str, class: &str) -> bool {
    attribute(attrs, "class").is_some_and(|v| v.split_whitespace().any(|c| c == class))
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 12)
            .and_then(|end| entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN"
    "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="ar" lang="ar">
 <head>
  <title></title>
  <meta http-equiv="Content-Type" content="text/html;charset=utf-8"/>
  <meta name='ocr-system' content='tesseract 5.3.0' />
  <style>span.ocrx_word > b { color: red }</style>
 </head>
 <body>
  <!-- page one -->
  <div class='ocr_page' id='page_1' title='image "scan.png"; bbox 0 0 2480 3508; ppageno 0'>
   <div class='ocr_carea' id='block_1_1' title="bbox 100 200 900 260">
    <span class='ocr_line' id='line_1_1' title="bbox 100 200 900 260; baseline 0 -5">
     <span class='ocrx_word' id='word_1_1' title='bbox 700 200 900 260; x_wconf 91'>كتاب</span>
     <span class='ocrx_word' id='word_1_2' title='bbox 100 200 400 260; x_wconf 88'> <strong>Q&amp;A</strong> </span>
     <span class='ocrx_word' id='word_1_3' title='x_wconf 50'>بلا</span>
     <span class='ocrx_word' id='word_1_4' title='bbox 1 2 3; x_wconf 50'>ناقص</span>
     <span class='ocrx_word' id='word_1_5' title='bbox 10 20 30 40; x_wconf 10'>   </span>
    </span>
   </div>
  </div>
  <div class='ocr_page' id='page_2' title='bbox 0 0 2480 3508; ppageno 1'>
   <span class='ocrx_word' id='word_2_1' title='bbox 5 6 70 80'>&#1576;&#x0628;</span>
  </div>
 </body>
</html>
"#;

    #[test]
    fn extracts_words_per_page_in_source_order() {
        let extraction = parse(SAMPLE).unwrap();
        assert_eq!(extraction.pages.len(), 2);

        let first = &extraction.pages[0];
        assert_eq!(first.reference, BoundingBox::new(0, 0, 2480, 3508));
        let texts: Vec<&str> = first.words.iter().map(|w| w.visual.as_str()).collect();
        assert_eq!(texts, vec!["كتاب", "Q&A"]);
        assert_eq!(first.words[0].bbox, BoundingBox::new(700, 200, 900, 260).unwrap());
        assert_eq!(first.words[1].bbox, BoundingBox::new(100, 200, 400, 260).unwrap());
        assert!(first.words.iter().all(|w| w.logical.is_none()));

        let second = &extraction.pages[1];
        assert_eq!(second.words.len(), 1);
        assert_eq!(second.words[0].visual, "بب");
    }

    #[test]
    fn counts_skipped_words() {
        let extraction = parse(SAMPLE).unwrap();
        let first = &extraction.pages[0];
        assert_eq!(first.skipped, SkipCounts { bbox: 2, empty: 1 });
        assert_eq!(extraction.pages[1].skipped.total(), 0);
        assert_eq!(extraction.skipped().total(), 3);
        assert_eq!(extraction.word_count(), 3);
    }

    #[test]
    fn bbox_integers_are_recovered_exactly() {
        for (title, expected) in [
            ("bbox 0 0 0 0", (0, 0, 0, 0)),
            ("bbox 12 34 56 78; x_wconf 96", (12, 34, 56, 78)),
            ("image 'a.png'; bbox  1\t2 3   4000000", (1, 2, 3, 4_000_000)),
        ] {
            let b = parse_bbox(title).unwrap();
            assert_eq!((b.x0, b.y0, b.x1, b.y1), expected, "{title}");
        }
    }

    #[test]
    fn unusable_bboxes_are_rejected() {
        for title in [
            "",
            "x_wconf 90",
            "bbox 1 2 3",
            "bbox a b c d",
            "bbox -1 2 3 4",
            "bbox 99999999999 0 1 1",
            "bbox 50 0 10 10",
        ] {
            assert!(parse_bbox(title).is_none(), "{title}");
        }
    }

    #[test]
    fn empty_text_is_skipped_even_with_a_valid_box() {
        let markup = "<div class='ocr_page'><span class='ocrx_word' title='bbox 1 1 2 2'> \u{a0} </span>\
                      <span class='ocrx_word' title='bbox 1 1 2 2'/></div>";
        let extraction = parse(markup).unwrap();
        assert!(extraction.pages[0].words.is_empty());
        assert_eq!(extraction.pages[0].skipped, SkipCounts { bbox: 0, empty: 2 });
    }

    #[test]
    fn words_outside_pages_are_ignored() {
        let markup = "<body><span class='ocrx_word' title='bbox 1 1 2 2'>x</span></body>";
        let extraction = parse(markup).unwrap();
        assert!(extraction.pages.is_empty());
    }

    #[test]
    fn page_without_words_is_kept() {
        let markup = "<div class='ocr_page' title='bbox 0 0 10 10'></div><div class='ocr_page'></div>";
        let extraction = parse(markup).unwrap();
        assert_eq!(extraction.pages.len(), 2);
        assert!(extraction.pages.iter().all(|p| p.words.is_empty()));
        assert_eq!(extraction.pages[1].reference, None);
    }

    #[test]
    fn literal_angle_bracket_in_text_is_tolerated() {
        let markup = "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 4 4'>a<1</span></div>";
        let extraction = parse(markup).unwrap();
        assert_eq!(extraction.pages[0].words[0].visual, "a<1");
    }

    #[test]
    fn malformed_documents_are_fatal() {
        for markup in [
            "",
            "   \n",
            "plain text side-car with no markup",
            "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 1 1'>x</span>",
            "<div class='ocr_page' title='bbox 0 0 1 1'",
            "<!-- never closed <div class='ocr_page'></div>",
        ] {
            match parse(markup) {
                Err(Error::OcrSidecarFormat(_)) => {}
                other => panic!("expected a format error for {markup:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn implicitly_closed_elements_are_tolerated() {
        let markup = "<body><div class='ocr_page'><p><span class='ocrx_word' title='bbox 0 0 1 1'>x</span></div></body>";
        let extraction = parse(markup).unwrap();
        assert_eq!(extraction.pages[0].words.len(), 1);

        // Stray end tags are skipped when every page and word is intact.
        for markup in [
            "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 1 1'>x</span><br></br></div>",
            "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 1 1'>x</span></p></div>",
            "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 1 1'>x</span></div></span>",
            "<div class='ocr_page'><span class='ocrx_word' title='bbox 0 0 1 1'>x</div></span></div>",
        ] {
            let extraction = parse(markup).unwrap_or_else(|e| panic!("{markup:?}: {e}"));
            assert_eq!(extraction.pages.len(), 1, "{markup:?}");
            assert_eq!(extraction.pages[0].words[0].visual, "x", "{markup:?}");
        }
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; &#65;&#x42;"), "a <b> & AB");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.hocr");
        fs::write(&path, SAMPLE).unwrap();
        let extraction = parse_file(&path).unwrap();
        assert_eq!(extraction.pages.len(), 2);

        let missing = parse_file(&dir.path().join("missing.hocr"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}

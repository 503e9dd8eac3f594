//! Logical Reshaper
//!
//! Turns the text the OCR engine emitted for one word into the string that
//! goes into the text layer: Arabic letters are replaced by their contextual
//! presentation forms, then the bidirectional algorithm lays the runs out.
//! Both steps are total, so any input produces some output.

use std::ops::Range;
use unicode_bidi::BidiInfo;

const TATWEEL: char = '\u{0640}';
const LAM: char = '\u{0644}';

/// Word-level text transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reshaper {
    /// Keep combining marks (harakat) instead of dropping them.
    pub keep_harakat: bool,
}

impl Reshaper {
    pub fn new(keep_harakat: bool) -> Self {
        Self { keep_harakat }
    }

    /// Reshapes, then reorders. Empty input yields an empty string.
    pub fn logical_text(&self, visual: &str) -> String {
        reorder(&self.reshape(visual))
    }

    /// Replaces joining letters with their contextual presentation forms.
    pub fn reshape(&self, text: &str) -> String {
        let chars: Vec<char> = text
            .chars()
            .filter(|&c| self.keep_harakat || !is_harakat(c))
            .collect();
        let mut out = String::with_capacity(text.len());
        // Whether the previous letter reaches forward to join the next one.
        let mut joins_forward = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if is_harakat(c) {
                out.push(c);
                i += 1;
                continue;
            }
            let Some(kind) = joining(c) else {
                out.push(c);
                joins_forward = false;
                i += 1;
                continue;
            };
            let next = next_letter(&chars, i + 1);

            if c == LAM {
                if let Some((j, ligature)) = next.and_then(|(j, n)| lam_alef(n).map(|l| (j, l))) {
                    out.push(if joins_forward { ligature[1] } else { ligature[0] });
                    out.extend(&chars[i + 1..j]);
                    joins_forward = false;
                    i = j + 1;
                    continue;
                }
            }

            let joins_prev = joins_forward && kind.joins_backward();
            let joins_next = kind.links_forward()
                && next
                    .and_then(|(_, n)| joining(n))
                    .is_some_and(Joining::joins_backward);
            let form = match (joins_prev, joins_next) {
                (false, false) => Form::Isolated,
                (true, false) => Form::Final,
                (false, true) => Form::Initial,
                (true, true) => Form::Medial,
            };
            out.push(kind.form(c, form));
            joins_forward = kind.links_forward();
            i += 1;
        }
        out
    }
}

/// Runs the bidirectional algorithm over `text` and returns it in display
/// order. Right-to-left runs are reversed with paired punctuation mirrored;
/// left-to-right runs, digits included, keep their internal order.
pub fn reorder(text: &str) -> String {
    let bidi = BidiInfo::new(text, None);
    let mut out = String::with_capacity(text.len());
    for para in &bidi.paragraphs {
        let line: Range<usize> = para.range.clone();
        let (levels, runs) = bidi.visual_runs(para, line);
        for run in runs {
            let segment = &text[run.clone()];
            if levels[run.start].is_rtl() {
                out.extend(segment.chars().rev().map(mirror));
            } else {
                out.push_str(segment);
            }
        }
    }
    out
}

fn mirror(c: char) -> char {
    match c {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        '‹' => '›',
        '›' => '‹',
        _ => c,
    }
}

fn is_harakat(c: char) -> bool {
    matches!(c,
        '\u{0610}'..='\u{061A}'
        | '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06DC}'
        | '\u{06DF}'..='\u{06E4}'
        | '\u{06E7}'..='\u{06E8}'
        | '\u{06EA}'..='\u{06ED}')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Isolated,
    Final,
    Initial,
    Medial,
}

/// How a letter connects to its neighbours, with its presentation forms.
#[derive(Debug, Clone, Copy)]
enum Joining {
    /// Joins on both sides: isolated, final, initial, medial.
    Dual([u32; 4]),
    /// Joins only to the preceding letter: isolated, final.
    Right([u32; 2]),
    /// Joins on both sides without changing shape (tatweel).
    Causing,
    /// Never joins: a single form.
    Isolated(u32),
}

impl Joining {
    fn links_forward(self) -> bool {
        matches!(self, Joining::Dual(_) | Joining::Causing)
    }

    fn joins_backward(self) -> bool {
        !matches!(self, Joining::Isolated(_))
    }

    fn form(self, c: char, form: Form) -> char {
        let code = match (self, form) {
            (Joining::Causing, _) => return c,
            (Joining::Isolated(code), _) => code,
            (Joining::Dual(f), Form::Isolated) => f[0],
            (Joining::Dual(f), Form::Final) => f[1],
            (Joining::Dual(f), Form::Initial) => f[2],
            (Joining::Dual(f), Form::Medial) => f[3],
            (Joining::Right(f), Form::Isolated | Form::Initial) => f[0],
            (Joining::Right(f), Form::Final | Form::Medial) => f[1],
        };
        char::from_u32(code).unwrap_or(c)
    }
}

/// Index and value of the next character that is not a combining mark.
fn next_letter(chars: &[char], from: usize) -> Option<(usize, char)> {
    chars[from.min(chars.len())..]
        .iter()
        .position(|&c| !is_harakat(c))
        .map(|offset| (from + offset, chars[from + offset]))
}

/// Lam-alef ligature (isolated, final) for the alef following a lam.
fn lam_alef(alef: char) -> Option<[char; 2]> {
    match alef {
        '\u{0622}' => Some(['\u{FEF5}', '\u{FEF6}']),
        '\u{0623}' => Some(['\u{FEF7}', '\u{FEF8}']),
        '\u{0625}' => Some(['\u{FEF9}', '\u{FEFA}']),
        '\u{0627}' => Some(['\u{FEFB}', '\u{FEFC}']),
        _ => None,
    }
}

fn dual(base: u32) -> Option<Joining> {
    Some(Joining::Dual([base, base + 1, base + 2, base + 3]))
}

fn right(base: u32) -> Option<Joining> {
    Some(Joining::Right([base, base + 1]))
}

fn joining(c: char) -> Option<Joining> {
    match c {
        '\u{0621}' => Some(Joining::Isolated(0xFE80)),
        '\u{0622}' => right(0xFE81),
        '\u{0623}' => right(0xFE83),
        '\u{0624}' => right(0xFE85),
        '\u{0625}' => right(0xFE87),
        '\u{0626}' => dual(0xFE89),
        '\u{0627}' => right(0xFE8D),
        '\u{0628}' => dual(0xFE8F),
        '\u{0629}' => right(0xFE93),
        '\u{062A}' => dual(0xFE95),
        '\u{062B}' => dual(0xFE99),
        '\u{062C}' => dual(0xFE9D),
        '\u{062D}' => dual(0xFEA1),
        '\u{062E}' => dual(0xFEA5),
        '\u{062F}' => right(0xFEA9),
        '\u{0630}' => right(0xFEAB),
        '\u{0631}' => right(0xFEAD),
        '\u{0632}' => right(0xFEAF),
        '\u{0633}' => dual(0xFEB1),
        '\u{0634}' => dual(0xFEB5),
        '\u{0635}' => dual(0xFEB9),
        '\u{0636}' => dual(0xFEBD),
        '\u{0637}' => dual(0xFEC1),
        '\u{0638}' => dual(0xFEC5),
        '\u{0639}' => dual(0xFEC9),
        '\u{063A}' => dual(0xFECD),
        TATWEEL => Some(Joining::Causing),
        '\u{0641}' => dual(0xFED1),
        '\u{0642}' => dual(0xFED5),
        '\u{0643}' => dual(0xFED9),
        LAM => dual(0xFEDD),
        '\u{0645}' => dual(0xFEE1),
        '\u{0646}' => dual(0xFEE5),
        '\u{0647}' => dual(0xFEE9),
        '\u{0648}' => right(0xFEED),
        '\u{0649}' => right(0xFEEF),
        '\u{064A}' => dual(0xFEF1),
        '\u{0671}' => right(0xFB50),
        '\u{067E}' => dual(0xFB56),
        '\u{0686}' => dual(0xFB7A),
        '\u{0698}' => right(0xFB8A),
        '\u{06A9}' => dual(0xFB8E),
        '\u{06AF}' => dual(0xFB92),
        '\u{06CC}' => dual(0xFBFC),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logical(text: &str) -> String {
        Reshaper::default().logical_text(text)
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert_eq!(logical(""), "");
        assert_eq!(Reshaper::default().reshape(""), "");
        assert_eq!(reorder(""), "");
    }

    #[test]
    fn reshapes_by_joining_context() {
        // kaf initial, teh medial, alef final, beh isolated (alef does not join forward)
        let reshaped = Reshaper::default().reshape("كتاب");
        assert_eq!(reshaped, "\u{FEDB}\u{FE98}\u{FE8E}\u{FE8F}");
    }

    #[test]
    fn pure_rtl_word_is_reversed_reshaping() {
        assert_eq!(logical("كتاب"), "\u{FE8F}\u{FE8E}\u{FE98}\u{FEDB}");
        let reshaped: String = Reshaper::default().reshape("مدرسة").chars().rev().collect();
        assert_eq!(logical("مدرسة"), reshaped);
    }

    #[test]
    fn lam_alef_becomes_a_ligature() {
        assert_eq!(Reshaper::default().reshape("لا"), "\u{FEFB}");
        // seen initial, lam-alef final, meem isolated
        assert_eq!(Reshaper::default().reshape("سلام"), "\u{FEB3}\u{FEFC}\u{FEE1}");
        assert_eq!(logical("سلام"), "\u{FEE1}\u{FEFC}\u{FEB3}");
    }

    #[test]
    fn digit_runs_keep_their_order() {
        assert_eq!(logical("ب12"), "12\u{FE8F}");
        assert_eq!(logical("ب12ت"), "\u{FE95}12\u{FE8F}");
        let out = logical("صفحة 2024");
        assert!(out.contains("2024"), "{out:?}");
    }

    #[test]
    fn latin_and_digits_pass_through() {
        assert_eq!(logical("abc"), "abc");
        assert_eq!(logical("12345"), "12345");
        assert_eq!(logical("Q&A"), "Q&A");
    }

    #[test]
    fn harakat_are_dropped_unless_kept() {
        let with_marks = "كَتَبَ";
        assert_eq!(Reshaper::default().reshape(with_marks), "\u{FEDB}\u{FE98}\u{FE90}");
        let kept = Reshaper::new(true).reshape(with_marks);
        assert_eq!(kept, "\u{FEDB}\u{064E}\u{FE98}\u{064E}\u{FE90}\u{064E}");
    }

    #[test]
    fn hamza_breaks_the_join() {
        // beh before hamza stays isolated, hamza has a single form
        assert_eq!(Reshaper::default().reshape("بء"), "\u{FE8F}\u{FE80}");
    }

    #[test]
    fn tatweel_joins_without_changing_shape() {
        assert_eq!(Reshaper::default().reshape("بـب"), "\u{FE91}\u{0640}\u{FE90}");
    }

    #[test]
    fn brackets_are_mirrored_in_rtl_runs() {
        assert_eq!(logical("(ب)"), "(\u{FE8F})");
    }

    #[test]
    fn arbitrary_input_never_fails() {
        for input in ["\u{FFFD}\u{0000}", "\u{200F}\u{200E}", "ﻼ", "\u{0651}", "a\nب", "\u{10FFFF}"] {
            let _ = logical(input);
        }
    }
}

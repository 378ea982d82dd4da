//! Script detection and Persian text normalization.
//!
//! Applied once to source text before chunking and to queries before
//! embedding, so that stored and query vectors live in the same space.

use ragline_config::ChunkingConfig;

const TATWEEL: char = '\u{0640}';
const ZWNJ: char = '\u{200C}';

fn is_arabic_script(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{0652}' | '\u{0670}')
}

/// Map a single character to its normalized form, or `None` to drop it.
fn normalize_char(c: char) -> Option<char> {
    match c {
        TATWEEL => None,
        c if is_diacritic(c) => None,
        // Arabic Yeh, Alef Maksura → Persian Yeh
        '\u{064A}' | '\u{0649}' => Some('\u{06CC}'),
        // Arabic Kaf → Keheh
        '\u{0643}' => Some('\u{06A9}'),
        // Extended Arabic-Indic (Persian) digits
        '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
        // Arabic-Indic digits
        '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
        c => Some(c),
    }
}

/// Script detector and normalizer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    threshold: f32,
    sample: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl Normalizer {
    pub fn new(threshold: f32, sample: usize) -> Self {
        Self { threshold, sample }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.script_threshold, config.script_sample)
    }

    /// Whether more than `threshold` of the first `sample` letters are in
    /// the Arabic-script blocks.
    pub fn is_persian(&self, text: &str) -> bool {
        let mut letters = 0usize;
        let mut arabic = 0usize;
        for c in text.chars().filter(|c| c.is_alphabetic()).take(self.sample) {
            letters += 1;
            if is_arabic_script(c) {
                arabic += 1;
            }
        }
        letters > 0 && arabic as f32 / letters as f32 > self.threshold
    }

    /// ISO language tag used on stored chunks.
    pub fn language(&self, text: &str) -> &'static str {
        if self.is_persian(text) { "fa" } else { "en" }
    }

    /// Normalize `text` when it is detected as Persian; otherwise return it as-is.
    pub fn normalize(&self, text: &str) -> String {
        if self.is_persian(text) {
            normalize_persian(text)
        } else {
            text.to_string()
        }
    }
}

/// Unconditional Persian normalization.
///
/// Line structure is kept: runs of spaces collapse to one, runs of three or
/// more newlines collapse to a paragraph break.
pub fn normalize_persian(text: &str) -> String {
    let mut mapped = String::with_capacity(text.len());
    for c in text.chars().filter_map(normalize_char) {
        if c == ZWNJ && mapped.ends_with(ZWNJ) {
            continue;
        }
        mapped.push(c);
    }

    let lines: Vec<String> = mapped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let mut out = String::with_capacity(mapped.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_persian() {
        let n = Normalizer::default();
        assert!(n.is_persian("قیمت این کفش چقدر است؟"));
        assert!(!n.is_persian("How much are these shoes?"));
        assert!(!n.is_persian("12345 !!!"));
        assert_eq!(n.language("سلام"), "fa");
    }

    #[test]
    fn mixed_text_uses_ratio() {
        let n = Normalizer::default();
        // 3 Arabic-script letters out of 24
        assert!(!n.is_persian("Nike Air Max running shoe کفش"));
        assert!(n.is_persian("کفش Nike"));
    }

    #[test]
    fn unifies_arabic_forms() {
        assert_eq!(normalize_persian("كيف"), "کیف");
        assert_eq!(normalize_persian("مصطفى"), "مصطفی");
    }

    #[test]
    fn strips_tatweel_and_diacritics() {
        assert_eq!(normalize_persian("س\u{0640}\u{0640}لام"), "سلام");
        assert_eq!(normalize_persian("ك\u{0650}ت\u{064E}اب"), "کتاب");
    }

    #[test]
    fn maps_digits_to_ascii() {
        assert_eq!(normalize_persian("قیمت ۱۲۰ هزار"), "قیمت 120 هزار");
        assert_eq!(normalize_persian("٣٤"), "34");
    }

    #[test]
    fn collapses_zwnj_and_whitespace() {
        assert_eq!(normalize_persian("می\u{200C}\u{200C}خواهم   این"), "می\u{200C}خواهم این");
        assert_eq!(normalize_persian("الف\n\n\n\nب\nپ"), "الف\n\nب\nپ");
    }

    #[test]
    fn english_text_passes_through() {
        let n = Normalizer::default();
        let text = "Price:  40 USD\n\n\nShipping";
        assert_eq!(n.normalize(text), text);
    }
}

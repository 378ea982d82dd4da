//! Token counting service.
//!
//! Uses a byte-pair-encoding tokenizer (HuggingFace `tokenizers`, `bpe`
//! feature) when one has been loaded, otherwise estimates from word count:
//! `ceil(words × multiplier)`. Retrieval-time estimates use 1.3; the budget
//! controller uses 1.5 so that its fallback over-estimates rather than
//! under-estimates.
//!
//! Construct one `TokenCounter` at startup and share it behind an `Arc`.

use tracing::debug;

/// Words-to-tokens multiplier for retrieval-time estimates.
pub const RETRIEVAL_WORD_MULTIPLIER: f32 = 1.3;

/// Words-to-tokens multiplier for the budget controller fallback.
pub const BUDGET_WORD_MULTIPLIER: f32 = 1.5;

/// Estimate tokens from a word count. Rounds up.
pub fn estimate_from_words(word_count: usize, multiplier: f32) -> usize {
    if word_count == 0 {
        return 0;
    }
    let raw = word_count as f64 * f64::from(multiplier);
    // f32 multipliers are not exact in binary; shave the representation error
    // before rounding up so that 10 × 1.3 stays 13.
    (raw - 1e-6).ceil().max(0.0) as usize
}

/// Estimate tokens for a text from its whitespace-delimited word count.
pub fn estimate_text(text: &str, multiplier: f32) -> usize {
    estimate_from_words(text.split_whitespace().count(), multiplier)
}

/// Byte offset just past the `n`-th whitespace-delimited word.
fn word_prefix_end(text: &str, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut seen = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == n {
                    return idx;
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text.len()
}

/// The token counting service.
pub struct TokenCounter {
    #[cfg(feature = "bpe")]
    bpe: Option<tokenizers::Tokenizer>,
    word_multiplier: f32,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("bpe", &self.has_bpe())
            .field("word_multiplier", &self.word_multiplier)
            .finish()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::word_estimate(BUDGET_WORD_MULTIPLIER)
    }
}

impl TokenCounter {
    /// A counter that only uses the word-count estimate.
    pub fn word_estimate(multiplier: f32) -> Self {
        Self {
            #[cfg(feature = "bpe")]
            bpe: None,
            word_multiplier: multiplier,
        }
    }

    /// Load a `tokenizer.json` file. Falls back to the word estimate when
    /// the file cannot be loaded.
    #[cfg(feature = "bpe")]
    pub fn from_tokenizer_file(path: &std::path::Path, fallback_multiplier: f32) -> Self {
        match tokenizers::Tokenizer::from_file(path) {
            Ok(tokenizer) => {
                tracing::info!(path = %path.display(), "BPE tokenizer loaded");
                Self {
                    bpe: Some(tokenizer),
                    word_multiplier: fallback_multiplier,
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load BPE tokenizer, using word-count estimate"
                );
                Self::word_estimate(fallback_multiplier)
            }
        }
    }

    /// Whether counts come from a real tokenizer.
    pub fn has_bpe(&self) -> bool {
        #[cfg(feature = "bpe")]
        {
            self.bpe.is_some()
        }
        #[cfg(not(feature = "bpe"))]
        {
            false
        }
    }

    pub fn word_multiplier(&self) -> f32 {
        self.word_multiplier
    }

    /// Count the tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }
        #[cfg(feature = "bpe")]
        if let Some(bpe) = &self.bpe {
            match bpe.encode(text, false) {
                Ok(encoding) => return encoding.len(),
                Err(e) => debug!(error = %e, "BPE encode failed, estimating from words"),
            }
        }
        estimate_text(text, self.word_multiplier)
    }

    /// Truncate `text` so that `count(result) <= max_tokens`.
    ///
    /// Returns the text unchanged when it already fits.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        if self.count(text) <= max_tokens {
            return text.to_string();
        }

        #[cfg(feature = "bpe")]
        if let Some(bpe) = &self.bpe {
            if let Ok(encoding) = bpe.encode(text, false) {
                let offsets = encoding.get_offsets();
                if let Some(&(_, end)) = offsets.get(max_tokens - 1) {
                    if let Some(prefix) = text.get(..end) {
                        return prefix.trim_end().to_string();
                    }
                }
            }
        }

        self.truncate_words(text, max_tokens)
    }

    fn truncate_words(&self, text: &str, max_tokens: usize) -> String {
        let total_words = text.split_whitespace().count();
        let mut words = ((max_tokens as f64) / f64::from(self.word_multiplier)).floor() as usize;
        words = words.min(total_words);
        while words < total_words
            && estimate_from_words(words + 1, self.word_multiplier) <= max_tokens
        {
            words += 1;
        }
        while words > 0 && estimate_from_words(words, self.word_multiplier) > max_tokens {
            words -= 1;
        }
        let end = word_prefix_end(text, words);
        debug!(max_tokens, words, "Truncated text by word estimate");
        text[..end].trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("   \n"), 0);
    }

    #[test]
    fn retrieval_multiplier_rounds_up() {
        assert_eq!(estimate_from_words(10, RETRIEVAL_WORD_MULTIPLIER), 13);
        assert_eq!(estimate_from_words(1, RETRIEVAL_WORD_MULTIPLIER), 2);
        assert_eq!(estimate_from_words(0, RETRIEVAL_WORD_MULTIPLIER), 0);
    }

    #[test]
    fn budget_multiplier_is_conservative() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count("one two three four"), 6);
        assert_eq!(counter.count("one two three"), 5);
    }

    #[test]
    fn truncate_noop_when_fits() {
        let counter = TokenCounter::default();
        assert_eq!(counter.truncate("short text", 10), "short text");
    }

    #[test]
    fn truncate_fits_exactly_on_even_budget() {
        let counter = TokenCounter::default();
        let text = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let cut = counter.truncate(&text, 150);
        assert_eq!(counter.count(&cut), 150);
        assert!(cut.starts_with("w0 w1"));
        assert!(cut.ends_with("w99"));
    }

    #[test]
    fn truncate_never_exceeds_budget() {
        let counter = TokenCounter::default();
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        for budget in 1..12 {
            let cut = counter.truncate(text, budget);
            assert!(counter.count(&cut) <= budget, "budget {budget}");
        }
        assert_eq!(counter.truncate(text, 0), "");
    }

    #[test]
    fn truncate_keeps_original_line_breaks() {
        let counter = TokenCounter::default();
        let cut = counter.truncate("line one\nline two\nline three", 6);
        assert_eq!(cut, "line one\nline two");
    }

    #[test]
    fn word_counter_reports_no_bpe() {
        assert!(!TokenCounter::word_estimate(1.3).has_bpe());
    }
}

//! Word-window and paragraph-aware text chunking.

const SENTENCE_TERMINATORS: [char; 5] = ['.', '!', '?', '؟', '…'];

/// Split `text` into windows of `chunk_size` words that share `overlap`
/// words with their neighbour.
///
/// Text of at most `chunk_size` words comes back unchanged as one chunk.
/// A trailing remainder with fewer than `overlap` new words is folded into
/// the previous chunk instead of becoming a tiny chunk of its own.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if chunk_size == 0 || words.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(chunk_size - 1);
    let stride = chunk_size - overlap;
    let n = words.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(n);
        chunks.push(words[start..end].join(" "));
        if end == n {
            break;
        }
        let next = start + stride;
        let new_words = n - end;
        if new_words < overlap {
            // Fold the short tail into the current window.
            if let Some(last) = chunks.last_mut() {
                *last = words[start..n].join(" ");
            }
            break;
        }
        start = next;
    }
    chunks
}

/// Split text into sentences, keeping each terminator with its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        // A terminator ends a sentence only before whitespace or end of text,
        // so "3.5" and "..." stay intact.
        let at_boundary = chars.peek().is_none_or(|next| next.is_whitespace());
        if SENTENCE_TERMINATORS.contains(&c) && at_boundary {
            let s = current.trim();
            if !s.is_empty() {
                sentences.push(s.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Greedy packer of text units into chunks of at most `max_words` words.
struct Packer {
    max_words: usize,
    separator: &'static str,
    current: Vec<String>,
    current_words: usize,
    out: Vec<String>,
}

impl Packer {
    fn new(max_words: usize, separator: &'static str) -> Self {
        Self {
            max_words,
            separator,
            current: Vec::new(),
            current_words: 0,
            out: Vec::new(),
        }
    }

    fn push(&mut self, unit: String, words: usize) {
        if self.current_words + words > self.max_words {
            self.flush();
        }
        self.current.push(unit);
        self.current_words += words;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.out.push(self.current.join(self.separator));
            self.current.clear();
            self.current_words = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.out
    }
}

/// Paragraph-aware chunking.
///
/// Paragraphs (separated by blank lines) are packed greedily. Only a single
/// paragraph that is itself over `max_words` is split into sentences, and
/// only a single sentence still over the limit is hard-split by words.
pub fn chunk_paragraphs(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let mut packer = Packer::new(max_words, "\n\n");

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let words = word_count(paragraph);
        if words <= max_words {
            packer.push(paragraph.to_string(), words);
            continue;
        }

        packer.flush();
        let mut sentences = Packer::new(max_words, " ");
        for sentence in split_sentences(paragraph) {
            let words = word_count(&sentence);
            if words <= max_words {
                sentences.push(sentence, words);
                continue;
            }
            sentences.flush();
            let tokens: Vec<&str> = sentence.split_whitespace().collect();
            for piece in tokens.chunks(max_words) {
                sentences.push(piece.join(" "), piece.len());
                sentences.flush();
            }
        }
        for chunk in sentences.finish() {
            packer.out.push(chunk);
        }
    }
    packer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_is_unchanged() {
        let text = "  Short   text with odd spacing ";
        assert_eq!(chunk_text(text, 300, 50), vec![text.to_string()]);
    }

    #[test]
    fn windows_cover_every_word_and_overlap_exactly() {
        let text = numbered(1000);
        let chunks = chunk_text(&text, 300, 50);
        assert!(chunks.len() > 1);

        let windows: Vec<Vec<&str>> = chunks.iter().map(|c| c.split_whitespace().collect()).collect();
        for pair in windows.windows(2) {
            let tail = &pair[0][pair[0].len() - 50..];
            let head = &pair[1][..50];
            assert_eq!(tail, head);
        }

        let mut covered: Vec<&str> = windows[0].clone();
        for w in &windows[1..] {
            covered.extend_from_slice(&w[50..]);
        }
        assert_eq!(covered.join(" "), text);
    }

    #[test]
    fn short_remainder_is_folded_into_previous_chunk() {
        // windows start at 0, 250; the third would add only 10 new words
        let chunks = chunk_text(&numbered(560), 300, 50);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].ends_with("w559"));
        assert_eq!(chunks[1].split_whitespace().count(), 310);
    }

    #[test]
    fn overlap_is_clamped() {
        let chunks = chunk_text(&numbered(10), 4, 9);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert!(chunks.last().unwrap().ends_with("w9"));
    }

    #[test]
    fn sentences_split_on_persian_question_mark() {
        let s = split_sentences("سلام. قیمت چقدر است؟ Thanks!");
        assert_eq!(s, vec!["سلام.", "قیمت چقدر است؟", "Thanks!"]);
    }

    #[test]
    fn ellipsis_and_trailing_fragment() {
        let s = split_sentences("Wait... what about this");
        assert_eq!(s, vec!["Wait...", "what about this"]);
    }

    #[test]
    fn paragraphs_are_packed_without_splitting() {
        let text = "one two three\n\nfour five\n\nsix seven eight nine";
        let chunks = chunk_paragraphs(text, 5);
        assert_eq!(chunks, vec!["one two three\n\nfour five", "six seven eight nine"]);
    }

    #[test]
    fn long_paragraph_falls_back_to_sentences() {
        let text = "intro\n\nA b c. D e f. G h i.\n\noutro";
        let chunks = chunk_paragraphs(text, 6);
        assert_eq!(chunks, vec!["intro", "A b c. D e f.", "G h i.", "outro"]);
    }

    #[test]
    fn long_sentence_is_hard_split() {
        let chunks = chunk_paragraphs(&numbered(7), 3);
        assert_eq!(chunks, vec!["w0 w1 w2", "w3 w4 w5", "w6"]);
    }
}

//! Extractive tldr: first sentence, as many middle sentences as fit, last
//! sentence. Pure string work, no model call.

use crate::chunker::split_sentences;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_tldr(text: &str, max_words: usize) -> String {
    let text = text.trim();
    if word_count(text) <= max_words {
        return text.to_string();
    }

    let sentences = split_sentences(text);
    if sentences.len() < 3 {
        return truncate_words(text, max_words);
    }

    let first = &sentences[0];
    let last = &sentences[sentences.len() - 1];
    let mut remaining = max_words.saturating_sub(word_count(first) + word_count(last));

    let mut middle = Vec::new();
    for sentence in &sentences[1..sentences.len() - 1] {
        let words = word_count(sentence);
        if words > remaining {
            break;
        }
        remaining -= words;
        middle.push(sentence.as_str());
    }

    let mut parts = Vec::with_capacity(middle.len() + 2);
    parts.push(first.as_str());
    parts.extend(middle);
    parts.push(last.as_str());
    truncate_words(&parts.join(" "), max_words)
}

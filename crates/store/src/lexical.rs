//! BM25 keyword scoring over an in-memory candidate set.
//!
//! Tokenization lowercases and keeps Unicode alphanumeric runs, so Persian
//! and English text are handled alike.

use std::collections::{HashMap, HashSet};

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Raw BM25 scores of `documents` for `query`. Higher is better; 0.0 means no
/// query term occurs in the document.
pub fn bm25_scores(query: &str, documents: &[String]) -> Vec<f32> {
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
    if query_terms.is_empty() || documents.is_empty() {
        return vec![0.0; documents.len()];
    }

    let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let n = docs.len() as f32;
    let avg_len = (docs.iter().map(Vec::len).sum::<usize>() as f32 / n).max(1.0);

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            if query_terms.contains(term) {
                *doc_freq.entry(term).or_default() += 1;
            }
        }
    }

    docs.iter()
        .map(|doc| {
            let len = doc.len() as f32;
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for term in doc {
                if query_terms.contains(term.as_str()) {
                    *tf.entry(term.as_str()).or_default() += 1;
                }
            }
            tf.iter()
                .map(|(term, &count)| {
                    let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let count = count as f32;
                    idf * (count * (K1 + 1.0)) / (count + K1 * (1.0 - B + B * len / avg_len))
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_handles_punctuation_and_case() {
        assert_eq!(tokenize("Red-Shoes, 42!"), vec!["red", "shoes", "42"]);
        assert_eq!(tokenize("قیمت کفش؟"), vec!["قیمت", "کفش"]);
    }

    #[test]
    fn matching_document_scores_higher() {
        let docs = vec![
            "Product: red running shoes, price 40".to_string(),
            "Shipping takes three days".to_string(),
        ];
        let scores = bm25_scores("price of shoes", &docs);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn rare_terms_weigh_more() {
        let docs = vec![
            "shoes shoes sale".to_string(),
            "shoes warranty".to_string(),
            "shoes".to_string(),
        ];
        let scores = bm25_scores("warranty", &docs);
        assert!(scores[1] > 0.0);
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn empty_query_scores_zero() {
        let docs = vec!["anything".to_string()];
        assert_eq!(bm25_scores("  ?! ", &docs), vec![0.0]);
    }
}

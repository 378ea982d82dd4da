//! Query analysis: a complexity score and a language tag.
//!
//! Only used to choose the reranker variant; never changes which sources
//! are searched.

use ragline_knowledge::Normalizer;
use serde::Serialize;

const CONJUNCTIONS: &[&str] = &[
    "and", "or", "also", "but", "versus", "vs", "compare", "difference", "between", "و", "یا",
    "همچنین", "اما", "مقایسه", "تفاوت",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    /// In [0, 1]
    pub complexity: f32,
    pub language: &'static str,
    pub word_count: usize,
}

pub fn analyze_query(query: &str, normalizer: &Normalizer) -> QueryAnalysis {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let word_count = words.len();

    let mut complexity: f32 = match word_count {
        0..=5 => 0.1,
        6..=12 => 0.3,
        13..=25 => 0.5,
        _ => 0.7,
    };

    let questions = query.chars().filter(|c| matches!(c, '?' | '؟')).count();
    if questions > 1 {
        complexity += 0.2;
    }

    if words.iter().any(|w| CONJUNCTIONS.contains(&w.as_str())) {
        complexity += 0.2;
    }

    QueryAnalysis {
        complexity: complexity.clamp(0.0, 1.0),
        language: normalizer.language(query),
        word_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_query_is_simple() {
        let a = analyze_query("price of shoes?", &Normalizer::default());
        assert!(a.complexity < 0.6);
        assert_eq!(a.language, "en");
        assert_eq!(a.word_count, 3);
    }

    #[test]
    fn compound_questions_are_complex() {
        let a = analyze_query(
            "What is the difference between the trail runner and the road runner? Which one is better for winter?",
            &Normalizer::default(),
        );
        assert!(a.complexity >= 0.6);
    }

    #[test]
    fn persian_language_tag() {
        let a = analyze_query("قیمت کفش چند است؟", &Normalizer::default());
        assert_eq!(a.language, "fa");
    }

    #[test]
    fn complexity_is_bounded() {
        let long = "and or ? ".repeat(40);
        let a = analyze_query(&long, &Normalizer::default());
        assert!((0.0..=1.0).contains(&a.complexity));
    }
}

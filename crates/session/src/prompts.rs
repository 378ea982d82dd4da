//! Prompt templates for conversation summarization.

pub const SUMMARY_SYSTEM: &str = "You summarize customer conversations for a business assistant. \
Keep only what helps answer the customer later: products mentioned, prices quoted, \
the customer's intent, and open questions. Leave out greetings, small talk and \
repeated questions. Write in the language of the conversation.";

pub const TIER_SYSTEM: &str = "You condense part of a customer conversation for a business \
assistant. Focus on products, prices, decisions and unresolved questions. Never invent details.";

/// Rolling summary prompt. Asks for `{"summary": ..., "topics": [...]}`.
pub fn summary_prompt(previous_summary: &str, transcript: &str) -> String {
    let previous = if previous_summary.trim().is_empty() {
        "(none)"
    } else {
        previous_summary.trim()
    };
    format!(
        "Previous summary:\n{previous}\n\n\
         New messages:\n{transcript}\n\n\
         Write an updated summary that replaces the previous one, in at most 3 sentences.\n\
         Respond with JSON only: {{\"summary\": \"...\", \"topics\": [\"...\"]}}"
    )
}

/// One-sentence summary of a single window of a long conversation.
pub fn window_prompt(transcript: &str) -> String {
    format!(
        "Summarize this part of a customer conversation in one sentence. \
         Mention products and prices if any.\n\n{transcript}"
    )
}

/// Merge window summaries into one rolling summary (same JSON shape).
pub fn merge_prompt(previous_summary: &str, partials: &[String]) -> String {
    let joined = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    summary_prompt(previous_summary, &format!("Summaries of consecutive parts:\n{joined}"))
}

/// Tier summary at the given level of detail.
pub fn tier_prompt(detail: &str, sentences: &str, transcript: &str) -> String {
    format!(
        "Give a {detail} summary of these messages in {sentences} sentences.\n\n{transcript}"
    )
}

pub fn key_facts_prompt(min: usize, max: usize, transcript: &str) -> String {
    format!(
        "List between {min} and {max} key facts from this customer conversation \
         (names, products, prices, order numbers, commitments). \
         One fact per line, each starting with \"- \".\n\n{transcript}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_marks_missing_previous() {
        let p = summary_prompt("  ", "Customer: hi");
        assert!(p.contains("Previous summary:\n(none)"));
        assert!(p.contains("\"topics\""));
    }

    #[test]
    fn merge_prompt_numbers_partials() {
        let p = merge_prompt("", &["A.".into(), "B.".into()]);
        assert!(p.contains("1. A.\n2. B."));
    }
}

//! Critical system-prompt rules.
//!
//! A paragraph (blank-line separated) that contains any configured marker is
//! a critical rule. Critical rules are pulled out before truncation and
//! re-appended once, so they survive budget pressure and never repeat.

/// A system prompt split into critical rules and everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriticalRules {
    /// Unique critical paragraphs, in first-seen order
    pub rules: Vec<String>,
    /// Non-critical paragraphs joined by blank lines
    pub remainder: String,
}

impl CriticalRules {
    pub fn text(&self) -> String {
        self.rules.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Remainder first, critical rules last.
    pub fn reassemble(&self, remainder: &str) -> String {
        let critical = self.text();
        match (remainder.trim().is_empty(), critical.is_empty()) {
            (true, _) => critical,
            (false, true) => remainder.trim().to_string(),
            (false, false) => format!("{}\n\n{critical}", remainder.trim()),
        }
    }
}

fn whitespace_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_critical_rules(system_prompt: &str, markers: &[String]) -> CriticalRules {
    let markers: Vec<String> = markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.to_lowercase())
        .collect();

    let normalized = system_prompt.replace("\r\n", "\n");
    let mut rules: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut remainder: Vec<&str> = Vec::new();

    for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let lower = paragraph.to_lowercase();
        if markers.iter().any(|m| lower.contains(m.as_str())) {
            let key = whitespace_key(paragraph);
            if !seen.contains(&key) {
                seen.push(key);
                rules.push(paragraph.to_string());
            }
        } else {
            remainder.push(paragraph);
        }
    }

    CriticalRules {
        rules,
        remainder: remainder.join("\n\n"),
    }
}

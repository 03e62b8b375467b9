use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"Expo(?:nent)?PushToken\[[^\]]+\]").expect("valid regex"),
            "[REDACTED_PUSH_TOKEN]",
        ),
        (
            Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9_\-\.=]{8,}").expect("valid regex"),
            "Bearer [REDACTED]",
        ),
        (
            Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").expect("valid regex"),
            "[REDACTED_EMAIL]",
        ),
        (
            Regex::new(r"\b[A-Za-z0-9_\-:]{64,}\b").expect("valid regex"),
            "[REDACTED_TOKEN]",
        ),
    ]
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Scrubs device tokens, credentials and contact details before they reach logs.
#[derive(Debug, Default, Clone)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        for (pattern, replacement) in SENSITIVE_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }

            redaction_count += matches;
            result = pattern.replace_all(&result, *replacement).to_string();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }

    /// Short fingerprint for correlating a token across log lines.
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", visible)
    }
}

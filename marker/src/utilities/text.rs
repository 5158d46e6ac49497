use crate::rules::TextConfig;

/// Applies `config` to `text`: trimming first, then lowercasing.
pub fn preprocess(text: &str, config: &TextConfig) -> String {
    let text = if config.trim_whitespace {
        text.trim()
    } else {
        text
    };
    if config.ignore_case {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

/// Makes user input safe to echo in feedback: control characters other than newline and tab are
/// dropped and the result is cut to `max_chars`, ending in `...` when cut.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let cleaned: Vec<char> = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    if cleaned.len() <= max_chars {
        return cleaned.into_iter().collect();
    }
    let mut cut: String = cleaned[..max_chars.saturating_sub(3)].iter().collect();
    cut.push_str("...");
    cut
}

/// Feedback in the shared `✓ Correct` / `✗ Incorrect - Expected: ...` shape.
pub fn format_feedback(is_correct: bool, expected: Option<&str>, details: Option<&str>) -> String {
    if is_correct {
        return match details {
            Some(details) => format!("✓ Correct: {details}"),
            None => "✓ Correct".to_string(),
        };
    }
    let mut parts = vec!["✗ Incorrect".to_string()];
    if let Some(expected) = expected.filter(|e| !e.is_empty()) {
        parts.push(format!("Expected: {}", sanitize(expected, 100)));
    }
    if let Some(details) = details {
        parts.push(details.to_string());
    }
    parts.join(" - ")
}

/// Formats a ratio in `[0, 1]` as a whole percentage.
pub fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_respects_config() {
        let both = TextConfig::default();
        assert_eq!(preprocess("  Paris ", &both), "paris");
        let neither = TextConfig {
            ignore_case: false,
            trim_whitespace: false,
        };
        assert_eq!(preprocess("  Paris ", &neither), "  Paris ");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a\u{7}b\nc", 10), "ab\nc");
        assert_eq!(sanitize("abcdefghij", 6), "abc...");
        assert_eq!(sanitize("", 5), "");
    }

    #[test]
    fn test_format_feedback() {
        assert_eq!(format_feedback(true, None, None), "✓ Correct");
        assert_eq!(
            format_feedback(false, Some("42"), Some("off by one")),
            "✗ Incorrect - Expected: 42 - off by one"
        );
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.8), "80%");
        assert_eq!(percent(0.874), "87%");
    }
}

//! Utilities (response-to-source extraction).

/// Pull the executable source out of a model response.
///
/// Takes the inner text of the first fenced block if one is present (with or
/// without a language tag), otherwise the whole response; trims surrounding
/// whitespace; strips one optional leading `Code:` label.
pub fn extract_code(response: &str) -> String {
    let body = match response.find("```") {
        Some(open) => {
            let after_ticks = &response[open + 3..];
            // The rest of the fence line is a language tag; code starts on
            // the next line.
            let code_start = after_ticks
                .find('\n')
                .map(|i| i + 1)
                .unwrap_or(after_ticks.len());
            let inner = &after_ticks[code_start..];
            match inner.find("```") {
                Some(close) => &inner[..close],
                None => inner,
            }
        }
        None => response,
    };

    let trimmed = body.trim();
    strip_label(trimmed, "Code:").trim().to_string()
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    match text.get(..label.len()) {
        Some(head) if head.eq_ignore_ascii_case(label) => &text[label.len()..],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_with_language_tag() {
        assert_eq!(extract_code("```python\nX = 1\n```"), "X = 1");
    }

    #[test]
    fn test_fenced_without_language_tag() {
        assert_eq!(extract_code("```\na = 2\nb = 3\n```"), "a = 2\nb = 3");
    }

    #[test]
    fn test_fence_with_surrounding_prose() {
        let response = "Here you go:\n```python\nimport pandas\n```\nHope that helps.";
        assert_eq!(extract_code(response), "import pandas");
    }

    #[test]
    fn test_unfenced_response_taken_whole() {
        assert_eq!(extract_code("  X = 1\n"), "X = 1");
    }

    #[test]
    fn test_leading_code_label_stripped() {
        assert_eq!(extract_code("Code:\nX = 1"), "X = 1");
        assert_eq!(extract_code("```\ncode:\nX = 1\n```"), "X = 1");
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(extract_code("```python\nX = 1"), "X = 1");
    }
}

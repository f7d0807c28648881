const ANSWER_LABELS: &[&str] = &["translation:", "translated text:", "tradução:", "correction:"];

/// Strips the wrapping a chat model tends to add around a bare answer: code fences, a leading
/// "Translation:" style label, quotes.
pub fn cleanup_model_text(text: &str) -> String {
    let mut s = text.trim().to_string();
    if s.starts_with("```") {
        if let Some(i) = s.find('\n') {
            s = s[i + 1..].to_string();
        }
        if let Some(end) = s.rfind("```") {
            s = s[..end].to_string();
        }
    }
    let s = strip_answer_label(s.trim());
    let s = s
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s);
    s.trim().to_string()
}

fn strip_answer_label(s: &str) -> &str {
    for label in ANSWER_LABELS {
        let Some(head) = s.get(..label.len()) else {
            continue;
        };
        if head.to_lowercase() == *label {
            return s[label.len()..].trim_start();
        }
    }
    s
}

/// One-line, char-bounded rendering of `text` for log output.
pub fn clip_for_log(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if max_chars == 0 || flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::{cleanup_model_text, clip_for_log};

    #[test]
    fn cleanup_strips_fences_and_quotes() {
        assert_eq!(cleanup_model_text("```text\nLâmina\n```"), "Lâmina");
        assert_eq!(cleanup_model_text("  \"Escudo de Energia\" \n"), "Escudo de Energia");
        assert_eq!(cleanup_model_text("Diz \"olá\" e sai"), "Diz \"olá\" e sai");
        assert_eq!(cleanup_model_text("Translation: \"Lâmina Cinética\""), "Lâmina Cinética");
        assert_eq!(cleanup_model_text("TRADUÇÃO:\nEscudo"), "Escudo");
        assert_eq!(cleanup_model_text("Translation notes are kept"), "Translation notes are kept");
    }

    #[test]
    fn clip_flattens_and_bounds() {
        assert_eq!(clip_for_log("a\n  b", 10), "a b");
        assert_eq!(clip_for_log("abcdef", 3), "abc…");
        assert_eq!(clip_for_log("abcdef", 0), "abcdef");
    }
}

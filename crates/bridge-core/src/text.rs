//! Small text helpers shared across the bridge crates.

/// Truncates `value` to `max_chars` characters for inclusion in error
/// messages, staying on character boundaries.
pub fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = String::new();
    for ch in value.chars().take(max_chars) {
        truncated.push(ch);
    }
    truncated.push_str("...");
    truncated
}

/// Maps `raw` onto a filesystem-safe name for staging files.
pub fn sanitize_for_path(raw: &str) -> String {
    let sanitized = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_for_path, truncate_for_error};

    #[test]
    fn unit_truncate_for_error_preserves_unicode_boundaries() {
        let value = "bridge🌊message";
        assert_eq!(truncate_for_error(value, 20), value);
        assert_eq!(truncate_for_error(value, 7), "bridge🌊...");
        assert_eq!(truncate_for_error(value, 0), "...");
    }

    #[test]
    fn unit_sanitize_for_path_replaces_unsafe_characters() {
        assert_eq!(sanitize_for_path("notes/2024 plan.pdf"), "notes_2024_plan.pdf");
        assert_eq!(sanitize_for_path("///"), "file");
    }
}

//! Cleanup applied to item bodies before storage.
//!
//! Summaries are rendered in list views as plain text, so markup is stripped
//! outright. Content is shown in a reader that understands markup, so it is
//! only trimmed.

/// Strips markup and trims; blank results collapse to `None`.
pub fn clean_summary(summary: Option<&str>) -> Option<String> {
    let stripped = strip_tags(summary?);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Trims only, preserving markup; blank results collapse to `None`.
pub fn clean_content(content: Option<&str>) -> Option<String> {
    let trimmed = content?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Single-pass tag stripper: drops everything between `<` and `>`.
/// Text outside tags, including its whitespace, is kept as-is.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

//! Shared text helpers: titles, byte formatting, file names.

use crate::constants::LEGACY_TITLE_MAX_CHARS;

/// Trim an optional string and drop empty values.
///
/// # Returns
/// `None` when the input is missing or whitespace-only; otherwise the trimmed
/// string.
pub fn normalize_optional_nonempty(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Derive a note title from the first non-empty line of `content`.
///
/// Leading markdown heading markers (`#`) and whitespace are stripped.
///
/// # Returns
/// The derived title, or an empty string when nothing usable remains.
pub fn extract_title(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches(|c: char| c == '#' || c.is_whitespace()))
        .unwrap_or_default()
        .to_string()
}

/// Title for a note synthesized from the legacy single-note field.
///
/// Uses the trimmed first line truncated to 50 characters.
pub fn legacy_title(content: &str) -> String {
    content
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(LEGACY_TITLE_MAX_CHARS)
        .collect()
}

/// Human-readable byte size (`0 B`, `512 B`, `1.50 KB`, `12.3 KB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{} {}", bytes, UNITS[0]);
    }
    let precision = if value >= 10.0 { 1 } else { 2 };
    format!("{:.*} {}", precision, value, UNITS[unit])
}

/// File-system safe `.txt` name for a note title.
pub fn note_file_name(title: &str) -> String {
    let mut stem: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    while stem.contains("--") {
        stem = stem.replace("--", "-");
    }
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "note.txt".to_string()
    } else {
        format!("{}.txt", stem)
    }
}

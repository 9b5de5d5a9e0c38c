/// Trim whitespace and strip one pair of outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// `" Order Date "` → `"order_date"`: trimmed, lower-cased, spaces to underscores.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace(' ', "_")
}

/// Cleaned cell value, or `None` when it is one of the NA markers.
pub fn cell<'a>(raw: Option<&'a str>, na_values: &[String]) -> Option<&'a str> {
    let v = clean_str(raw?);
    if na_values.iter().any(|na| na.trim() == v) {
        None
    } else {
        Some(v)
    }
}

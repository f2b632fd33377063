//! Helpers for sanitizing data before it enters storage paths, logs, or
//! tracing span attributes.
//!
//! Uploaded file names come from untrusted callers, and owner ids should not
//! be written to shared traces verbatim.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Longest file name kept when sanitizing an upload name.
const MAX_FILENAME_LEN: usize = 128;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic fingerprint of an identifier so log lines
/// can be correlated without exposing the raw value.
pub fn fingerprint(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Turns a caller-supplied file name into a single safe path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`,
/// and leading dots are stripped so the result can never be `..` or hidden.
/// Falls back to `document.<extension>` when nothing usable remains.
pub fn sanitize_filename(name: &str, fallback_extension: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return format!("document.{}", fallback_extension);
    }

    if cleaned.len() > MAX_FILENAME_LEN {
        // Keep the tail so the extension survives.
        let start = cleaned.len() - MAX_FILENAME_LEN;
        return cleaned[start..].trim_start_matches('.').to_string();
    }

    cleaned.to_string()
}

/// Returns at most the last `max_chars` characters of a diagnostic stream,
/// trimmed, prefixed with `…` when truncated.
pub fn diagnostic_tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("…{}", tail)
}

//! Helpers for turning user-supplied names into safe identifiers and for
//! keeping full paths out of span attributes.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Derives the payload key for a document from its original filename.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
/// gets a `_` prefix. Names with no alphanumeric character at all fall back
/// to a random `doc_<uuid>` token.
pub fn payload_key(original_name: &str) -> String {
    if !original_name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return format!("doc_{}", uuid::Uuid::new_v4().simple());
    }

    let mut key: String = original_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if !key.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        key.insert(0, '_');
    }
    key
}

/// Strips any directory component from an archive entry or upload name.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

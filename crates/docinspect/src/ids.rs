use crate::error::InvalidIdError;

/// Reduces a document reference to its numeric id.
///
/// Accepts a bare integer (`"42"`) or a slash-delimited path whose last
/// segment is one (`"sessions/3/documents/42"`). Anything else is rejected.
pub fn normalize_document_id(raw: &str) -> Result<i64, InvalidIdError> {
    let last = raw.trim().rsplit('/').next().unwrap_or_default();
    last.parse::<i64>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| InvalidIdError(raw.to_string()))
}

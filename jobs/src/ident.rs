//! Verification identifier extraction and validation.
//!
//! Links arrive as free text: a full URL with a `verificationId` query
//! parameter, a URL with the id as a path segment, or the bare id pasted
//! on its own. Extraction tries those shapes in that order. Validation is
//! strict — 24 hex characters with a `69`/`6a` prefix — and reports a
//! distinct reason per violated rule so the caller can show a precise
//! message. Pure functions; no state, no side effects.

use thiserror::Error;

const ID_LEN: usize = 24;
const QUERY_MARKER: &str = "verificationId=";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentError {
    #[error("verification id must be exactly 24 characters")]
    WrongLength,

    #[error("verification id must be hexadecimal")]
    NotHex,

    #[error("verification id must start with 69 or 6a")]
    BadPrefix,
}

/// Pull a candidate identifier out of free-form link text.
pub fn extract(link: &str) -> Option<String> {
    if link.is_empty() {
        return None;
    }

    // Query parameter: `...?verificationId=<hex>`.
    if let Some(pos) = link.find(QUERY_MARKER) {
        let rest = &link[pos + QUERY_MARKER.len()..];
        let hex_len = hex_run_len(rest);
        if hex_len > 0 {
            return Some(rest[..hex_len].to_string());
        }
    }

    // Path segment: `/<hex, 24 or more>`.
    let mut from = 0;
    while let Some(rel) = link[from..].find('/') {
        let start = from + rel + 1;
        let hex_len = hex_run_len(&link[start..]);
        if hex_len >= ID_LEN {
            return Some(link[start..start + hex_len].to_string());
        }
        from = start;
    }

    // Bare identifier.
    if link.len() >= ID_LEN && hex_run_len(link) == link.len() {
        return Some(link.to_string());
    }

    None
}

/// Validate the shape of an extracted identifier.
///
/// The prefix rule is checked before the charset rule so an input like
/// `"zz" + 22 hex` reports its actual problem (the prefix) rather than
/// the incidental one.
pub fn validate(id: &str) -> Result<(), IdentError> {
    if id.chars().count() != ID_LEN {
        return Err(IdentError::WrongLength);
    }
    let prefix: String = id.chars().take(2).flat_map(char::to_lowercase).collect();
    if prefix != "69" && prefix != "6a" {
        return Err(IdentError::BadPrefix);
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IdentError::NotHex);
    }
    Ok(())
}

/// Length of the leading ASCII-hex run. Hex digits are single bytes, so
/// the count doubles as a byte offset.
fn hex_run_len(s: &str) -> usize {
    s.chars().take_while(|c| c.is_ascii_hexdigit()).count()
}

//! Store key helpers.
//!
//! Plays, frames and range summaries live in a hierarchical key/value
//! layout (`plays/{play_id}/ranges/{level}/{rep}/{state}`), so every
//! segment must be free of path and reserved characters.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Characters the hierarchical store reserves in key segments.
pub const FORBIDDEN_KEY_PATTERN: &str = r"[.#$\[\]/]";

/// Placeholder segment for missing or blank keys.
pub const UNKNOWN_KEY: &str = "unknown";

/// Maximum key segment length in bytes.
pub const MAX_KEY_LENGTH: usize = 128;

/// Allowed shape of a client-supplied play id.
pub const CLIENT_PLAY_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{1,128}$";

static FORBIDDEN_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FORBIDDEN_KEY_PATTERN).expect("valid regex"));

static CLIENT_PLAY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(CLIENT_PLAY_ID_PATTERN).expect("valid regex"));

/// Turn an arbitrary string into a safe key segment.
///
/// Reserved characters become `_`, surrounding whitespace is trimmed, the
/// result is capped at [`MAX_KEY_LENGTH`] bytes, and blank input maps to
/// [`UNKNOWN_KEY`].
pub fn sanitize_key(raw: &str) -> String {
    let replaced = FORBIDDEN_KEY_RE.replace_all(raw.trim(), "_");
    let mut key = replaced.into_owned();

    if key.len() > MAX_KEY_LENGTH {
        let mut cut = MAX_KEY_LENGTH;
        while !key.is_char_boundary(cut) {
            cut -= 1;
        }
        key.truncate(cut);
    }

    if key.is_empty() {
        UNKNOWN_KEY.to_string()
    } else {
        key
    }
}

/// Sanitize an optional JSON value (string or number) into a key segment.
pub fn sanitize_value_key(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => sanitize_key(s),
        Some(serde_json::Value::Number(n)) => sanitize_key(&n.to_string()),
        Some(serde_json::Value::Bool(b)) => sanitize_key(&b.to_string()),
        _ => UNKNOWN_KEY.to_string(),
    }
}

/// Validate a client-chosen play id before it is used as a store key.
pub fn validate_client_play_id(id: &str) -> Result<(), CoreError> {
    if CLIENT_PLAY_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid clientPlayId '{id}'. Must be 1-{MAX_KEY_LENGTH} characters of [A-Za-z0-9_-]"
        )))
    }
}

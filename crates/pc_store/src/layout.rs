//! On-disk naming.  Part of the persisted-state contract: changing anything
//! here breaks reads of existing history.

use std::path::{Path, PathBuf};

pub const MESSAGES_DIR: &str = "messages";
pub const STAGING_DIR: &str = ".staging";
pub const STAGING_SUFFIX: &str = ".staging";

/// Map every character outside `[A-Za-z0-9_-]` to `_`.
///
/// Dots are not in the safe set, so no handle can become `.` or `..`.
pub fn sanitize_handle(handle: &str) -> String {
    let out: String = handle
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

pub fn conversation_dir(base: &Path, sanitized_peer: &str) -> PathBuf {
    base.join(sanitized_peer)
}

pub fn messages_dir(base: &Path, sanitized_peer: &str) -> PathBuf {
    conversation_dir(base, sanitized_peer).join(MESSAGES_DIR)
}

pub fn staging_dir(base: &Path, sanitized_peer: &str) -> PathBuf {
    conversation_dir(base, sanitized_peer).join(STAGING_DIR)
}

pub fn message_file_name(timestamp: i64, id: &str) -> String {
    format!("{timestamp}_{}", sanitize_handle(id))
}

/// Split `<timestamp>_<id>`.  `None` for anything else in the directory.
pub fn parse_file_name(name: &str) -> Option<(i64, &str)> {
    let (ts, id) = name.split_once('_')?;
    if id.is_empty() {
        return None;
    }
    let ts = ts.parse::<i64>().ok()?;
    Some((ts, id))
}

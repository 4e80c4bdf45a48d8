//! Remote path naming.

use chrono::{DateTime, Utc};

/// Build a namespaced remote path for one transfer.
///
/// `{user_id}/{unix_millis}-{suffix}.{ext}`. The random suffix keeps two
/// transfers started in the same millisecond apart; the extension is omitted
/// when the file name has none.
#[must_use]
pub fn remote_path(user_id: &str, file_name: &str, now: DateTime<Utc>) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &uuid[..8];
    let stamp = now.timestamp_millis();
    match extension(file_name) {
        Some(ext) => format!("{user_id}/{stamp}-{suffix}.{ext}"),
        None => format!("{user_id}/{stamp}-{suffix}"),
    }
}

/// Lowercased extension after the last dot, if it is a plain token.
fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

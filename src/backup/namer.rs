//! Snapshot naming
//!
//! Keys have the shape `{YYYY_MM_DD}_{title}_{item id}.json`. The date comes first so that
//! listing a folder prefix yields snapshots in chronological order, and the item id keeps
//! two items with the same title apart.

use chrono::NaiveDate;

/// Date format used in snapshot keys
pub const DATE_FORMAT: &str = "%Y_%m_%d";

/// Replace characters that are unsafe in file names or object keys
///
/// `:` becomes `-`, `"` is dropped, and `|`, `/` and `\` become `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            ':' => Some('-'),
            '"' => None,
            '|' | '/' | '\\' => Some('_'),
            other => Some(other),
        })
        .collect()
}

/// Key of one item's snapshot on one day, relative to its folder prefix
pub fn snapshot_key(captured_on: NaiveDate, title: &str, item_id: &str) -> String {
    sanitize(&format!(
        "{}_{}_{}.json",
        captured_on.format(DATE_FORMAT),
        title.to_lowercase(),
        item_id
    ))
}

/// Prefix under which all snapshots of a folder live, with trailing slash
pub fn folder_prefix(root: &str, folder_title: &str) -> String {
    format!("{}/{}/", root, sanitize(&folder_title.to_lowercase()))
}

/// Full object key of a snapshot
pub fn object_key(root: &str, folder_title: &str, snapshot_key: &str) -> String {
    format!("{}{}", folder_prefix(root, folder_title), snapshot_key)
}

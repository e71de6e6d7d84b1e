//! Stable per-item identities for deduplication.

use sha2::{Digest, Sha256};

use crate::feed::parser::ParsedItem;

/// Storage column width for item identities.
pub const GUID_MAX_LEN: usize = 191;

/// Resolves the dedupe key for a parsed item. Never empty.
///
/// An explicit feed-supplied guid is used verbatim (capped at the column
/// width). Otherwise one is synthesized by hashing the item's url, title,
/// and publish timestamp. The seed deliberately omits the fetch time: an
/// item without a publish date must hash identically on every fetch, or
/// every re-fetch would insert it again as a new row.
pub fn resolve_guid(item: &ParsedItem) -> String {
    if let Some(guid) = item.guid.as_deref() {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return truncate_guid(trimmed.to_owned());
        }
    }

    let seed = format!(
        "{}|{}|{}",
        item.url.as_deref().unwrap_or(""),
        item.title.as_deref().unwrap_or(""),
        item.published_at
            .map(|published| published.to_rfc3339())
            .unwrap_or_default(),
    );
    let digest = Sha256::digest(seed.as_bytes());
    truncate_guid(format!("{digest:x}"))
}

fn truncate_guid(guid: String) -> String {
    if guid.chars().count() <= GUID_MAX_LEN {
        guid
    } else {
        guid.chars().take(GUID_MAX_LEN).collect()
    }
}

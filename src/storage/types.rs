use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The (user, url) pair is already subscribed.
    #[error("feed already exists for this user")]
    DuplicateFeed,

    /// Migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

/// Whether a sqlx error is a UNIQUE violation on the given columns.
///
/// SQLite reports these only through the driver message, so matching the
/// message text is the available signal.
pub(crate) fn is_unique_violation(err: &sqlx::Error, columns: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("UNIQUE constraint failed") && message.contains(columns)
        }
        _ => false,
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Subscription row as the fetch pipeline sees it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub description: Option<String>,
    /// Epoch seconds of the last successful fetch; `None` means never.
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Feed {
    /// Title for display, falling back to the subscription URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Feed plus its item count, for listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedSummary {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub description: Option<String>,
    pub last_fetched_at: Option<i64>,
    pub item_count: i64,
}

impl FeedSummary {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// One stored feed entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedItem {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<i64>,
    /// Epoch seconds when the owning user first viewed the item.
    pub read_at: Option<i64>,
    /// Epoch seconds when the item was bookmarked; `None` means not bookmarked.
    pub bookmarked_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed-level values produced by a parse. Absent fields keep the stored value.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub description: Option<String>,
}

/// Write-side item row: identity already resolved, bodies already cleaned.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub guid: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<i64>,
}

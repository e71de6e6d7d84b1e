use chrono::Utc;

use super::schema::Database;
use super::types::{FeedItem, StorageError};

/// Hard cap on any single item listing.
const MAX_ITEMS: i64 = 500;

const ITEM_COLUMNS: &str = "id, feed_id, guid, title, url, summary, content, \
                            published_at, read_at, bookmarked_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Item Queries
    // ========================================================================

    /// Most recent items across all of a user's feeds.
    pub async fn list_recent_items(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<FeedItem>, StorageError> {
        let limit = limit.clamp(1, MAX_ITEMS);

        let items = sqlx::query_as::<_, FeedItem>(
            r#"
            SELECT i.id, i.feed_id, i.guid, i.title, i.url, i.summary, i.content,
                   i.published_at, i.read_at, i.bookmarked_at, i.created_at, i.updated_at
            FROM feed_items i
            JOIN feeds f ON f.id = i.feed_id
            WHERE f.user_id = ?
            ORDER BY i.published_at DESC, i.created_at DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Items of a single feed, newest first.
    pub async fn list_items_for_feed(
        &self,
        feed_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<FeedItem>, StorageError> {
        let limit = limit.unwrap_or(MAX_ITEMS).clamp(1, MAX_ITEMS);

        let items = sqlx::query_as::<_, FeedItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM feed_items
             WHERE feed_id = ?
             ORDER BY published_at DESC, created_at DESC
             LIMIT ?"
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Fetch a single item by id.
    pub async fn get_item(&self, item_id: i64) -> Result<Option<FeedItem>, StorageError> {
        let item = sqlx::query_as::<_, FeedItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM feed_items WHERE id = ?"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    // ========================================================================
    // Item Mutations
    // ========================================================================

    /// Mark an item read (idempotent), returning whether anything changed.
    ///
    /// `WHERE read_at IS NULL` keeps the first read timestamp: viewing an
    /// item again never moves it.
    pub async fn mark_item_read(&self, item_id: i64) -> Result<bool, StorageError> {
        let now = Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE feed_items SET read_at = ? WHERE id = ? AND read_at IS NULL")
                .bind(now)
                .bind(item_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically toggle an item's bookmark, returning the new state.
    ///
    /// The flip and the read of the new value happen in one statement via
    /// `RETURNING`, so concurrent toggles cannot interleave.
    pub async fn toggle_item_bookmark(&self, item_id: i64) -> Result<bool, StorageError> {
        let now = Utc::now().timestamp();
        let result: (bool,) = sqlx::query_as(
            r#"
            UPDATE feed_items
            SET bookmarked_at = CASE WHEN bookmarked_at IS NULL THEN ? ELSE NULL END
            WHERE id = ?
            RETURNING bookmarked_at IS NOT NULL
        "#,
        )
        .bind(now)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FeedUpdate, ItemRow};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_item(guid: &str, published_at: Option<i64>) -> ItemRow {
        ItemRow {
            guid: guid.to_string(),
            title: Some(format!("Item {}", guid)),
            url: Some(format!("https://example.com/{}", guid)),
            summary: Some("Summary".to_string()),
            content: None,
            published_at,
        }
    }

    async fn seeded_feed(db: &Database, user_id: i64, url: &str, items: &[ItemRow]) -> i64 {
        let feed_id = db.create_feed(user_id, url).await.unwrap();
        db.apply_feed_refresh(feed_id, &FeedUpdate::default(), items)
            .await
            .unwrap();
        feed_id
    }

    #[tokio::test]
    async fn recent_items_are_ordered_and_scoped() {
        let db = test_db().await;
        seeded_feed(
            &db,
            1,
            "https://a.example.com/feed",
            &[
                test_item("old", Some(1704067200)),
                test_item("new", Some(1704153600)),
            ],
        )
        .await;
        seeded_feed(
            &db,
            2,
            "https://b.example.com/feed",
            &[test_item("other-user", Some(1704240000))],
        )
        .await;

        let items = db.list_recent_items(1, 50).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid, "new");
        assert_eq!(items[1].guid, "old");
    }

    #[tokio::test]
    async fn recent_items_respect_limit() {
        let db = test_db().await;
        let rows: Vec<ItemRow> = (0..10)
            .map(|i| test_item(&format!("g{}", i), Some(1704067200 + i)))
            .collect();
        seeded_feed(&db, 1, "https://a.example.com/feed", &rows).await;

        let items = db.list_recent_items(1, 3).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let db = test_db().await;
        let feed_id = seeded_feed(
            &db,
            1,
            "https://a.example.com/feed",
            &[test_item("g1", None)],
        )
        .await;

        let items = db.list_items_for_feed(feed_id, None).await.unwrap();
        assert!(items[0].read_at.is_none());

        assert!(db.mark_item_read(items[0].id).await.unwrap());
        let first_read_at = db.get_item(items[0].id).await.unwrap().unwrap().read_at;
        assert!(first_read_at.is_some());

        // Second view changes nothing and keeps the original timestamp
        assert!(!db.mark_item_read(items[0].id).await.unwrap());
        let item = db.get_item(items[0].id).await.unwrap().unwrap();
        assert_eq!(item.read_at, first_read_at);
    }

    #[tokio::test]
    async fn bookmark_toggles_on_and_off() {
        let db = test_db().await;
        let feed_id = seeded_feed(
            &db,
            1,
            "https://a.example.com/feed",
            &[test_item("g1", None)],
        )
        .await;
        let items = db.list_items_for_feed(feed_id, None).await.unwrap();

        assert!(db.toggle_item_bookmark(items[0].id).await.unwrap());
        let item = db.get_item(items[0].id).await.unwrap().unwrap();
        assert!(item.bookmarked_at.is_some());

        assert!(!db.toggle_item_bookmark(items[0].id).await.unwrap());
        let item = db.get_item(items[0].id).await.unwrap().unwrap();
        assert!(item.bookmarked_at.is_none());
    }

    #[tokio::test]
    async fn get_unknown_item_is_none() {
        let db = test_db().await;
        assert!(db.get_item(404).await.unwrap().is_none());
    }
}

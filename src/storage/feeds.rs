use chrono::Utc;
use sha1::{Digest, Sha1};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{is_unique_violation, Feed, FeedSummary, FeedUpdate, ItemRow, StorageError};

/// Hex SHA-1 of a subscription URL; the `feeds.url_hash` column is fixed at
/// this digest's 40-character width.
pub fn url_hash(url: &str) -> String {
    let digest = Sha1::digest(url.as_bytes());
    format!("{digest:x}")
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe a user to a feed URL, returning the new feed id.
    ///
    /// The title starts out as the URL itself; the first successful fetch
    /// replaces it with the feed's own title.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateFeed` when the user already
    /// subscribes to this URL.
    pub async fn create_feed(&self, user_id: i64, url: &str) -> Result<i64, StorageError> {
        let now = Utc::now().timestamp();
        let hash = url_hash(url);

        let result = sqlx::query(
            r#"
            INSERT INTO feeds (user_id, url, url_hash, title, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(&hash)
        .bind(url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(err) if is_unique_violation(&err, "feeds.user_id") => {
                Err(StorageError::DuplicateFeed)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a single feed by id.
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StorageError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, user_id, url, url_hash, title, site_url, description,
                   last_fetched_at, created_at, updated_at
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(feed)
    }

    /// All feeds belonging to one user.
    pub async fn list_feeds(&self, user_id: i64) -> Result<Vec<Feed>, StorageError> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, user_id, url, url_hash, title, site_url, description,
                   last_fetched_at, created_at, updated_at
            FROM feeds
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Every feed in the store, for bulk refresh.
    pub async fn all_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, user_id, url, url_hash, title, site_url, description,
                   last_fetched_at, created_at, updated_at
            FROM feeds
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// A user's feeds with their item counts, newest subscription first.
    pub async fn feed_overviews(&self, user_id: i64) -> Result<Vec<FeedSummary>, StorageError> {
        let feeds = sqlx::query_as::<_, FeedSummary>(
            r#"
            SELECT f.id, f.url, f.title, f.site_url, f.description, f.last_fetched_at,
                   COUNT(i.id) AS item_count
            FROM feeds f
            LEFT JOIN feed_items i ON i.feed_id = f.id
            WHERE f.user_id = ?
            GROUP BY f.id
            ORDER BY f.created_at DESC, f.id DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Unsubscribe: delete the feed, cascading to its items.
    /// Returns the number of feed rows removed (0 when the id is unknown).
    pub async fn delete_feed(&self, feed_id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Refresh Transaction
    // ========================================================================

    /// Apply one fetch's results atomically: update feed metadata, stamp
    /// `last_fetched_at`, and batch-upsert the items.
    ///
    /// Feed-level fields are only overwritten when the parse produced a
    /// value (`COALESCE` keeps the stored one otherwise). The item upsert is
    /// keyed on `(feed_id, guid)` and updates title/url/summary/content/
    /// published_at/updated_at on conflict, leaving `read_at`,
    /// `bookmarked_at`, and `created_at` untouched. Re-running with the same
    /// rows converges to the same state, which is what makes concurrent
    /// fetches of one feed safe.
    ///
    /// Returns the number of rows written. Any failure rolls the whole
    /// transaction back (the transaction guard rolls back on drop).
    pub async fn apply_feed_refresh(
        &self,
        feed_id: i64,
        update: &FeedUpdate,
        items: &[ItemRow],
    ) -> Result<usize, StorageError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE feeds
            SET title = COALESCE(?, title),
                site_url = COALESCE(?, site_url),
                description = COALESCE(?, description),
                last_fetched_at = ?,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&update.title)
        .bind(&update.site_url)
        .bind(&update.description)
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .execute(&mut *tx)
        .await?;

        // 9 columns * 50 rows stays well under SQLite's bind parameter limit
        const BATCH_SIZE: usize = 50;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feed_items (feed_id, guid, title, url, summary, content, \
                 published_at, created_at, updated_at) ",
            );

            builder.push_values(chunk, |mut b, item| {
                b.push_bind(feed_id)
                    .push_bind(&item.guid)
                    .push_bind(&item.title)
                    .push_bind(&item.url)
                    .push_bind(&item.summary)
                    .push_bind(&item.content)
                    .push_bind(item.published_at)
                    .push_bind(now)
                    .push_bind(now);
            });

            builder.push(
                " ON CONFLICT(feed_id, guid) DO UPDATE SET \
                 title = excluded.title, url = excluded.url, \
                 summary = excluded.summary, content = excluded.content, \
                 published_at = excluded.published_at, updated_at = excluded.updated_at",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(items.len())
    }
}

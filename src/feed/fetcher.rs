use crate::feed::clean::{clean_content, clean_summary};
use crate::feed::identity::resolve_guid;
use crate::feed::parser::{parse_feed, ParseError, ParsedFeed};
use crate::storage::{Database, Feed, FeedUpdate, ItemRow};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::Duration;
use thiserror::Error;

/// Deadline for one HTTP attempt, including reading the body.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Additional attempts after the first failure.
const MAX_RETRIES: u32 = 2;
/// Fixed pause between attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);
/// Response bodies larger than this are treated as a transport failure.
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
/// Bound on in-flight fetches during a bulk refresh.
const MAX_CONCURRENT_FETCHES: usize = 10;

const ACCEPT_FEEDS: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml";

/// Errors that can occur while fetching and storing one feed.
///
/// The transport variants (`Network`, `Timeout`, `HttpStatus`, `TooLarge`)
/// are retried in-request before being surfaced; `Parse` and `Database`
/// failures are never retried here — the dispatcher owns that policy.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the fetch deadline
    #[error("request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the size limit
    #[error("response too large")]
    TooLarge,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Store failure while applying the refresh; the transaction rolled back
    #[error("database error: {0}")]
    Database(String),
}

impl FetchError {
    fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_)
                | FetchError::Timeout
                | FetchError::HttpStatus(_)
                | FetchError::TooLarge
        )
    }
}

/// Outcome of one feed within a bulk refresh.
pub struct FeedRefresh {
    pub feed_id: i64,
    pub result: Result<usize, FetchError>,
}

/// Builds the shared HTTP client: identifying User-Agent plus the feed
/// media types in `Accept` on every request.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(ACCEPT_FEEDS),
    );

    reqwest::Client::builder()
        .user_agent(user_agent.to_owned())
        .default_headers(headers)
        .build()
}

/// Fetches a feed's document and applies it to the store.
///
/// Transport failures are retried twice with a fixed 100ms back-off; once
/// exhausted they are logged with the feed's id, url and reason, and
/// returned to the caller. A successful fetch is parsed,
/// each item gets its identity resolved and its bodies cleaned, and the
/// whole result is applied in one transaction — on any storage failure
/// nothing is written, and the previous fetch timestamp and items survive.
///
/// Returns the number of item rows handed to the upsert.
pub async fn fetch_and_store(
    db: &Database,
    client: &reqwest::Client,
    feed: &Feed,
) -> Result<usize, FetchError> {
    let bytes = match fetch_with_retry(client, &feed.url).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(
                feed_id = feed.id,
                url = %feed.url,
                error = %err,
                "failed to fetch feed"
            );
            return Err(err);
        }
    };

    let parsed = parse_feed(&bytes)?;
    let (update, rows) = to_rows(&parsed);

    let count = db
        .apply_feed_refresh(feed.id, &update, &rows)
        .await
        .map_err(|err| FetchError::Database(err.to_string()))?;

    Ok(count)
}

/// Refreshes many feeds concurrently, at most 10 in flight. Feeds are
/// independent units of work; results arrive in completion order, not input
/// order.
pub async fn refresh_all(
    db: Database,
    client: reqwest::Client,
    feeds: Vec<Feed>,
) -> Vec<FeedRefresh> {
    stream::iter(feeds)
        .map(|feed| {
            let db = db.clone();
            let client = client.clone();
            async move {
                let result = fetch_and_store(&db, &client, &feed).await;
                FeedRefresh {
                    feed_id: feed.id,
                    result,
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await
}

/// Turns a parse result into write-side rows: feed metadata plus one
/// [`ItemRow`] per item with identity resolved and bodies cleaned. The
/// resolver always produces a key, so every parsed item reaches the store.
fn to_rows(parsed: &ParsedFeed) -> (FeedUpdate, Vec<ItemRow>) {
    let update = FeedUpdate {
        title: parsed.title.clone(),
        site_url: parsed.site_url.clone(),
        description: parsed.description.clone(),
    };

    let rows = parsed
        .items
        .iter()
        .map(|item| ItemRow {
            guid: resolve_guid(item),
            title: item.title.clone(),
            url: item.url.clone(),
            summary: clean_summary(item.summary.as_deref()),
            content: clean_content(item.content.as_deref()),
            published_at: item.published_at.map(|published| published.timestamp()),
        })
        .collect();

    (update, rows)
}

async fn fetch_with_retry(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0u32;
    loop {
        match fetch_once(client, url).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transport() && attempt < MAX_RETRIES => {
                attempt += 1;
                tracing::debug!(url = %url, attempt, error = %err, "retrying feed fetch");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    tokio::time::timeout(FETCH_TIMEOUT, async {
        let response = client.get(url).send().await.map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    })
    .await
    .map_err(|_| FetchError::Timeout)?
}

/// Reads a response body with a size cap, streaming so an oversized body is
/// rejected without being buffered whole.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when present
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    async fn setup_feed(db: &Database, url: &str) -> Feed {
        let feed_id = db.create_feed(1, url).await.unwrap();
        db.get_feed(feed_id).await.unwrap().unwrap()
    }

    fn test_client() -> reqwest::Client {
        build_client("feedling-tests/0.1").unwrap()
    }

    #[tokio::test]
    async fn fetch_success_stores_items() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = setup_feed(&db, &format!("{}/feed", mock_server.uri())).await;

        let count = fetch_and_store(&db, &test_client(), &feed).await.unwrap();
        assert_eq!(count, 1);

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Test Feed"));
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn non_2xx_is_retried_then_surfaced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial request + 2 retries
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = setup_feed(&db, &format!("{}/feed", mock_server.uri())).await;

        let err = fetch_and_store(&db, &test_client(), &feed).await.unwrap_err();
        match err {
            FetchError::HttpStatus(500) => {}
            other => panic!("expected HttpStatus(500), got {:?}", other),
        }

        // Nothing was written
        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retry_budget() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = setup_feed(&db, &format!("{}/feed", mock_server.uri())).await;

        let count = fetch_and_store(&db, &test_client(), &feed).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = setup_feed(&db, &format!("{}/feed", mock_server.uri())).await;

        let err = fetch_and_store(&db, &test_client(), &feed).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)), "got {:?}", err);

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn oversized_body_is_a_transport_error() {
        let body = "x".repeat(MAX_FEED_SIZE + 1);
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = setup_feed(&db, &format!("{}/feed", mock_server.uri())).await;

        let err = fetch_and_store(&db, &test_client(), &feed).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge), "got {:?}", err);
    }

    #[tokio::test]
    async fn refresh_all_reports_each_feed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        db.create_feed(1, &format!("{}/a", mock_server.uri())).await.unwrap();
        db.create_feed(1, &format!("{}/b", mock_server.uri())).await.unwrap();
        let feeds = db.all_feeds().await.unwrap();

        let results = refresh_all(db, test_client(), feeds).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.result.is_ok()));
    }
}

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedling::config::Config;
use feedling::feed::{self, FeedRefresh};
use feedling::storage::{Database, Feed, FeedItem};
use feedling::util::validate_feed_url;

/// Get the config directory path (~/.config/feedling/)
fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedling"))
}

#[derive(Parser, Debug)]
#[command(name = "feedling", about = "Fetch RSS/Atom feeds and store deduplicated items")]
struct Args {
    /// Config file path (defaults to ~/.config/feedling/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe a user to a feed URL and fetch it once
    Add {
        url: String,
        #[arg(long)]
        user: i64,
    },
    /// Refresh one feed, a user's feeds, or every feed
    Refresh {
        #[arg(long)]
        feed: Option<i64>,
        #[arg(long)]
        user: Option<i64>,
    },
    /// List a user's feeds with item counts
    List {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        json: bool,
    },
    /// List recent items across a user's feeds
    Items {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Print one item and mark it read
    Show { item_id: i64 },
    /// Toggle an item's bookmark
    Bookmark { item_id: i64 },
    /// Unsubscribe a feed, removing its items
    Remove { feed_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("failed to load configuration")?;

    let db_path = match &config.database_path {
        Some(path) => PathBuf::from(path),
        None => {
            std::fs::create_dir_all(&config_dir).context("failed to create config directory")?;
            config_dir.join("feedling.db")
        }
    };
    let db_path = db_path
        .to_str()
        .context("database path is not valid UTF-8")?
        .to_owned();

    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path))?;

    match args.command {
        Command::Add { url, user } => add(&db, &config, &url, user).await,
        Command::Refresh { feed, user } => refresh(&db, &config, feed, user).await,
        Command::List { user, json } => list(&db, user, json).await,
        Command::Items { user, limit, json } => {
            let limit = limit.unwrap_or(config.recent_items_limit);
            items(&db, user, limit, json).await
        }
        Command::Show { item_id } => show(&db, item_id).await,
        Command::Bookmark { item_id } => bookmark(&db, item_id).await,
        Command::Remove { feed_id } => remove(&db, feed_id).await,
    }
}

async fn add(db: &Database, config: &Config, url: &str, user: i64) -> Result<()> {
    let url = validate_feed_url(url)?;

    let feed_id = db.create_feed(user, url.as_str()).await?;
    println!("Subscribed feed {} for user {}.", feed_id, user);

    // Subscribing triggers an immediate fetch; a failure here leaves the
    // subscription in place for the next refresh.
    let feed = db
        .get_feed(feed_id)
        .await?
        .context("feed disappeared after insert")?;
    let client = feed::build_client(&config.user_agent)?;
    match feed::fetch_and_store(db, &client, &feed).await {
        Ok(count) => println!("Fetched {} item(s).", count),
        Err(err) => eprintln!("Initial fetch failed: {} (will retry on next refresh)", err),
    }

    Ok(())
}

async fn refresh(
    db: &Database,
    config: &Config,
    feed_id: Option<i64>,
    user: Option<i64>,
) -> Result<()> {
    let feeds: Vec<Feed> = match (feed_id, user) {
        (Some(id), _) => db.get_feed(id).await?.into_iter().collect(),
        (None, Some(user)) => db.list_feeds(user).await?,
        (None, None) => db.all_feeds().await?,
    };

    if feeds.is_empty() {
        println!("No feeds to refresh.");
        return Ok(());
    }

    let total = feeds.len();
    let client = feed::build_client(&config.user_agent)?;
    let results = feed::refresh_all(db.clone(), client, feeds).await;

    let mut failed = 0usize;
    for FeedRefresh { feed_id, result } in &results {
        match result {
            Ok(count) => println!("feed {}: {} item(s)", feed_id, count),
            Err(err) => {
                failed += 1;
                eprintln!("feed {}: {}", feed_id, err);
            }
        }
    }

    if failed == total {
        bail!("all {} refreshes failed", total);
    }
    Ok(())
}

async fn list(db: &Database, user: i64, json: bool) -> Result<()> {
    let overviews = db.feed_overviews(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overviews)?);
        return Ok(());
    }

    if overviews.is_empty() {
        println!("No feeds.");
        return Ok(());
    }
    for overview in &overviews {
        println!(
            "{:>5}  {:<40}  {:>4} item(s)  last fetched {}",
            overview.id,
            overview.display_title(),
            overview.item_count,
            format_timestamp(overview.last_fetched_at),
        );
    }
    Ok(())
}

async fn items(db: &Database, user: i64, limit: i64, json: bool) -> Result<()> {
    let items = db.list_recent_items(user, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    for item in &items {
        print_item_line(item);
    }
    Ok(())
}

async fn show(db: &Database, item_id: i64) -> Result<()> {
    let Some(item) = db.get_item(item_id).await? else {
        bail!("no item with id {}", item_id);
    };

    // Viewing an item marks it read
    db.mark_item_read(item_id).await?;

    println!("{}", item.title.as_deref().unwrap_or("(untitled)"));
    if let Some(url) = &item.url {
        println!("{}", url);
    }
    println!("published: {}", format_timestamp(item.published_at));
    if item.bookmarked_at.is_some() {
        println!("bookmarked");
    }
    if let Some(content) = item.content.as_deref().or(item.summary.as_deref()) {
        println!("\n{}", content);
    }
    Ok(())
}

async fn bookmark(db: &Database, item_id: i64) -> Result<()> {
    let bookmarked = db.toggle_item_bookmark(item_id).await?;
    if bookmarked {
        println!("Bookmarked item {}.", item_id);
    } else {
        println!("Removed bookmark from item {}.", item_id);
    }
    Ok(())
}

async fn remove(db: &Database, feed_id: i64) -> Result<()> {
    let removed = db.delete_feed(feed_id).await?;
    if removed == 0 {
        bail!("no feed with id {}", feed_id);
    }
    println!("Removed feed {}.", feed_id);
    Ok(())
}

fn print_item_line(item: &FeedItem) {
    let marker = if item.read_at.is_none() { "*" } else { " " };
    println!(
        "{} {:>5}  {}  {}",
        marker,
        item.id,
        format_timestamp(item.published_at),
        item.title.as_deref().unwrap_or("(untitled)"),
    );
}

fn format_timestamp(epoch: Option<i64>) -> String {
    epoch
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

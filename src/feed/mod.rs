//! Feed pipeline: normalize raw XML, parse RSS/Atom dialects, resolve item
//! identities, clean content, and drive the fetch-and-store cycle.
//!
//! The submodules map onto the pipeline stages:
//!
//! - [`normalize`] - BOM stripping and declared-charset conversion
//! - [`parser`] - dialect-agnostic parsing into [`ParsedFeed`]
//! - [`identity`] - stable per-item dedupe keys
//! - [`clean`] - summary/content cleanup before storage
//! - [`fetcher`] - HTTP retrieval with retry discipline and the
//!   transactional save

pub mod clean;
pub mod fetcher;
pub mod identity;
pub mod normalize;
pub mod parser;

pub use fetcher::{build_client, fetch_and_store, refresh_all, FeedRefresh, FetchError};
pub use parser::{parse_feed, ParseError, ParsedFeed, ParsedItem};

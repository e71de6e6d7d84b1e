//! Feed ingestion core: fetch RSS/Atom documents, normalize them into a
//! uniform item model, and persist deduplicated items.
//!
//! The crate is organized around a single pipeline:
//!
//! raw bytes → [`feed::normalize`] → [`feed::parser`] → [`feed::identity`] +
//! [`feed::clean`] → [`storage::Database::apply_feed_refresh`]
//!
//! driven by [`feed::fetch_and_store`]. Everything outside the pipeline
//! (scheduling, authentication, presentation) lives with the caller.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

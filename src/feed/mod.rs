//! Feed handling: definition parsing, remote fetching, entry extraction,
//! and title filtering.
//!
//! - [`definition`] - parses one document block into a [`FeedDefinition`]
//! - [`fetcher`] - the abstract fetch collaborator and its reqwest impl
//! - [`extract`] - Atom/RSS entry extraction from a fetched body
//! - [`filter`] - per-feed title match/rewrite and canonical item rendering

mod definition;
mod extract;
mod fetcher;
mod filter;

pub use definition::{FeedDefinition, MalformedDefinition};
pub use extract::{extract_entries, ExtractError, RawEntry};
pub use fetcher::{FeedFetcher, FetchError, HttpFetcher};
pub use filter::{render_entry, render_item};

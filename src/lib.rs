//! pagefeed: a feed refresh engine for outline-style documents.
//!
//! The engine reads feed definitions out of a document page (one block per
//! feed, carrying a schedule and an optional title filter), polls the feeds
//! that are due, and reconciles the page's item list: new entries are merged
//! in, the list is sorted newest-first and capped, and each refreshed feed's
//! schedule is advanced in place.
//!
//! # Architecture
//!
//! - [`store`] - the document block store abstraction plus in-memory and
//!   JSON-file-backed implementations
//! - [`feed`] - feed-definition parsing, remote fetching, entry extraction,
//!   and title filtering/rendering
//! - [`engine`] - schedule advancement, change detection, and the refresh
//!   orchestrator that drives one run end to end
//! - [`config`] - TOML configuration with CLI overrides

pub mod config;
pub mod engine;
pub mod feed;
pub mod store;

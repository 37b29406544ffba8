//! Document block store abstraction.
//!
//! The engine treats the document as a tree of blocks per page: each block
//! has a stable id, a text body, and ordered children. Everything the engine
//! needs is expressed through the [`BlockStore`] trait; two implementations
//! are provided:
//!
//! - [`MemoryStore`] - in-process store for tests and library embedding
//! - [`JsonStore`] - a JSON file on disk, persisted atomically after every
//!   mutation

mod json;
mod memory;
mod types;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use types::{find_block_mut, max_block_seq, remove_block_from, Block};

use std::future::Future;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by block store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested page does not exist in the store.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The requested block id does not exist anywhere in the store.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Reading or persisting the backing file failed.
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not a valid store document.
    #[error("Invalid store document: {0}")]
    Document(#[from] serde_json::Error),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Read/write access to a page-addressed tree of blocks.
///
/// Writes are individually durable but there is no transaction spanning
/// multiple calls; callers sequence their own writes and accept that a crash
/// between calls leaves the document partially updated.
pub trait BlockStore {
    /// Returns the top-level blocks of `page`, children included.
    fn read_page_block_tree(
        &self,
        page: &str,
    ) -> impl Future<Output = Result<Vec<Block>, StoreError>> + Send;

    /// Replaces the text of the block with `block_id`, leaving its children
    /// untouched.
    fn update_block_text(
        &self,
        block_id: &str,
        new_text: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends one child block per entry of `texts` under `parent_id`,
    /// preserving order.
    fn insert_child_blocks(
        &self,
        parent_id: &str,
        texts: &[String],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the block with `block_id` (and its subtree) from whichever
    /// page holds it.
    fn remove_block(&self, block_id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

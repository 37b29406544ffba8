use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::types::{find_block_mut, max_block_seq, remove_block_from, Block};
use super::{BlockStore, StoreError};

/// In-process block store.
///
/// Used by the test suites and by library embedders that drive the engine
/// against document state they manage themselves. Mutations are counted per
/// kind so tests can assert that a run issued no unnecessary writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: Mutex<BTreeMap<String, Vec<Block>>>,
    next_seq: AtomicU64,
    updates: AtomicU64,
    inserts: AtomicU64,
    removes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a page, adjusting the id allocator so generated
    /// ids never collide with the seeded ones.
    pub fn set_page(&self, page: impl Into<String>, blocks: Vec<Block>) {
        let seq = max_block_seq(&blocks);
        self.next_seq.fetch_max(seq, Ordering::Relaxed);
        self.pages.lock().expect("page table lock poisoned").insert(page.into(), blocks);
    }

    /// Snapshot of a page's block tree, or `None` if the page is absent.
    pub fn page(&self, page: &str) -> Option<Vec<Block>> {
        self.pages.lock().expect("page table lock poisoned").get(page).cloned()
    }

    /// Counts of `(update_block_text, insert_child_blocks, remove_block)`
    /// calls issued so far.
    pub fn mutation_counts(&self) -> (u64, u64, u64) {
        (
            self.updates.load(Ordering::Relaxed),
            self.inserts.load(Ordering::Relaxed),
            self.removes.load(Ordering::Relaxed),
        )
    }

    fn allocate_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("b{}", seq)
    }
}

impl BlockStore for MemoryStore {
    async fn read_page_block_tree(&self, page: &str) -> Result<Vec<Block>, StoreError> {
        self.pages
            .lock()
            .expect("page table lock poisoned")
            .get(page)
            .cloned()
            .ok_or_else(|| StoreError::PageNotFound(page.to_string()))
    }

    async fn update_block_text(&self, block_id: &str, new_text: &str) -> Result<(), StoreError> {
        let mut pages = self.pages.lock().expect("page table lock poisoned");
        for blocks in pages.values_mut() {
            if let Some(block) = find_block_mut(blocks, block_id) {
                block.text = new_text.to_string();
                self.updates.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        Err(StoreError::BlockNotFound(block_id.to_string()))
    }

    async fn insert_child_blocks(&self, parent_id: &str, texts: &[String]) -> Result<(), StoreError> {
        // Allocate ids before taking the page lock; the counter is its own
        // synchronization.
        let ids: Vec<String> = texts.iter().map(|_| self.allocate_id()).collect();
        let mut pages = self.pages.lock().expect("page table lock poisoned");
        for blocks in pages.values_mut() {
            if let Some(parent) = find_block_mut(blocks, parent_id) {
                for (id, text) in ids.into_iter().zip(texts) {
                    parent.children.push(Block::new(id, text.clone()));
                }
                self.inserts.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        Err(StoreError::BlockNotFound(parent_id.to_string()))
    }

    async fn remove_block(&self, block_id: &str) -> Result<(), StoreError> {
        let mut pages = self.pages.lock().expect("page table lock poisoned");
        for blocks in pages.values_mut() {
            if remove_block_from(blocks, block_id) {
                self.removes.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        Err(StoreError::BlockNotFound(block_id.to_string()))
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{find_block_mut, max_block_seq, remove_block_from, Block};
use super::{BlockStore, StoreError};

/// On-disk document: pages mapped to their top-level block forests.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    pages: BTreeMap<String, Vec<Block>>,
}

/// File-backed block store.
///
/// The whole document lives in one JSON file; every mutation rewrites the
/// file via write-to-temp-then-rename so a crash mid-write never leaves a
/// truncated document behind. Documents are expected to stay small (one feed
/// page plus a capped item list), so rewriting wholesale is fine.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    doc: Mutex<Document>,
    next_seq: AtomicU64,
}

impl JsonStore {
    /// Opens an existing store file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        let doc: Document = serde_json::from_str(&content)?;
        let seq = doc.pages.values().map(|blocks| max_block_seq(blocks)).max().unwrap_or(0);
        tracing::debug!(path = %path.display(), pages = doc.pages.len(), "Opened store");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
            next_seq: AtomicU64::new(seq),
        })
    }

    /// Creates a store file holding one page with empty `Feeds` and `Items`
    /// containers, then opens it. Fails if the file already exists.
    pub fn init(path: impl Into<PathBuf>, page: &str) -> Result<Self, StoreError> {
        let path = path.into();
        let mut doc = Document::default();
        doc.pages.insert(
            page.to_string(),
            vec![Block::new("b1", "Feeds"), Block::new("b2", "Items")],
        );
        let serialized = serde_json::to_string_pretty(&doc)?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        drop(file);
        tracing::info!(path = %path.display(), page = page, "Initialized new store");
        Self::open(path)
    }

    fn allocate_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("b{}", seq)
    }

    /// Atomically replaces the store file with the current document.
    fn persist(doc: &Document, path: &Path) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(doc)?;
        let temp_path = path.with_extension("tmp");
        let mut temp = std::fs::File::create(&temp_path)?;
        if let Err(e) = temp
            .write_all(serialized.as_bytes())
            .and_then(|_| temp.sync_all())
        {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        drop(temp);
        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl BlockStore for JsonStore {
    async fn read_page_block_tree(&self, page: &str) -> Result<Vec<Block>, StoreError> {
        self.doc
            .lock()
            .expect("document lock poisoned")
            .pages
            .get(page)
            .cloned()
            .ok_or_else(|| StoreError::PageNotFound(page.to_string()))
    }

    async fn update_block_text(&self, block_id: &str, new_text: &str) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().expect("document lock poisoned");
        let block = doc
            .pages
            .values_mut()
            .find_map(|blocks| find_block_mut(blocks, block_id))
            .ok_or_else(|| StoreError::BlockNotFound(block_id.to_string()))?;
        block.text = new_text.to_string();
        Self::persist(&doc, &self.path)
    }

    async fn insert_child_blocks(&self, parent_id: &str, texts: &[String]) -> Result<(), StoreError> {
        let ids: Vec<String> = texts.iter().map(|_| self.allocate_id()).collect();
        let mut doc = self.doc.lock().expect("document lock poisoned");
        let parent = doc
            .pages
            .values_mut()
            .find_map(|blocks| find_block_mut(blocks, parent_id))
            .ok_or_else(|| StoreError::BlockNotFound(parent_id.to_string()))?;
        for (id, text) in ids.into_iter().zip(texts) {
            parent.children.push(Block::new(id, text.clone()));
        }
        Self::persist(&doc, &self.path)
    }

    async fn remove_block(&self, block_id: &str) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().expect("document lock poisoned");
        let removed = doc
            .pages
            .values_mut()
            .any(|blocks| remove_block_from(blocks, block_id));
        if !removed {
            return Err(StoreError::BlockNotFound(block_id.to_string()));
        }
        Self::persist(&doc, &self.path)
    }
}

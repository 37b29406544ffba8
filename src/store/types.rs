use serde::{Deserialize, Serialize};

/// One node in a document page: an id, a text body, and ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

/// Depth-first search for a block by id, returning a mutable reference.
pub fn find_block_mut<'a>(blocks: &'a mut [Block], id: &str) -> Option<&'a mut Block> {
    for block in blocks {
        if block.id == id {
            return Some(block);
        }
        if let Some(found) = find_block_mut(&mut block.children, id) {
            return Some(found);
        }
    }
    None
}

/// Removes the block with `id` (and its subtree) from the forest.
/// Returns true if a block was removed.
pub fn remove_block_from(blocks: &mut Vec<Block>, id: &str) -> bool {
    if let Some(pos) = blocks.iter().position(|b| b.id == id) {
        blocks.remove(pos);
        return true;
    }
    blocks
        .iter_mut()
        .any(|b| remove_block_from(&mut b.children, id))
}

/// Highest sequence number among generated block ids of the form `b<N>`.
///
/// Stores allocate new ids by counting up from this, so ids stay unique
/// across reopen without a separate counter being persisted.
pub fn max_block_seq(blocks: &[Block]) -> u64 {
    blocks
        .iter()
        .map(|b| {
            let own = b
                .id
                .strip_prefix('b')
                .and_then(|rest| rest.parse::<u64>().ok())
                .unwrap_or(0);
            own.max(max_block_seq(&b.children))
        })
        .max()
        .unwrap_or(0)
}

use sha2::{Digest, Sha256};

/// Stable content digest of an ordered list of rendered item lines.
///
/// Used to decide whether the item container needs rewriting: equal digests
/// mean the refresh is a no-op for items. Each line is length-prefixed so
/// list boundaries cannot alias (`["ab", "c"]` vs `["a", "bc"]`).
pub fn list_digest(items: &[String]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update((item.len() as u64).to_le_bytes());
        hasher.update(item.as_bytes());
    }
    hasher.finalize().into()
}

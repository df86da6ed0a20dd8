//! Snapshot equality and fingerprinting
//!
//! A snapshot is the complete set of registrations one source produced at
//! one polling instant. Snapshots are replaced wholesale, never patched,
//! and compared as multisets of content hashes: duplicates matter, order
//! does not.

use crate::Registration;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;

/// The registrations one source produced at one polling instant.
pub type Snapshot = Vec<Registration>;

/// Multiset equality over content hashes.
///
/// `[X, X, Y]` and `[X, Y, Y]` are different; `[X, Y]` and `[Y, X]` are the
/// same. Hash collisions compare equal, which at worst suppresses a
/// redundant registry write.
pub fn snapshots_equal(a: &[Registration], b: &[Registration]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut counts: HashMap<u64, usize> = HashMap::with_capacity(a.len());
    for reg in a {
        *counts.entry(reg.content_hash()).or_insert(0) += 1;
    }
    for reg in b {
        let hash = reg.content_hash();
        match counts.get_mut(&hash) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&hash);
            }
            None => return false,
        }
    }

    counts.is_empty()
}

/// Single u64 identifying a snapshot's contents, independent of order.
///
/// Used as the idempotency key for registry writes and for compact logging.
/// Snapshots that are equal under [`snapshots_equal`] always share a
/// fingerprint.
pub fn snapshot_fingerprint(regs: &[Registration]) -> u64 {
    let mut hashes: Vec<u64> = regs.iter().map(Registration::content_hash).collect();
    hashes.sort_unstable();

    let mut hasher = DefaultHasher::new();
    for hash in &hashes {
        hasher.write_u64(*hash);
    }
    hasher.finish()
}

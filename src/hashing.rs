//! Hashing - SHA-256 Digests for Merge Outputs
//!
//! Two merges of the same fragments produce the same digests, which makes
//! reruns easy to compare.

use sha2::{Digest, Sha256};

use crate::tree::Node;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest of a merged document.
///
/// Mapping keys are hashed in sorted order, so two documents that differ
/// only in key order share a digest. Every value is tagged with its kind:
/// `1` and `"1"` hash differently.
pub fn content_digest(document: &Node) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, document);
    hex::encode(hasher.finalize())
}

fn feed(hasher: &mut Sha256, node: &Node) {
    match node {
        Node::Mapping(map) => {
            hasher.update(b"m");
            hasher.update((map.len() as u64).to_le_bytes());
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                feed_str(hasher, key);
                feed(hasher, value);
            }
        }
        Node::Sequence(items) => {
            hasher.update(b"s");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Node::String(value) => {
            hasher.update(b"S");
            feed_str(hasher, value);
        }
        Node::Bool(value) => hasher.update([b'b', u8::from(*value)]),
        Node::Int(value) => {
            hasher.update(b"i");
            hasher.update(value.to_le_bytes());
        }
        Node::Float(value) => {
            hasher.update(b"f");
            hasher.update(value.to_bits().to_le_bytes());
        }
        Node::Null => hasher.update(b"n"),
    }
}

// Length prefix keeps `["ab", "c"]` apart from `["a", "bc"]`.
fn feed_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

//! Content digests for move detection, and the short-lived cache that keeps
//! them around after the file itself is gone.
use std::collections::HashMap;
use std::io::Read as _;
use std::path::Path;
use std::time::{Duration, Instant};

use sha2::{Digest as _, Sha256};

use crate::types::ContentDigest;

/// Read buffer size for streaming digests.
const CHUNK_BYTES: usize = 64 * 1024;

/// Path → (digest, when computed). Entries older than the TTL are dead.
#[derive(Debug)]
pub struct HashCache {
    /// Cached digests keyed by project-relative path.
    entries: HashMap<String, (ContentDigest, Instant)>,
    /// Entry lifetime.
    ttl: Duration,
}

impl HashCache {
    /// Store a digest computed at `now`.
    pub fn insert(&mut self, path: &str, digest: ContentDigest, now: Instant) {
        self.entries.insert(path.to_string(), (digest, now));
        return;
    }

    /// An empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        return Self {
            entries: HashMap::new(),
            ttl,
        };
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (_, at)| return now.saturating_duration_since(*at) <= ttl);
        return before.saturating_sub(self.entries.len());
    }

    /// Remove the entry for `path`, returning its digest if it has not expired.
    pub fn take(&mut self, path: &str, now: Instant) -> Option<ContentDigest> {
        let (digest, at) = self.entries.remove(path)?;
        if now.saturating_duration_since(at) > self.ttl {
            return None;
        }
        return Some(digest);
    }
}

/// SHA-256 of a file's bytes, hex encoded.
///
/// Best effort: returns `None` when the file is missing, unreadable, not a
/// regular file, or at least `max_bytes` long.
pub fn digest_file(path: &Path, max_bytes: u64) -> Option<ContentDigest> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() || metadata.len() >= max_bytes {
        return None;
    }
    let mut file = std::fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_BYTES];
    loop {
        let read = file.read(&mut buffer).ok()?;
        if read == 0 {
            break;
        }
        hasher.update(buffer.get(..read)?);
    }
    return Some(ContentDigest(format!("{:x}", hasher.finalize())));
}

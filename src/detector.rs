//! Move detection: turns raw watcher events into semantic operations.
//!
//! Some platforms report a move as a delete followed by a create. Deletions
//! wait in a buffer keyed by file name for up to the move-detection window;
//! a creation with the same name that arrives in time (or whose content
//! digest matches) consumes the entry and becomes a move. Entries that expire
//! unmatched are reported as deletions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::hasher::{self, HashCache};
use crate::paths;
use crate::types::{ContentDigest, Operation};

/// How long an untracked rename half waits for its partner.
const RENAME_PAIR_WINDOW: Duration = Duration::from_secs(1);

/// A filesystem event after ingress filtering, with project-relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// An entry appeared.
    Created {
        /// Whether the new entry is a directory.
        is_dir: bool,
        /// Path of the new entry.
        path: String,
    },
    /// File content changed.
    Modified {
        /// Path of the changed file.
        path: String,
    },
    /// An entry disappeared.
    Removed {
        /// Whether the entry was known to be a directory.
        is_dir: bool,
        /// Path of the removed entry.
        path: String,
    },
    /// A rename with both ends known.
    Renamed {
        /// Previous path.
        from: String,
        /// Whether the destination is a directory.
        is_dir: bool,
        /// New path.
        to: String,
        /// Platform cookie linking this event to its halves, if any.
        tracker: Option<usize>,
    },
    /// The source half of a rename.
    RenamedFrom {
        /// Previous path.
        path: String,
        /// Platform cookie linking the halves, if any.
        tracker: Option<usize>,
    },
    /// The destination half of a rename.
    RenamedTo {
        /// Whether the destination is a directory.
        is_dir: bool,
        /// New path.
        path: String,
        /// Platform cookie linking the halves, if any.
        tracker: Option<usize>,
    },
}

/// Reconstructs moves from raw events. Holds the recent-deletions buffer and
/// the hash cache, each behind its own mutex.
#[derive(Debug)]
pub struct MoveDetector {
    /// Recently removed entries awaiting a matching creation.
    deletions: Mutex<DeletionBuffer>,
    /// Recent content digests, so a file can be matched after it is gone.
    hashes: Mutex<HashCache>,
    /// Files this size or larger are never hashed.
    max_hash_file_bytes: u64,
    /// Absolute project root.
    root: PathBuf,
    /// Lifetime of a buffered deletion.
    window: Duration,
}

/// A removal that may still turn out to be half of a move.
#[derive(Debug, Clone)]
struct Deletion {
    /// When it was observed.
    at: Instant,
    /// Content digest, if one was known.
    digest: Option<ContentDigest>,
    /// Whether the entry was a directory.
    is_dir: bool,
    /// Path that disappeared.
    path: String,
    /// Came from an explicit rename-from event.
    rename_half: bool,
    /// Platform rename cookie.
    tracker: Option<usize>,
}

/// The deletions buffer and the rename cookies already paired.
#[derive(Debug, Default)]
struct DeletionBuffer {
    /// File name → pending deletions with that name, oldest first.
    by_name: HashMap<String, Vec<Deletion>>,
    /// Cookies whose halves were paired, so the trailing combined event is dropped.
    paired_trackers: HashMap<usize, Instant>,
}

/// How a creation was matched to a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchSignal {
    /// Content digests were equal.
    Digest,
    /// The platform reported a rename.
    Rename,
    /// Same name within the detection window.
    Timing,
}

impl DeletionBuffer {
    /// Remove and return the deletion that best matches a creation at `path`:
    /// same kind and name, preferring an equal digest over the most recent.
    fn claim(&mut self, path: &str, is_dir: bool, digest: Option<&ContentDigest>) -> Option<(Deletion, MatchSignal)> {
        let name = paths::basename(path);
        let entries = self.by_name.get_mut(name)?;
        let by_digest = digest.and_then(|wanted| {
            return entries
                .iter()
                .position(|entry| return entry.is_dir == is_dir && entry.digest.as_ref() == Some(wanted));
        });
        let (position, signal) = match by_digest {
            Some(position) => (position, MatchSignal::Digest),
            None => (entries.iter().rposition(|entry| return entry.is_dir == is_dir)?, MatchSignal::Timing),
        };
        let deletion = entries.remove(position);
        if entries.is_empty() {
            self.by_name.remove(name);
        }
        return Some((deletion, signal));
    }

    /// Remove and return the deletion recorded from a rename-from event that
    /// carried `tracker`, or the newest untracked one when `tracker` is `None`.
    fn claim_rename_half(&mut self, tracker: Option<usize>, now: Instant) -> Option<Deletion> {
        let mut best: Option<(String, usize, Instant)> = None;
        for (name, entries) in &self.by_name {
            for (position, entry) in entries.iter().enumerate() {
                let fits = match tracker {
                    Some(cookie) => entry.tracker == Some(cookie),
                    None => {
                        entry.rename_half
                            && entry.tracker.is_none()
                            && now.saturating_duration_since(entry.at) <= RENAME_PAIR_WINDOW
                    },
                };
                let newer = best.as_ref().is_none_or(|(_, _, at)| return entry.at > *at);
                if fits && newer {
                    best = Some((name.clone(), position, entry.at));
                }
            }
        }
        let (name, position, _) = best?;
        let entries = self.by_name.get_mut(&name)?;
        let deletion = entries.remove(position);
        if entries.is_empty() {
            self.by_name.remove(&name);
        }
        return Some(deletion);
    }

    /// Drop every buffered deletion of exactly `path`.
    fn discard(&mut self, path: &str) {
        let name = paths::basename(path);
        let now_empty = self.by_name.get_mut(name).is_some_and(|entries| {
            entries.retain(|entry| return entry.path != path);
            return entries.is_empty();
        });
        if now_empty {
            self.by_name.remove(name);
        }
        return;
    }

    /// Remove entries older than `window` and return them oldest first.
    fn drain_expired(&mut self, now: Instant, window: Duration) -> Vec<Deletion> {
        let mut expired = Vec::new();
        self.by_name.retain(|_, entries| {
            let (old, fresh): (Vec<Deletion>, Vec<Deletion>) =
                entries.drain(..).partition(|entry| return now.saturating_duration_since(entry.at) > window);
            expired.extend(old);
            *entries = fresh;
            return !entries.is_empty();
        });
        self.paired_trackers.retain(|_, at| return now.saturating_duration_since(*at) <= window);
        expired.sort_by(|a, b| return a.at.cmp(&b.at).then_with(|| return a.path.cmp(&b.path)));
        return expired;
    }

    /// Buffer a deletion.
    fn push(&mut self, deletion: Deletion) {
        let name = paths::basename(&deletion.path).to_string();
        self.by_name.entry(name).or_default().push(deletion);
        return;
    }
}

impl MoveDetector {
    /// Buffer a removal, carrying over any cached digest. The digest is read
    /// from disk as a last resort, in case the path still exists.
    fn buffer_deletion(&self, path: String, is_dir: bool, rename_half: bool, tracker: Option<usize>, now: Instant) {
        let cached = self.hashes().take(&path, now);
        let digest = cached.or_else(|| {
            if is_dir {
                return None;
            }
            return hasher::digest_file(&self.root.join(&path), self.max_hash_file_bytes);
        });
        let mut deletions = self.deletions();
        deletions.discard(&path);
        deletions.push(Deletion {
            at: now,
            digest,
            is_dir,
            path,
            rename_half,
            tracker,
        });
        return;
    }

    /// Acquire the deletions buffer, recovering from a poisoned lock.
    fn deletions(&self) -> MutexGuard<'_, DeletionBuffer> {
        return self.deletions.lock().unwrap_or_else(PoisonError::into_inner);
    }

    /// Emit any buffered deletions whose window has passed, and prune the
    /// hash cache.
    pub fn expire(&self, now: Instant) -> Vec<Operation> {
        let expired = self.deletions().drain_expired(now, self.window);
        self.hashes().prune(now);
        return expired.into_iter().map(|deletion| return Operation::Deleted { path: deletion.path }).collect();
    }

    /// Report every buffered deletion as final. Used at shutdown.
    pub fn flush(&self) -> Vec<Operation> {
        let mut deletions = self.deletions();
        let mut pending: Vec<Deletion> = deletions.by_name.drain().flat_map(|(_, entries)| return entries).collect();
        deletions.paired_trackers.clear();
        drop(deletions);
        pending.sort_by(|a, b| return a.at.cmp(&b.at).then_with(|| return a.path.cmp(&b.path)));
        return pending.into_iter().map(|deletion| return Operation::Deleted { path: deletion.path }).collect();
    }

    /// Translate one raw event observed at `now` into zero or more operations.
    pub fn handle(&self, event: RawEvent, now: Instant) -> Vec<Operation> {
        let mut operations = self.expire(now);
        let produced = match event {
            RawEvent::Created { is_dir, path } => Some(self.on_created(path, is_dir, now)),
            RawEvent::Modified { path } => Some(self.on_modified(path, now)),
            RawEvent::Removed { is_dir, path } => {
                self.buffer_deletion(path, is_dir, false, None, now);
                None
            },
            RawEvent::Renamed {
                from,
                is_dir,
                to,
                tracker,
            } => self.on_renamed(from, to, is_dir, tracker, now),
            RawEvent::RenamedFrom { path, tracker } => {
                self.buffer_deletion(path, false, true, tracker, now);
                None
            },
            RawEvent::RenamedTo { is_dir, path, tracker } => Some(self.on_renamed_to(path, is_dir, tracker, now)),
        };
        operations.extend(produced);
        return operations;
    }

    /// Digest the file at a project-relative path and cache the result.
    fn hash_and_cache(&self, path: &str, now: Instant) -> Option<ContentDigest> {
        let digest = hasher::digest_file(&self.root.join(path), self.max_hash_file_bytes)?;
        self.hashes().insert(path, digest.clone(), now);
        return Some(digest);
    }

    /// Acquire the hash cache, recovering from a poisoned lock.
    fn hashes(&self) -> MutexGuard<'_, HashCache> {
        return self.hashes.lock().unwrap_or_else(PoisonError::into_inner);
    }

    /// Build the move operation for a matched pair and log it.
    fn moved(from: String, to: String, is_dir: bool, signal: MatchSignal) -> Operation {
        tracing::info!(event = "move_detected", %from, %to, is_dir, signal = ?signal, "move detected");
        if is_dir {
            return Operation::DirectoryMoved { from, to };
        }
        return Operation::Moved { from, to };
    }

    /// A detector for the tree at `root` (absolute).
    pub fn new(root: PathBuf, config: &Config) -> Self {
        return Self {
            deletions: Mutex::new(DeletionBuffer::default()),
            hashes: Mutex::new(HashCache::new(config.hash_cache_ttl)),
            max_hash_file_bytes: config.max_hash_file_bytes,
            root,
            window: config.move_detection_window,
        };
    }

    /// A creation either completes a buffered deletion or is new.
    fn on_created(&self, path: String, is_dir: bool, now: Instant) -> Operation {
        let digest = if is_dir { None } else { self.hash_and_cache(&path, now) };
        let claimed = self.deletions().claim(&path, is_dir, digest.as_ref());
        return match claimed {
            // Deleted and recreated in place: an editor's save, not a move.
            Some((deletion, _)) if deletion.path == path => Operation::Modified { path },
            Some((deletion, signal)) => Self::moved(deletion.path, path, is_dir, signal),
            None => Operation::Created { path },
        };
    }

    /// Refresh the digest so a move right after an edit still matches.
    fn on_modified(&self, path: String, now: Instant) -> Operation {
        self.hash_and_cache(&path, now);
        return Operation::Modified { path };
    }

    /// A rename with both ends. Dropped when its halves were already paired.
    fn on_renamed(&self, from: String, to: String, is_dir: bool, tracker: Option<usize>, now: Instant) -> Option<Operation> {
        let mut deletions = self.deletions();
        if let Some(cookie) = tracker
            && deletions.paired_trackers.remove(&cookie).is_some()
        {
            return None;
        }
        deletions.discard(&from);
        drop(deletions);
        let mut hashes = self.hashes();
        if let Some(digest) = hashes.take(&from, now) {
            hashes.insert(&to, digest, now);
        }
        drop(hashes);
        return Some(Self::moved(from, to, is_dir, MatchSignal::Rename));
    }

    /// The destination half of a rename: pair it with its source half, or
    /// treat it as a creation when the source is outside the tree.
    fn on_renamed_to(&self, path: String, is_dir: bool, tracker: Option<usize>, now: Instant) -> Operation {
        let mut deletions = self.deletions();
        let Some(half) = deletions.claim_rename_half(tracker, now) else {
            drop(deletions);
            return self.on_created(path, is_dir, now);
        };
        if let Some(cookie) = tracker {
            deletions.paired_trackers.insert(cookie, now);
        }
        drop(deletions);
        if !is_dir {
            self.hash_and_cache(&path, now);
        }
        return Self::moved(half.path, path, is_dir || half.is_dir, MatchSignal::Rename);
    }
}

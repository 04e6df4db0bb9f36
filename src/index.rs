//! The reference index: normalised target → records, plus a per-source
//! secondary index for wholesale invalidation when a file is re-parsed.
//!
//! Every accessor takes the single state mutex for the duration of the call
//! and hands back owned copies, so callers never do I/O under the lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::paths;
use crate::types::Reference;

/// Identifier of a stored record, unique for the life of the index.
type RecordId = u64;

/// Process-local, mutex-guarded reference index.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    /// All mutable state.
    state: Mutex<IndexState>,
}

/// Counts describing the index, for logs and `scan` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Stored reference records.
    pub records: usize,
    /// Files contributing at least one record.
    pub sources: usize,
    /// Distinct target keys.
    pub targets: usize,
}

/// State behind the mutex.
#[derive(Debug, Default)]
struct IndexState {
    /// Source file → its records, in insertion order.
    by_source: HashMap<String, Vec<RecordId>>,
    /// Normalised target → records stored under it, in insertion order.
    by_target: BTreeMap<String, Vec<RecordId>>,
    /// Next identifier to hand out.
    next_id: RecordId,
    /// The records themselves.
    records: HashMap<RecordId, StoredRecord>,
}

/// A record together with the key it is currently stored under.
#[derive(Debug, Clone)]
struct StoredRecord {
    /// Bucket key in `by_target`.
    key: String,
    /// The reference as parsed.
    reference: Reference,
}

impl IndexState {
    /// Insert one record. Returns `false` if it points outside the root.
    fn insert(&mut self, reference: Reference) -> bool {
        let raw = reference.target_path().to_string();
        let key = paths::normalize(&raw);
        let resolved = paths::resolve_from(paths::dirname(&reference.source), &raw);
        if key.is_empty() || (paths::escapes_root(&key) && paths::escapes_root(&resolved)) {
            return false;
        }

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.by_source.entry(reference.source.clone()).or_default().push(id);
        self.by_target.entry(key.clone()).or_default().push(id);
        self.records.insert(id, StoredRecord { key, reference });
        return true;
    }

    /// Ids of every record matching `target` under the three lookup rules.
    fn matching(&self, target: &str) -> BTreeSet<RecordId> {
        let wanted = paths::normalize(target);
        let name = paths::basename(&wanted);
        let parent = paths::dirname(&wanted);
        let mut ids = BTreeSet::new();

        if let Some(bucket) = self.by_target.get(&wanted) {
            ids.extend(bucket.iter().copied());
        }
        if name != wanted
            && let Some(bucket) = self.by_target.get(name)
        {
            ids.extend(bucket.iter().copied().filter(|id| {
                return self
                    .records
                    .get(id)
                    .is_some_and(|stored| return paths::dirname(&stored.reference.source) == parent);
            }));
        }
        // Relative spellings (`../b/x.txt`) live under other keys with the same file name.
        for (key, bucket) in &self.by_target {
            if key == &wanted || paths::basename(key) != name {
                continue;
            }
            ids.extend(bucket.iter().copied().filter(|id| {
                return self.records.get(id).is_some_and(|stored| return resolves_to(&stored.reference, &wanted));
            }));
        }
        return ids;
    }

    /// Drop every record contributed by `source`.
    fn remove_source(&mut self, source: &str) -> usize {
        let Some(ids) = self.by_source.remove(source) else {
            return 0;
        };
        for id in &ids {
            let Some(stored) = self.records.remove(id) else {
                continue;
            };
            let now_empty = self.by_target.get_mut(&stored.key).is_some_and(|bucket| {
                bucket.retain(|other| return other != id);
                return bucket.is_empty();
            });
            if now_empty {
                self.by_target.remove(&stored.key);
            }
        }
        return ids.len();
    }

    /// Copies of the records behind `ids`, in id order.
    fn references(&self, ids: impl IntoIterator<Item = RecordId>) -> Vec<Reference> {
        return ids
            .into_iter()
            .filter_map(|id| return self.records.get(&id).map(|stored| return stored.reference.clone()))
            .collect();
    }
}

impl ReferenceIndex {
    /// Every key equal to `dir` or beneath it.
    pub fn keys_under(&self, dir: &str) -> Vec<String> {
        let state = self.lock();
        return state.by_target.keys().filter(|key| return paths::is_under(dir, key)).cloned().collect();
    }

    /// Acquire the state, recovering from a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, IndexState> {
        return self.state.lock().unwrap_or_else(PoisonError::into_inner);
    }

    /// All records referring to `target`: stored under `normalise(target)`,
    /// or under its bare file name from a file in the same directory, or
    /// resolving to it from their own directory.
    pub fn lookup(&self, target: &str) -> Vec<Reference> {
        let state = self.lock();
        let ids = state.matching(target);
        return state.references(ids);
    }

    /// Records contributed by `source`, in the order they were added.
    pub fn records_from(&self, source: &str) -> Vec<Reference> {
        let state = self.lock();
        let ids = state.by_source.get(source).cloned().unwrap_or_default();
        return state.references(ids);
    }

    /// Move the bucket under `old` to `new`, merging with anything already
    /// there. Returns the source files whose records moved; their raw
    /// targets still need re-parsing to match the new key.
    pub fn rekey(&self, old: &str, new: &str) -> BTreeSet<String> {
        let old_key = paths::normalize(old);
        let new_key = paths::normalize(new);
        let mut sources = BTreeSet::new();
        if old_key == new_key {
            return sources;
        }
        let mut state = self.lock();
        let Some(ids) = state.by_target.remove(&old_key) else {
            return sources;
        };
        for id in &ids {
            if let Some(stored) = state.records.get_mut(id) {
                stored.key.clone_from(&new_key);
                sources.insert(stored.reference.source.clone());
            }
        }
        state.by_target.entry(new_key).or_default().extend(ids);
        return sources;
    }

    /// Drop all records contributed by `source`. Returns how many went.
    pub fn remove_source(&self, source: &str) -> usize {
        return self.lock().remove_source(source);
    }

    /// Swap a file's records for a freshly parsed set in one critical section.
    /// Returns how many of the new records were stored.
    pub fn replace_source(&self, source: &str, references: Vec<Reference>) -> usize {
        let mut state = self.lock();
        state.remove_source(source);
        let mut stored = 0_usize;
        for reference in references {
            if state.insert(reference) {
                stored = stored.saturating_add(1);
            }
        }
        return stored;
    }

    /// Everything in the index, grouped by key in key order.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Reference>> {
        let state = self.lock();
        return state
            .by_target
            .iter()
            .map(|(key, ids)| return (key.clone(), state.references(ids.iter().copied())))
            .collect();
    }

    /// Source files equal to `dir` or beneath it.
    pub fn sources_under(&self, dir: &str) -> Vec<String> {
        let state = self.lock();
        let mut sources: Vec<String> =
            state.by_source.keys().filter(|source| return paths::is_under(dir, source)).cloned().collect();
        sources.sort();
        return sources;
    }

    /// Current counts.
    pub fn stats(&self) -> IndexStats {
        let state = self.lock();
        return IndexStats {
            records: state.records.len(),
            sources: state.by_source.len(),
            targets: state.by_target.len(),
        };
    }

    /// Distinct project paths under `dir` that some record refers to,
    /// either by key or by resolution from its source directory.
    pub fn targets_under(&self, dir: &str) -> Vec<String> {
        let state = self.lock();
        let mut targets = BTreeSet::new();
        for stored in state.records.values() {
            if paths::is_under(dir, &stored.key) {
                targets.insert(stored.key.clone());
            }
            let resolved = resolved_target(&stored.reference);
            if paths::is_under(dir, &resolved) {
                targets.insert(resolved);
            }
        }
        return targets.into_iter().collect();
    }
}

/// Where a record's target lands, read relative to its source directory.
pub fn resolved_target(reference: &Reference) -> String {
    return paths::resolve_from(paths::dirname(&reference.source), reference.target_path());
}

/// Whether a record, resolved from its source directory, lands on `wanted`.
fn resolves_to(reference: &Reference, wanted: &str) -> bool {
    return resolved_target(reference) == wanted;
}

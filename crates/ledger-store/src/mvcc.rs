//! Multi-version key space
//!
//! Each key keeps a short, ascending list of committed versions. A reader at
//! timestamp `ts` sees the newest version with `commit_ts <= ts`; a tombstone
//! hides the key.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use bytes::Bytes;

use crate::Row;

#[derive(Clone, Debug)]
struct Version {
    commit_ts: u64,
    value: Option<Bytes>,
}

/// Versioned key space with a single commit clock
#[derive(Debug, Default)]
pub struct VersionedMap {
    entries: BTreeMap<Bytes, Vec<Version>>,
    last_commit: u64,
}

impl VersionedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the newest commit
    pub fn last_commit(&self) -> u64 {
        self.last_commit
    }

    /// Value of `key` as of `ts`
    pub fn get(&self, key: &[u8], ts: u64) -> Option<Bytes> {
        self.entries
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.commit_ts <= ts)
            .and_then(|v| v.value.clone())
    }

    /// Live rows in `[start, end)` as of `ts`, at most `limit`
    pub fn scan(&self, start: &[u8], end: &[u8], ts: u64, limit: usize) -> Vec<Row> {
        if start >= end {
            return Vec::new();
        }

        self.entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .filter_map(|(key, versions)| {
                versions
                    .iter()
                    .rev()
                    .find(|v| v.commit_ts <= ts)
                    .and_then(|v| v.value.clone())
                    .map(|value| Row::new(key.clone(), value))
            })
            .take(limit)
            .collect()
    }

    /// Commit timestamp of the newest version of `key`, 0 if never written
    pub fn latest_commit(&self, key: &[u8]) -> u64 {
        self.entries
            .get(key)
            .and_then(|versions| versions.last())
            .map_or(0, |v| v.commit_ts)
    }

    /// Whether any key in `[start, end)` was written after `ts`
    pub fn range_changed_since(&self, start: &[u8], end: &[u8], ts: u64) -> bool {
        if start >= end {
            return false;
        }

        self.entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .any(|(_, versions)| versions.last().map_or(false, |v| v.commit_ts > ts))
    }

    /// Apply a write set at a fresh commit timestamp.
    ///
    /// `horizon` is the oldest read timestamp still in use; versions no reader
    /// at or after it can see are dropped.
    pub fn apply(&mut self, writes: HashMap<Bytes, Option<Bytes>>, horizon: u64) -> u64 {
        self.last_commit += 1;
        let commit_ts = self.last_commit;

        for (key, value) in writes {
            let versions = self.entries.entry(key).or_default();
            versions.push(Version { commit_ts, value });

            let visible = versions
                .iter()
                .rposition(|v| v.commit_ts <= horizon)
                .unwrap_or(0);
            versions.drain(..visible);
        }

        commit_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(map: &mut VersionedMap, key: &str, value: Option<&str>, horizon: u64) -> u64 {
        let mut writes = HashMap::new();
        writes.insert(
            Bytes::copy_from_slice(key.as_bytes()),
            value.map(|v| Bytes::copy_from_slice(v.as_bytes())),
        );
        map.apply(writes, horizon)
    }

    #[test]
    fn test_reads_see_their_timestamp() {
        let mut map = VersionedMap::new();
        let t1 = write(&mut map, "a", Some("1"), 0);
        let t2 = write(&mut map, "a", Some("2"), 0);

        assert_eq!(map.get(b"a", 0), None);
        assert_eq!(map.get(b"a", t1).as_deref(), Some(&b"1"[..]));
        assert_eq!(map.get(b"a", t2).as_deref(), Some(&b"2"[..]));
        assert_eq!(map.latest_commit(b"a"), t2);
        assert_eq!(map.latest_commit(b"b"), 0);
    }

    #[test]
    fn test_tombstone_hides_key() {
        let mut map = VersionedMap::new();
        let t1 = write(&mut map, "a", Some("1"), 0);
        let t2 = write(&mut map, "a", None, 0);

        assert!(map.get(b"a", t1).is_some());
        assert!(map.get(b"a", t2).is_none());
        assert!(map.scan(b"a", b"b", t2, 10).is_empty());
    }

    #[test]
    fn test_scan_is_ordered_and_limited() {
        let mut map = VersionedMap::new();
        write(&mut map, "ab", Some("2"), 0);
        write(&mut map, "aa", Some("1"), 0);
        let ts = write(&mut map, "bb", Some("3"), 0);

        let rows = map.scan(b"a", b"b", ts, 100);
        let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![Bytes::from_static(b"aa"), Bytes::from_static(b"ab")]);

        assert_eq!(map.scan(b"a", b"c", ts, 2).len(), 2);
        assert!(map.scan(b"b", b"a", ts, 10).is_empty());
    }

    #[test]
    fn test_range_changed_since() {
        let mut map = VersionedMap::new();
        let t1 = write(&mut map, "a1", Some("x"), 0);
        write(&mut map, "c1", Some("y"), 0);

        assert!(!map.range_changed_since(b"a", b"b", t1));
        write(&mut map, "a2", Some("z"), 0);
        assert!(map.range_changed_since(b"a", b"b", t1));
    }

    #[test]
    fn test_prune_keeps_versions_visible_to_horizon() {
        let mut map = VersionedMap::new();
        let t1 = write(&mut map, "a", Some("1"), 0);
        write(&mut map, "a", Some("2"), t1);
        let t3 = write(&mut map, "a", Some("3"), t1);

        // A reader pinned at t1 still sees its version.
        assert_eq!(map.get(b"a", t1).as_deref(), Some(&b"1"[..]));

        write(&mut map, "a", Some("4"), t3);
        assert_eq!(map.get(b"a", t1), None);
        assert_eq!(map.get(b"a", t3).as_deref(), Some(&b"3"[..]));
    }
}

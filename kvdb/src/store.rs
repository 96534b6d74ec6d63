use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::bucket::Bucket;
use crate::error::{CResult, Error};
use crate::timestamp::Timestamp;
use crate::value::Value;

/// Ambient, teacher-style engine status snapshot (mirrors `kv::storage::Status`),
/// surfaced by `DEBUG` and by the server's periodic logging.
#[derive(Clone, Debug)]
pub struct Status {
    pub name: &'static str,
    pub keys: usize,
    pub distinct_values: usize,
    pub purge_period: Duration,
}

/// One versioned table + value-frequency index, with purge bookkeeping.
///
/// The root `Store` (owned by [`crate::session::Database`]) keeps full
/// version history (`autopurge = false`) and is the only one ever actually
/// purged. Every `TransactionScope` level is its own `Store` with
/// `autopurge = true`: it only ever needs its latest write at its own
/// timestamp, so there is nothing for the background purger to do there —
/// the scope itself is simply discarded whole on commit or rollback.
pub struct Store {
    table: HashMap<Vec<u8>, Bucket<Value>>,
    index: HashMap<Vec<u8>, Bucket<i64>>,
    autopurge: bool,
    purge_stamp: Instant,
    purge_period: Duration,
}

impl Store {
    pub fn new_root(purge_period: Duration) -> Self {
        Store {
            table: HashMap::new(),
            index: HashMap::new(),
            autopurge: false,
            purge_stamp: Instant::now(),
            purge_period,
        }
    }

    pub fn new_scope() -> Self {
        Store {
            table: HashMap::new(),
            index: HashMap::new(),
            autopurge: true,
            purge_stamp: Instant::now(),
            purge_period: Duration::MAX,
        }
    }

    pub fn read_local(&mut self, key: &[u8], t: Timestamp) -> Option<(Value, Timestamp)> {
        self.table.get_mut(key).and_then(|b| b.read(t))
    }

    pub fn read_index_local(&mut self, value: &[u8], t: Timestamp) -> Option<(i64, Timestamp)> {
        self.index.get_mut(value).and_then(|b| b.read(t))
    }

    pub fn insert_table_local(&mut self, key: &[u8], value: Value, t: Timestamp) {
        match self.table.get_mut(key) {
            Some(b) => b.insert(value, t, self.autopurge),
            None => {
                self.table.insert(key.to_vec(), Bucket::new(value, t));
            }
        }
    }

    pub fn insert_index_local(&mut self, value: &[u8], count: i64, t: Timestamp) {
        match self.index.get_mut(value) {
            Some(b) => b.insert(count, t, self.autopurge),
            None => {
                self.index.insert(value.to_vec(), Bucket::new(count, t));
            }
        }
    }

    /// Writes `value` for `key` at `t`, adjusting the value-frequency index
    /// for the value being replaced and the value taking its place. `old`
    /// is the value this key resolved to just before this write, as seen
    /// through whatever fall-through chain the caller is operating in —
    /// `Store` itself knows nothing about parent scopes. For the same
    /// reason, `old_count`/`new_count` (the counts presently on file for
    /// `old`'s and `new`'s bytes, ignored when not `Value::Real`) must
    /// already be resolved by the caller through that same fall-through
    /// chain — a raw local read here would see only this store's own,
    /// usually near-empty, nested history and not the parent's or root's.
    pub fn apply_write(
        &mut self,
        key: &[u8],
        old: Value,
        new: Value,
        t: Timestamp,
        old_count: i64,
        new_count: i64,
    ) -> CResult<()> {
        self.insert_table_local(key, new.clone(), t);
        if old == new {
            return Ok(());
        }
        if let Value::Real(old_bytes) = &old {
            let nc = old_count - 1;
            if nc < 0 {
                return Err(Error::Invariant(format!(
                    "index count for a retired value went negative ({nc})"
                )));
            }
            self.insert_index_local(old_bytes, nc, t);
        }
        if let Value::Real(new_bytes) = &new {
            self.insert_index_local(new_bytes, new_count + 1, t);
        }
        Ok(())
    }

    /// Merges an incoming set of buckets (a committing scope's table and
    /// index) into this store. Returns `Ok(false)` — a conflict, nothing
    /// merged — if any incoming key/value was observed locally after the
    /// incoming bucket's latest write, i.e. the committer's view was stale by
    /// the time it tried to land.
    pub fn merge(
        &mut self,
        table: HashMap<Vec<u8>, Bucket<Value>>,
        index: HashMap<Vec<u8>, Bucket<i64>>,
    ) -> CResult<bool> {
        for (k, bucket) in &table {
            if let Some(local) = self.table.get(k) {
                if local.read_stamp() > bucket.latest_write_stamp() {
                    return Ok(false);
                }
            }
        }
        for (v, bucket) in &index {
            if let Some(local) = self.index.get(v) {
                if local.read_stamp() > bucket.latest_write_stamp() {
                    return Ok(false);
                }
            }
        }
        for (k, bucket) in table {
            let (entries, _) = bucket.into_parts();
            for (value, t) in entries {
                self.insert_table_local(&k, value, t);
            }
        }
        for (v, bucket) in index {
            let (entries, _) = bucket.into_parts();
            for (count, t) in entries {
                self.insert_index_local(&v, count, t);
            }
        }
        Ok(true)
    }

    pub fn into_parts(self) -> (HashMap<Vec<u8>, Bucket<Value>>, HashMap<Vec<u8>, Bucket<i64>>) {
        (self.table, self.index)
    }

    /// Rate-limited compaction: entries with write stamp `<= horizon` are
    /// dropped unless they are the sole surviving version, and a key whose
    /// sole surviving version is a tombstone (`Value::Absent` / count `<=
    /// 0`) is removed outright. A no-op on transactional scopes — `autopurge`
    /// is always true there and they never live long enough to need it.
    pub fn purge(&mut self, horizon: Timestamp, now: Instant) {
        if !self.autopurge && now.duration_since(self.purge_stamp) < self.purge_period {
            return;
        }
        self.table.retain(|_, bucket| {
            if let Some(v) = bucket.single_value() {
                if matches!(v, Value::Absent) {
                    return false;
                }
            }
            bucket.retain_after(horizon);
            true
        });
        self.index.retain(|_, bucket| {
            if let Some(c) = bucket.single_value() {
                if *c <= 0 {
                    return false;
                }
            }
            bucket.retain_after(horizon);
            true
        });
        self.purge_stamp = now;
    }

    pub fn status(&self) -> Status {
        Status {
            name: "kvdb",
            keys: self.table.len(),
            distinct_values: self.index.len(),
            purge_period: self.purge_period,
        }
    }

    pub fn debug_dump(&self) -> String {
        let mut table: Vec<_> = self
            .table
            .iter()
            .map(|(k, b)| (String::from_utf8_lossy(k).into_owned(), b.single_value().cloned()))
            .collect();
        table.sort_by(|a, b| a.0.cmp(&b.0));
        let mut index: Vec<_> = self
            .index
            .iter()
            .map(|(v, b)| (String::from_utf8_lossy(v).into_owned(), b.single_value().copied()))
            .collect();
        index.sort_by(|a, b| a.0.cmp(&b.0));
        format!("TABLE {table:?} INDEX {index:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::TimestampSource;

    #[test]
    fn write_then_read_round_trips() {
        let ts = TimestampSource::new();
        let mut store = Store::new_root(Duration::from_secs(20));
        let t = ts.mint();
        store
            .apply_write(b"a", Value::Absent, Value::Real(b"1".to_vec()), t, 0, 0)
            .unwrap();
        assert_eq!(store.read_local(b"a", t), Some((Value::Real(b"1".to_vec()), t)));
    }

    #[test]
    fn apply_write_maintains_index_counts() {
        let ts = TimestampSource::new();
        let mut store = Store::new_root(Duration::from_secs(20));
        let t1 = ts.mint();
        let count_x_t1 = store.read_index_local(b"x", t1).map(|(c, _)| c).unwrap_or(0);
        store
            .apply_write(b"a", Value::Absent, Value::Real(b"x".to_vec()), t1, 0, count_x_t1)
            .unwrap();
        let t2 = ts.mint();
        let count_x_t2 = store.read_index_local(b"x", t2).map(|(c, _)| c).unwrap_or(0);
        store
            .apply_write(b"b", Value::Absent, Value::Real(b"x".to_vec()), t2, 0, count_x_t2)
            .unwrap();
        assert_eq!(store.read_index_local(b"x", t2).map(|(c, _)| c), Some(2));

        let t3 = ts.mint();
        let count_x_t3 = store.read_index_local(b"x", t3).map(|(c, _)| c).unwrap_or(0);
        store
            .apply_write(b"a", Value::Real(b"x".to_vec()), Value::Absent, t3, count_x_t3, 0)
            .unwrap();
        assert_eq!(store.read_index_local(b"x", t3).map(|(c, _)| c), Some(1));
    }

    #[test]
    fn merge_rejects_stale_read() {
        let ts = TimestampSource::new();
        let mut root = Store::new_root(Duration::from_secs(20));
        let t1 = ts.mint();
        root.apply_write(b"a", Value::Absent, Value::Real(b"1".to_vec()), t1, 0, 0)
            .unwrap();
        let count_1 = root.read_index_local(b"1", t1).map(|(c, _)| c).unwrap_or(0);

        // Another writer reads "a" after t1, then a second, earlier-started
        // writer tries to merge a write to "a" stamped before that read.
        root.read_local(b"a", ts.mint());

        let mut scope = Store::new_scope();
        scope
            .apply_write(
                b"a",
                Value::Real(b"1".to_vec()),
                Value::Real(b"2".to_vec()),
                t1,
                count_1,
                0,
            )
            .unwrap();
        let (table, index) = scope.into_parts();
        assert!(!root.merge(table, index).unwrap());
    }

    #[test]
    fn purge_drops_tombstone_singletons() {
        let ts = TimestampSource::new();
        let mut root = Store::new_root(Duration::from_secs(0));
        let t1 = ts.mint();
        let count_1_t1 = root.read_index_local(b"1", t1).map(|(c, _)| c).unwrap_or(0);
        root.apply_write(b"a", Value::Absent, Value::Real(b"1".to_vec()), t1, 0, count_1_t1)
            .unwrap();
        let t2 = ts.mint();
        let count_1_t2 = root.read_index_local(b"1", t2).map(|(c, _)| c).unwrap_or(0);
        root.apply_write(b"a", Value::Real(b"1".to_vec()), Value::Absent, t2, count_1_t2, 0)
            .unwrap();
        root.purge(ts.peek(), Instant::now());
        assert_eq!(root.status().keys, 0);
    }
}

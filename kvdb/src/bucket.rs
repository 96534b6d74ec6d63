use crate::timestamp::Timestamp;

/// The version history for a single key (in the table) or a single value (in
/// the index): an ascending-by-write-stamp list of `(value, write_stamp)`
/// pairs plus the high-water mark of every timestamp this bucket has been
/// read at.
///
/// `read_stamp` is what `Store::merge` checks a concurrent writer's commit
/// against: if this bucket was observed at a stamp later than the incoming
/// write, the writer saw a stale value and must be refused.
#[derive(Clone, Debug)]
pub struct Bucket<V> {
    entries: Vec<(V, Timestamp)>,
    read_stamp: Timestamp,
}

impl<V: Clone> Bucket<V> {
    pub fn new(value: V, t: Timestamp) -> Self {
        Bucket {
            entries: vec![(value, t)],
            read_stamp: t,
        }
    }

    pub fn read_stamp(&self) -> Timestamp {
        self.read_stamp
    }

    pub fn latest_write_stamp(&self) -> Timestamp {
        self.entries.last().map(|(_, t)| *t).unwrap_or(Timestamp::ZERO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn single_value(&self) -> Option<&V> {
        match self.entries.as_slice() {
            [(v, _)] => Some(v),
            _ => None,
        }
    }

    /// Returns the pair with the largest write stamp `<= t`, or `None` if the
    /// bucket has no such entry. Always bumps `read_stamp` to at least `t`
    /// first — a later query against this key must see that it was observed
    /// here, whether or not the observation found anything.
    pub fn read(&mut self, t: Timestamp) -> Option<(V, Timestamp)> {
        self.read_stamp = self.read_stamp.max(t);
        self.entries.iter().rev().find(|(_, ts)| *ts <= t).cloned()
    }

    /// Inserts `(value, t)` in ascending write-stamp order. When `autopurge`
    /// is set (every non-root scope), entries with a write stamp `<= t` are
    /// dropped as part of the same insert — a transactional scope only ever
    /// needs its own latest write at or before its single timestamp, never
    /// the full history. The root store keeps everything (`autopurge =
    /// false`); its history is trimmed only by the separate purge sweep.
    pub fn insert(&mut self, value: V, t: Timestamp, autopurge: bool) {
        let i = self.entries.partition_point(|(_, ts)| *ts <= t);
        if autopurge {
            let tail = self.entries.split_off(i);
            self.entries = std::iter::once((value, t)).chain(tail).collect();
        } else {
            self.entries.insert(i, (value, t));
        }
        self.read_stamp = self.read_stamp.max(t);
    }

    /// Consumes the bucket, yielding its entries and read stamp for a merge.
    pub fn into_parts(self) -> (Vec<(V, Timestamp)>, Timestamp) {
        (self.entries, self.read_stamp)
    }

    /// Keeps only entries with write stamp `> horizon`; if that would empty
    /// the bucket, keeps the single most recent entry instead (an entry
    /// still live for any reader at or above the horizon must survive).
    pub fn retain_after(&mut self, horizon: Timestamp) {
        let kept: Vec<_> = self
            .entries
            .iter()
            .cloned()
            .filter(|(_, ts)| *ts > horizon)
            .collect();
        self.entries = if kept.is_empty() {
            vec![self.entries.last().cloned().expect("bucket is never empty")]
        } else {
            kept
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_latest_entry_at_or_before_t() {
        let src = crate::timestamp::TimestampSource::new();
        let t1 = src.mint();
        let t2 = src.mint();
        let t3 = src.mint();
        let mut b = Bucket::new(1, t1);
        b.insert(2, t2, false);
        assert_eq!(b.read(t3), Some((2, t2)));
        assert_eq!(b.read(t1), Some((1, t1)));
    }

    #[test]
    fn autopurge_collapses_same_scope_overwrites() {
        let src = crate::timestamp::TimestampSource::new();
        let t = src.mint();
        let mut b = Bucket::new(1, t);
        b.insert(2, t, true);
        assert_eq!(b.len(), 1);
        assert_eq!(b.single_value(), Some(&2));
    }

    #[test]
    fn read_bumps_read_stamp_on_miss_when_key_exists() {
        let src = crate::timestamp::TimestampSource::new();
        let t1 = src.mint();
        let t0 = Timestamp::ZERO;
        let mut b = Bucket::new(1, t1);
        assert_eq!(b.read(t0), None);
        assert_eq!(b.read_stamp(), t1);
    }

    #[test]
    fn retain_after_keeps_last_entry_when_all_stale() {
        let src = crate::timestamp::TimestampSource::new();
        let t1 = src.mint();
        let t2 = src.mint();
        let mut b = Bucket::new(1, t1);
        b.insert(2, t2, false);
        b.retain_after(t2);
        assert_eq!(b.len(), 1);
        assert_eq!(b.single_value(), Some(&2));
    }
}

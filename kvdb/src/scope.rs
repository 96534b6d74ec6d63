use crate::error::CResult;
use crate::store::Store;
use crate::timestamp::Timestamp;
use crate::value::Value;

/// One level of transaction nesting: its own `Store`, plus an optional child
/// representing a nested `BEGIN`. Reads fall through from the deepest child
/// to its ancestors; writes always land on the deepest child; commit merges
/// depth-first, child into parent, all the way out.
struct ScopeNode {
    store: Store,
    child: Option<Box<ScopeNode>>,
}

impl ScopeNode {
    fn new() -> Self {
        ScopeNode {
            store: Store::new_scope(),
            child: None,
        }
    }

    fn begin(&mut self) {
        match &mut self.child {
            Some(child) => child.begin(),
            None => self.child = Some(Box::new(ScopeNode::new())),
        }
    }

    /// Removes the deepest scope. Returns `false` if `self` itself was the
    /// deepest (a leaf) — the caller must discard the whole node, not just
    /// its child.
    fn rollback(&mut self) -> bool {
        match &mut self.child {
            Some(child) => {
                if child.rollback() {
                    true
                } else {
                    self.child = None;
                    true
                }
            }
            None => false,
        }
    }

    fn deepest_store_mut(&mut self) -> &mut Store {
        match &mut self.child {
            Some(child) => child.deepest_store_mut(),
            None => &mut self.store,
        }
    }

    fn deepest_store(&self) -> &Store {
        match &self.child {
            Some(child) => child.deepest_store(),
            None => &self.store,
        }
    }

    fn resolve_value(&mut self, key: &[u8], t: Timestamp) -> Option<(Value, Timestamp)> {
        if let Some(child) = &mut self.child {
            if let Some(hit) = child.resolve_value(key, t) {
                return Some(hit);
            }
        }
        self.store.read_local(key, t)
    }

    fn resolve_index(&mut self, value: &[u8], t: Timestamp) -> Option<(i64, Timestamp)> {
        if let Some(child) = &mut self.child {
            if let Some(hit) = child.resolve_index(value, t) {
                return Some(hit);
            }
        }
        self.store.read_index_local(value, t)
    }

    /// Commits this node's descendants into its own store, then merges this
    /// node's store into `dest` (the parent node's store, or the shared
    /// root). Stops at the first conflict: nothing merges past that point.
    fn commit_into(mut self, dest: &mut Store) -> CResult<bool> {
        if let Some(child) = self.child.take() {
            if !child.commit_into(&mut self.store)? {
                return Ok(false);
            }
        }
        let (table, index) = self.store.into_parts();
        dest.merge(table, index)
    }
}

/// The outermost handle for one session's open transaction: a fixed
/// timestamp shared by every nested level (a nested `BEGIN` is a savepoint
/// within the same transaction, not a new MVCC snapshot), plus the recursive
/// scope chain itself.
pub struct TransactionScope {
    timestamp: Timestamp,
    read_only: bool,
    outer: ScopeNode,
}

impl TransactionScope {
    pub fn new(timestamp: Timestamp, read_only: bool) -> Self {
        TransactionScope {
            timestamp,
            read_only,
            outer: ScopeNode::new(),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn begin(&mut self) {
        self.outer.begin();
    }

    /// Pops the deepest nested scope. Returns `true` if the transaction is
    /// still open afterward, `false` if this was the outermost level and the
    /// whole transaction is now finished.
    pub fn rollback(&mut self) -> bool {
        self.outer.rollback()
    }

    pub fn get(&mut self, root: &mut Store, key: &[u8]) -> Value {
        self.outer
            .resolve_value(key, self.timestamp)
            .or_else(|| root.read_local(key, self.timestamp))
            .map(|(v, _)| v)
            .unwrap_or(Value::Absent)
    }

    pub fn numequalto(&mut self, root: &mut Store, value: &[u8]) -> i64 {
        self.resolve_count(root, value)
    }

    /// Resolves the count currently on file for `value`'s bytes, falling
    /// through from the deepest nested scope up through its ancestors and
    /// finally the root — the same chain `get` uses for a key's value. Used
    /// both by `numequalto` and internally by `set`, whose index-count
    /// bookkeeping must see exactly this chain rather than a raw local read
    /// of whichever nested store happens to be deepest.
    fn resolve_count(&mut self, root: &mut Store, value: &[u8]) -> i64 {
        self.outer
            .resolve_index(value, self.timestamp)
            .or_else(|| root.read_index_local(value, self.timestamp))
            .map(|(c, _)| c)
            .unwrap_or(0)
    }

    pub fn set(&mut self, root: &mut Store, key: &[u8], value: Value) -> CResult<()> {
        let old = self.get(root, key);
        let t = self.timestamp;
        let old_count = match &old {
            Value::Real(bytes) => self.resolve_count(root, bytes),
            Value::Absent => 0,
        };
        let new_count = match &value {
            Value::Real(bytes) => self.resolve_count(root, bytes),
            Value::Absent => 0,
        };
        self.outer
            .deepest_store_mut()
            .apply_write(key, old, value, t, old_count, new_count)
    }

    /// Commits the whole nested chain into `root`. Consumes `self` — on
    /// either outcome the transaction is finished and must be dropped by the
    /// caller.
    pub fn commit(self, root: &mut Store) -> CResult<bool> {
        self.outer.commit_into(root)
    }

    /// Renders the deepest live scope's own table/index, a local debugging
    /// aid only — it does not merge in what the scope inherits from its
    /// parents or the root.
    pub fn debug_dump(&self) -> String {
        self.outer.deepest_store().debug_dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::TimestampSource;
    use std::time::Duration;

    #[test]
    fn nested_begin_set_rollback_restores_parent_view() {
        let ts = TimestampSource::new();
        let mut root = Store::new_root(Duration::from_secs(20));
        let mut scope = TransactionScope::new(ts.mint(), false);
        scope.set(&mut root, b"a", Value::Real(b"1".to_vec())).unwrap();
        scope.begin();
        scope.set(&mut root, b"a", Value::Real(b"2".to_vec())).unwrap();
        assert_eq!(scope.get(&mut root, b"a"), Value::Real(b"2".to_vec()));
        assert!(scope.rollback());
        assert_eq!(scope.get(&mut root, b"a"), Value::Real(b"1".to_vec()));
    }

    #[test]
    fn rollback_of_outermost_signals_transaction_end() {
        let ts = TimestampSource::new();
        let mut scope = TransactionScope::new(ts.mint(), false);
        assert!(!scope.rollback());
    }

    #[test]
    fn commit_merges_nested_writes_into_root() {
        let ts = TimestampSource::new();
        let mut root = Store::new_root(Duration::from_secs(20));
        let mut scope = TransactionScope::new(ts.mint(), false);
        scope.set(&mut root, b"a", Value::Real(b"1".to_vec())).unwrap();
        scope.begin();
        scope.set(&mut root, b"b", Value::Real(b"2".to_vec())).unwrap();
        assert!(scope.commit(&mut root).unwrap());
        assert_eq!(root.read_local(b"a", ts.peek()).map(|(v, _)| v), Some(Value::Real(b"1".to_vec())));
        assert_eq!(root.read_local(b"b", ts.peek()).map(|(v, _)| v), Some(Value::Real(b"2".to_vec())));
    }
}

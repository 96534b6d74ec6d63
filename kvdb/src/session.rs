use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{CResult, Error};
use crate::scope::TransactionScope;
use crate::store::{Status, Store};
use crate::timestamp::{Timestamp, TimestampSource};
use crate::value::Value;

/// Opaque per-connection handle. The dispatcher owns the mapping from a
/// socket to a `SessionId`; the engine never looks inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

#[derive(Default)]
struct SessionState {
    scope: Option<TransactionScope>,
}

/// The whole engine: the shared root `Store`, the session table, and the
/// timestamp source they both draw from. A front end (the dispatcher) holds
/// exactly one `Database` behind a single coarse lock (teacher idiom:
/// `Arc<Mutex<E>>`, here `Arc<tokio::sync::Mutex<Database>>`) and funnels
/// every client command through it — `Database` itself assumes it is never
/// called concurrently.
pub struct Database {
    root: Store,
    sessions: HashMap<SessionId, SessionState>,
    ts: TimestampSource,
    next_session: u64,
    purge_period: Duration,
}

impl Database {
    pub fn new(purge_period: Duration) -> Self {
        Database {
            root: Store::new_root(purge_period),
            sessions: HashMap::new(),
            ts: TimestampSource::new(),
            next_session: 0,
            purge_period,
        }
    }

    pub fn new_session(&mut self) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.sessions.insert(id, SessionState::default());
        id
    }

    /// Drops the session's handle and, if it had an open transaction,
    /// discards it with no effect on the root store — a disconnect is not a
    /// commit.
    pub fn drop_session(&mut self, id: SessionId) {
        self.sessions.remove(&id);
    }

    fn state_mut(&mut self, id: SessionId) -> CResult<&mut SessionState> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Internal("unknown session".into()))
    }

    pub fn begin(&mut self, id: SessionId, read_only: bool) -> CResult<()> {
        let t = self.ts.mint();
        let state = self.state_mut(id)?;
        match &mut state.scope {
            Some(scope) => scope.begin(),
            None => state.scope = Some(TransactionScope::new(t, read_only)),
        }
        Ok(())
    }

    pub fn get(&mut self, id: SessionId, key: &[u8]) -> CResult<Value> {
        let state = self.state_mut(id)?;
        Ok(match &mut state.scope {
            Some(scope) => scope.get(&mut self.root, key),
            None => {
                let t = self.ts.peek();
                self.root.read_local(key, t).map(|(v, _)| v).unwrap_or(Value::Absent)
            }
        })
    }

    pub fn numequalto(&mut self, id: SessionId, value: &[u8]) -> CResult<i64> {
        let state = self.state_mut(id)?;
        Ok(match &mut state.scope {
            Some(scope) => scope.numequalto(&mut self.root, value),
            None => {
                let t = self.ts.peek();
                self.root
                    .read_index_local(value, t)
                    .map(|(c, _)| c)
                    .unwrap_or(0)
            }
        })
    }

    /// Shared by `SET` and `UNSET` (the caller picks `Value::Real` or
    /// `Value::Absent`). Enforces the single-writer barrier: a direct,
    /// non-transactional write is refused while any *other* session holds an
    /// open transaction, so that session's eventual commit can never be
    /// invalidated by a write it didn't see coming.
    pub fn write(&mut self, id: SessionId, key: &[u8], value: Value) -> CResult<()> {
        if self.state_mut(id)?.scope.is_some() {
            let state = self.sessions.get_mut(&id).unwrap();
            let scope = state.scope.as_mut().unwrap();
            return scope.set(&mut self.root, key, value);
        }
        if self
            .sessions
            .iter()
            .any(|(sid, s)| *sid != id && s.scope.is_some())
        {
            return Err(Error::AbortWrite);
        }
        let t = self.ts.mint();
        let old = self.root.read_local(key, t).map(|(v, _)| v).unwrap_or(Value::Absent);
        let old_count = match &old {
            Value::Real(bytes) => self.root.read_index_local(bytes, t).map(|(c, _)| c).unwrap_or(0),
            Value::Absent => 0,
        };
        let new_count = match &value {
            Value::Real(bytes) => self.root.read_index_local(bytes, t).map(|(c, _)| c).unwrap_or(0),
            Value::Absent => 0,
        };
        self.root.apply_write(key, old, value, t, old_count, new_count)
    }

    pub fn commit(&mut self, id: SessionId) -> CResult<()> {
        let state = self.state_mut(id)?;
        let my_ts = match &state.scope {
            Some(scope) => scope.timestamp(),
            None => return Err(Error::NoTransaction),
        };
        let min_ts = self
            .sessions
            .values()
            .filter_map(|s| s.scope.as_ref().map(|sc| sc.timestamp()))
            .min()
            .unwrap_or(my_ts);

        // Always terminate the transaction, win or lose.
        let scope = self.sessions.get_mut(&id).unwrap().scope.take().unwrap();

        if my_ts > min_ts {
            return Err(Error::AbortCommit);
        }
        match scope.commit(&mut self.root)? {
            true => Ok(()),
            false => Err(Error::CommitConflict),
        }
    }

    pub fn rollback(&mut self, id: SessionId) -> CResult<()> {
        let state = self.state_mut(id)?;
        match &mut state.scope {
            None => Err(Error::InvalidRollback),
            Some(scope) => {
                if !scope.rollback() {
                    state.scope = None;
                }
                Ok(())
            }
        }
    }

    /// Wipes the entire store and every session's in-flight transaction.
    /// `RESET` still replies `success` to the caller that issued it even
    /// though every other session's transaction is discarded out from under
    /// it — there is no reply channel back to those sessions.
    pub fn reset(&mut self) {
        self.root = Store::new_root(self.purge_period);
        for state in self.sessions.values_mut() {
            state.scope = None;
        }
    }

    pub fn debug(&mut self, id: SessionId) -> CResult<String> {
        let state = self.state_mut(id)?;
        Ok(match &mut state.scope {
            Some(scope) => scope.debug_dump(),
            None => self.root.debug_dump(),
        })
    }

    pub fn status(&self) -> Status {
        self.root.status()
    }

    /// Runs the background compaction sweep, rate-limited internally by the
    /// root store's `purge_period`. The horizon is the earliest timestamp
    /// any live transaction could still read at — nothing written at or
    /// before it can be observed by anyone, so history up to there is safe
    /// to collapse.
    pub fn purge_tick(&mut self) {
        let now_ts = self.ts.peek();
        let horizon = self
            .sessions
            .values()
            .filter_map(|s| s.scope.as_ref().map(|sc| sc.timestamp()))
            .min()
            .unwrap_or(now_ts)
            .min(now_ts);
        self.root.purge(horizon, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_write_refused_while_another_session_has_a_transaction() {
        let mut db = Database::new(Duration::from_secs(20));
        let a = db.new_session();
        let b = db.new_session();
        db.begin(a, false).unwrap();
        let err = db.write(b, b"k", Value::Real(b"v".to_vec())).unwrap_err();
        assert!(matches!(err, Error::AbortWrite));
    }

    #[test]
    fn commit_refused_when_not_the_earliest_transaction() {
        let mut db = Database::new(Duration::from_secs(20));
        let a = db.new_session();
        let b = db.new_session();
        db.begin(a, false).unwrap();
        db.begin(b, false).unwrap();
        let err = db.commit(b).unwrap_err();
        assert!(matches!(err, Error::AbortCommit));
        // The scope is gone either way.
        assert!(matches!(db.commit(b).unwrap_err(), Error::NoTransaction));
    }

    #[test]
    fn rollback_with_no_transaction_is_invalid() {
        let mut db = Database::new(Duration::from_secs(20));
        let a = db.new_session();
        assert!(matches!(db.rollback(a).unwrap_err(), Error::InvalidRollback));
    }

    #[test]
    fn numequalto_reflects_sets_and_unsets() {
        let mut db = Database::new(Duration::from_secs(20));
        let a = db.new_session();
        db.write(a, b"x", Value::Real(b"10".to_vec())).unwrap();
        db.write(a, b"y", Value::Real(b"10".to_vec())).unwrap();
        assert_eq!(db.numequalto(a, b"10").unwrap(), 2);
        db.write(a, b"x", Value::Absent).unwrap();
        assert_eq!(db.numequalto(a, b"10").unwrap(), 1);
    }

    #[test]
    fn reset_clears_store_and_every_sessions_transaction() {
        let mut db = Database::new(Duration::from_secs(20));
        let a = db.new_session();
        db.write(a, b"x", Value::Real(b"1".to_vec())).unwrap();
        db.begin(a, false).unwrap();
        db.reset();
        assert_eq!(db.get(a, b"x").unwrap(), Value::Absent);
        assert!(matches!(db.commit(a).unwrap_err(), Error::NoTransaction));
    }
}

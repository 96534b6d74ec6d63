//! `kvdb` — an in-memory key/value store with nested transactions, a
//! value-frequency secondary index (`NUMEQUALTO`), and timestamp-based MVCC.
//!
//! The engine is single-threaded by design: every mutating operation expects
//! to be called from behind one coarse lock (a front end wraps a `Database`
//! in `Arc<tokio::sync::Mutex<Database>>` and serializes all access through
//! it). There is no concurrency inside this crate to reason about — only the
//! bookkeeping that makes nested transactions and nested-scope fall-through
//! reads behave correctly under that single lock.
//!
//! Module map:
//! - [`value`] — the stored value domain (`Real` vs the `Absent` tombstone).
//! - [`timestamp`] — the monotonic logical clock.
//! - [`bucket`] — per-key/per-value version history.
//! - [`store`] — one versioned table + index, with merge-time conflict
//!   detection and purge.
//! - [`scope`] — nested `TransactionScope`s built from a chain of `Store`s.
//! - [`session`] — the top-level `Database`: the shared root store, the
//!   session table, and the write barrier/commit-ordering rules that tie
//!   them together.
//! - [`error`] — the crate's error taxonomy.

pub mod bucket;
pub mod error;
pub mod scope;
pub mod session;
pub mod store;
pub mod timestamp;
pub mod value;

pub use error::{CResult, Error};
pub use session::{Database, SessionId};
pub use timestamp::Timestamp;
pub use value::Value;

//! End-to-end scenarios exercising the engine the way the command dispatcher
//! would drive it, minus the wire framing itself.

use std::time::Duration;

use kvdb::error::Error;
use kvdb::session::Database;
use kvdb::value::Value;

fn db() -> Database {
    Database::new(Duration::from_secs(3600))
}

fn real(s: &str) -> Value {
    Value::Real(s.as_bytes().to_vec())
}

#[test]
fn index_maintenance() {
    let mut db = db();
    let s = db.new_session();
    db.write(s, b"a", real("10")).unwrap();
    db.write(s, b"b", real("10")).unwrap();
    assert_eq!(db.numequalto(s, b"10").unwrap(), 2);

    db.write(s, b"a", real("20")).unwrap();
    assert_eq!(db.numequalto(s, b"10").unwrap(), 1);
    assert_eq!(db.numequalto(s, b"20").unwrap(), 1);

    db.write(s, b"b", Value::Absent).unwrap();
    assert_eq!(db.numequalto(s, b"10").unwrap(), 0);
}

#[test]
fn transaction_visibility() {
    let mut db = db();
    let x = db.new_session();
    let y = db.new_session();

    db.begin(x, false).unwrap();
    db.write(x, b"a", real("1")).unwrap();

    assert_eq!(db.get(y, b"a").unwrap(), Value::Absent);

    db.commit(x).unwrap();
    assert_eq!(db.get(y, b"a").unwrap(), real("1"));
}

#[test]
fn nested_rollback() {
    let mut db = db();
    let s = db.new_session();

    db.write(s, b"a", real("1")).unwrap();
    db.begin(s, false).unwrap();
    db.write(s, b"a", real("2")).unwrap();
    db.begin(s, false).unwrap();
    db.write(s, b"a", real("3")).unwrap();
    assert_eq!(db.get(s, b"a").unwrap(), real("3"));

    db.rollback(s).unwrap();
    assert_eq!(db.get(s, b"a").unwrap(), real("2"));

    db.rollback(s).unwrap();
    assert_eq!(db.get(s, b"a").unwrap(), real("1"));
}

#[test]
fn write_barrier_blocks_direct_writes_but_not_reads() {
    let mut db = db();
    let x = db.new_session();
    let y = db.new_session();

    db.begin(x, false).unwrap();
    let err = db.write(y, b"a", real("9")).unwrap_err();
    assert!(matches!(err, Error::AbortWrite));
    assert_eq!(db.get(y, b"a").unwrap(), Value::Absent);
}

#[test]
fn earliest_transaction_wins_the_commit_race() {
    let mut db = db();
    let x = db.new_session();
    db.begin(x, false).unwrap();
    db.write(x, b"a", real("1")).unwrap();

    let y = db.new_session();
    db.begin(y, false).unwrap();
    db.write(y, b"a", real("2")).unwrap();

    let err = db.commit(y).unwrap_err();
    assert!(matches!(err, Error::AbortCommit));

    db.commit(x).unwrap();
    assert_eq!(db.get(x, b"a").unwrap(), real("1"));
}

#[test]
fn commit_conflict_on_stale_read_stamp() {
    let mut db = db();

    let setup = db.new_session();
    db.write(setup, b"a", real("1")).unwrap();

    let y = db.new_session();
    db.begin(y, false).unwrap();
    db.write(y, b"a", real("2")).unwrap();

    // A direct read from an unrelated session, happening after Y's scope was
    // created, bumps root's read_stamp for "a" past Y's timestamp.
    let z = db.new_session();
    assert_eq!(db.get(z, b"a").unwrap(), real("1"));

    let err = db.commit(y).unwrap_err();
    assert!(matches!(err, Error::CommitConflict));
    assert_eq!(db.get(z, b"a").unwrap(), real("1"));
}

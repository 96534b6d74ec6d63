//! Component E — the command dispatcher (spec.md §4.E / §6).
//!
//! Tokenises `|`-delimited wire commands and routes each onto the
//! corresponding [`kvdb::Database`] operation, formatting the reply exactly
//! as spec.md §6's table requires. This module owns no engine state beyond
//! the parse itself; `kvdb::Database` is the single source of truth.

use kvdb::{Database, Error, SessionId, Value};

/// One parsed verb, ready to execute against a `Database`.
#[derive(Debug, PartialEq, Eq)]
pub enum Verb {
    Set(Vec<u8>, Vec<u8>),
    Get(Vec<u8>),
    Unset(Vec<u8>),
    NumEqualTo(Vec<u8>),
    Begin(bool),
    Commit,
    Rollback,
    Reset,
    Debug,
}

/// The result of running one command: either a reply to send back, or a
/// fatal invariant violation (spec.md §7) that must terminate the process
/// without sending anything further.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Fatal(String),
}

/// Parses one whitespace-tokenised segment into a [`Verb`]. Unrecognised
/// verbs or wrong arity are reported as `Err` carrying the raw segment —
/// spec.md §7 requires that a malformed command never mutate state, which
/// falls out naturally here since no `Verb` is produced for it.
pub fn parse(segment: &str) -> Result<Verb, String> {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    match tokens.as_slice() {
        ["SET", k, v] => Ok(Verb::Set(k.as_bytes().to_vec(), v.as_bytes().to_vec())),
        ["GET", k] => Ok(Verb::Get(k.as_bytes().to_vec())),
        ["UNSET", k] => Ok(Verb::Unset(k.as_bytes().to_vec())),
        ["NUMEQUALTO", v] => Ok(Verb::NumEqualTo(v.as_bytes().to_vec())),
        ["BEGIN"] => Ok(Verb::Begin(false)),
        ["BEGIN", mode] if mode.eq_ignore_ascii_case("rw") => Ok(Verb::Begin(false)),
        ["BEGIN", mode] if mode.eq_ignore_ascii_case("ro") => Ok(Verb::Begin(true)),
        ["COMMIT"] => Ok(Verb::Commit),
        ["ROLLBACK"] => Ok(Verb::Rollback),
        ["RESET"] => Ok(Verb::Reset),
        ["DEBUG"] => Ok(Verb::Debug),
        _ => Err(segment.to_string()),
    }
}

/// Splits a raw wire message into its `|`-delimited command segments,
/// discarding empty ones (a trailing `|` or repeated delimiters are not
/// errors — `original_source/TTDB.py` tolerates them the same way).
pub fn segments(message: &str) -> impl Iterator<Item = &str> {
    message.split('|').map(str::trim).filter(|s| !s.is_empty())
}

/// Executes one already-parsed verb against `db` on behalf of `session`,
/// producing the exact reply string spec.md §6 specifies.
pub fn execute(db: &mut Database, session: SessionId, verb: Verb) -> Outcome {
    match verb {
        Verb::Set(k, v) => match db.write(session, &k, Value::Real(v)) {
            Ok(()) => Outcome::Reply("success".to_string()),
            Err(Error::AbortWrite) => {
                Outcome::Reply("Conflicting lock. Aborting write.".to_string())
            }
            Err(Error::Invariant(msg)) => Outcome::Fatal(msg),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Unset(k) => match db.write(session, &k, Value::Absent) {
            Ok(()) => Outcome::Reply("success".to_string()),
            // UNSET's failure reply drops the "Conflicting lock." prefix SET
            // uses for the same `Error::AbortWrite` — spec.md §6's table.
            Err(Error::AbortWrite) => Outcome::Reply("Aborting write.".to_string()),
            Err(Error::Invariant(msg)) => Outcome::Fatal(msg),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Get(k) => match db.get(session, &k) {
            Ok(Value::Real(bytes)) => Outcome::Reply(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(Value::Absent) => Outcome::Reply("NULL".to_string()),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::NumEqualTo(v) => match db.numequalto(session, &v) {
            Ok(count) => Outcome::Reply(count.to_string()),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Begin(read_only) => match db.begin(session, read_only) {
            Ok(()) => Outcome::Reply("success".to_string()),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Commit => match db.commit(session) {
            Ok(()) => Outcome::Reply("success".to_string()),
            Err(Error::Invariant(msg)) => Outcome::Fatal(msg),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Rollback => match db.rollback(session) {
            Ok(()) => Outcome::Reply("success".to_string()),
            Err(e) => Outcome::Reply(e.to_string()),
        },
        Verb::Reset => {
            db.reset();
            Outcome::Reply("success".to_string())
        }
        Verb::Debug => match db.debug(session) {
            Ok(dump) => Outcome::Reply(dump),
            Err(e) => Outcome::Reply(e.to_string()),
        },
    }
}

/// Parses and executes every `|`-delimited command in `message` in order,
/// returning one [`Outcome`] per command. Stops (without executing the
/// rest) at the first [`Outcome::Fatal`] — the caller terminates the
/// process rather than routing anything further through `db`.
pub fn dispatch(db: &mut Database, session: SessionId, message: &str) -> Vec<Outcome> {
    let mut out = Vec::new();
    for segment in segments(message) {
        let outcome = match parse(segment) {
            Ok(verb) => execute(db, session, verb),
            Err(raw) => Outcome::Reply(Error::MalformedCommand(raw).to_string()),
        };
        let fatal = matches!(outcome, Outcome::Fatal(_));
        out.push(outcome);
        if fatal {
            break;
        }
    }
    out
}

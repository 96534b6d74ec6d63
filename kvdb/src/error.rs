use std::fmt;

/// The crate-wide result alias, matching the teacher's `CResult` convention.
pub type CResult<T> = std::result::Result<T, Error>;

/// All failure modes the engine and its front ends can surface.
///
/// The first seven variants mirror the reply taxonomy of the command
/// dispatcher one-for-one; `Internal`/`Io` are ambient carriers for
/// plumbing that has no dispatcher-visible reply string of its own.
#[derive(Debug)]
pub enum Error {
    /// A direct (non-transactional) write while another session holds an
    /// open transaction.
    AbortWrite,
    /// COMMIT attempted by a session that is not the earliest live
    /// transaction.
    AbortCommit,
    /// COMMIT's merge into the parent/root detected a stale read.
    CommitConflict,
    /// ROLLBACK with no open transaction on the session.
    InvalidRollback,
    /// COMMIT with no open transaction on the session.
    NoTransaction,
    /// The wire command could not be parsed into a known verb/arity.
    MalformedCommand(String),
    /// A broken bookkeeping invariant (e.g. a negative index count). Fatal.
    Invariant(String),
    /// Catch-all for plumbing failures with no dedicated variant.
    Internal(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AbortWrite => write!(f, "Conflicting lock. Aborting write."),
            Error::AbortCommit => write!(f, "Conflicting lock. Aborting transaction."),
            Error::CommitConflict => write!(f, "Commit failed. Rolling back."),
            Error::InvalidRollback => write!(f, "INVALID ROLLBACK"),
            Error::NoTransaction => write!(f, "No transaction to commit."),
            Error::MalformedCommand(cmd) => write!(f, "malformed command: {cmd}"),
            Error::Invariant(msg) => write!(f, "invariant violated: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

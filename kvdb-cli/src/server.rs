//! The Unix-socket server loop: accepts sessions, serialises every command
//! through one [`kvdb::Database`] behind a coarse `tokio::sync::Mutex`
//! (spec.md §5), and runs the background purge tick whenever the accept
//! loop would otherwise idle — the direct analogue of
//! `original_source/TTDB.py::run`'s `select.select(..., self.purge_period)`
//! timeout doubling as the purge trigger.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use kvdb::Database;

use crate::dispatcher::{self, Outcome};

/// Shared handle every connection task clones: one engine behind one lock.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Removes a stale socket file left behind by a prior run, as spec.md §6
/// requires ("the server removes a stale endpoint on startup"). Any error
/// other than "didn't exist" is surfaced — a leftover directory or a
/// permissions problem at that path should not be silently papered over.
fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing stale socket at {}", path.display())),
    }
}

/// Binds the listener and runs the accept loop until the process is killed.
pub async fn serve(socket_path: &Path, purge_period: Duration) -> Result<()> {
    remove_stale_socket(socket_path)?;
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("binding unix socket at {}", socket_path.display()))?;
    info!("kvdb-server listening on {}", socket_path.display());

    let db: SharedDatabase = Arc::new(Mutex::new(Database::new(purge_period)));
    let mut ticker = tokio::time::interval(purge_period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let db = db.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, db).await {
                                warn!("connection ended with error: {e}");
                            }
                        });
                    }
                    Err(e) => error!("error accepting connection: {e}"),
                }
            }
            _ = ticker.tick() => {
                db.lock().await.purge_tick();
            }
        }
    }
}

/// Services one client for its whole lifetime: a fresh session is opened,
/// every newline-terminated message is tokenised and dispatched, and the
/// session (and any open transaction) is dropped with no side effect on the
/// root store when the client disconnects (spec.md §5, "Cancellation").
async fn handle_connection(stream: UnixStream, db: SharedDatabase) -> Result<()> {
    let session = db.lock().await.new_session();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let result = async {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let outcomes = {
                let mut guard = db.lock().await;
                dispatcher::dispatch(&mut guard, session, &line)
            };
            for outcome in &outcomes {
                match outcome {
                    Outcome::Reply(reply) => {
                        writer.write_all(reply.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    Outcome::Fatal(msg) => {
                        error!("fatal invariant violation, terminating: {msg}");
                        writer.flush().await.ok();
                        std::process::exit(1);
                    }
                }
            }
            writer.flush().await?;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    db.lock().await.drop_session(session);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_stale_socket_tolerates_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert!(remove_stale_socket(&path).is_ok());
    }

    #[test]
    fn remove_stale_socket_clears_a_leftover_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttdb_socket");
        std::fs::write(&path, b"stale").unwrap();
        assert!(remove_stale_socket(&path).is_ok());
        assert!(!path.exists());
    }
}

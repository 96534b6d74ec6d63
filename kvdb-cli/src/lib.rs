//! Front end for the [`kvdb`] engine: wire dispatch, the Unix-socket server
//! loop, configuration loading, logging setup and the interactive client.
//!
//! This crate owns no engine state of its own — it only routes parsed
//! commands into `kvdb::Database` and formats the replies spec.md §6
//! requires. Everything interesting (versioned storage, nested
//! transactions, the write barrier, purge) lives in the `kvdb` crate.

pub mod config;
pub mod dispatcher;
pub mod rusty;
pub mod server;
pub mod trace;

//! redarc ingests zstd-compressed Reddit archive dumps (submissions and
//! comments, one NDJSON record per line) into SQLite. Several independent
//! worker processes can run against the same directory, coordinating
//! through a shared append-only progress ledger instead of a lock server.

pub mod config;
pub mod coordinate;
pub mod db;
pub mod decode;
pub mod error;
pub mod ingest;

pub use config::Config;
pub use error::{RedarcError, Result};

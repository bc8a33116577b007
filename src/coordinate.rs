//! Multi-process work claiming over a shared append-only ledger.
//!
//! Independent worker processes run [`run`] against the same directory and
//! ledger file with no lock server. A worker claims a file by appending its
//! name to the ledger before any decode work begins; any line mentioning a
//! filename marks it taken. Between reading the ledger and appending the
//! claim another worker can pick the same file, so double-claims are
//! possible but rare, and the store's skip-if-exists inserts make them
//! wasted work rather than corruption. That relaxation is deliberate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::db::Store;
use crate::decode::LineReader;
use crate::error::Result;
use crate::ingest::{ingest_lines, ProgressSink, RecordKind};

/// The shared progress ledger for one directory of archives.
///
/// Plain text, one entry per line, two shapes: `<filename>` (claimed) and
/// `<filename>: <count>` (completed, count = bad lines). Append is the
/// only mutation; the file is never rewritten or compacted.
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create the ledger file if it doesn't exist yet.
    pub async fn ensure_exists(&self) -> Result<()> {
        tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    /// Filenames already claimed or completed. A filename is taken once it
    /// appears in the ledger at all, in either line shape.
    pub async fn taken(&self) -> Result<HashSet<String>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| taken_name(line).to_string())
            .collect())
    }

    /// Append a claim line. Must happen before any decode work on the file.
    pub async fn claim(&self, filename: &str) -> Result<()> {
        self.append(format!("{}\n", filename)).await
    }

    /// Append a completed line with the file's bad-line count.
    pub async fn complete(&self, filename: &str, bad_lines: u64) -> Result<()> {
        self.append(format!("{}: {}\n", filename, bad_lines)).await
    }

    async fn append(&self, line: String) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// The filename a ledger line refers to, for either line shape.
fn taken_name(line: &str) -> &str {
    match line.rsplit_once(": ") {
        Some((name, count))
            if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => line,
    }
}

/// Lexicographically smallest file in `dir` not yet present in the ledger.
///
/// The deterministic ordering makes concurrent workers unlikely to race on
/// the same file when they read the ledger at slightly different times.
/// Returns `None` when every file is taken; does not touch the ledger.
pub async fn next_unclaimed(dir: &Path, ledger: &Ledger) -> Result<Option<String>> {
    let taken = ledger.taken().await?;

    let mut remaining = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if !taken.contains(&name) {
                remaining.push(name);
            }
        }
    }

    remaining.sort();
    Ok(remaining.into_iter().next())
}

/// Claim-and-ingest loop for one directory and one ledger.
///
/// Claims the next unclaimed file, ingests it, records completion, and
/// repeats until no unclaimed files remain. A fatal decode or storage
/// error propagates out with the file left claimed but never completed;
/// re-running will not retry it.
pub async fn run<S: ProgressSink>(
    dir: &Path,
    ledger: &Ledger,
    kind: RecordKind,
    store: &mut Store,
    config: &Config,
    sink: &mut S,
) -> Result<()> {
    loop {
        let Some(filename) = next_unclaimed(dir, ledger).await? else {
            // Another process may still be completing in-flight files.
            log::info!("no unclaimed {} files remain", kind);
            return Ok(());
        };

        ledger.claim(&filename).await?;

        let path = dir.join(&filename);
        log::info!("starting to parse file: {}", path.display());
        let file_size = tokio::fs::metadata(&path).await?.len();
        let mut lines = LineReader::open(&path, &config.decoder).await?;
        let stats = ingest_lines(
            &mut lines,
            kind,
            store,
            sink,
            file_size,
            config.ingest.progress_interval,
        )
        .await?;

        ledger.complete(&filename, stats.bad_lines).await?;
        log::info!(
            "finished parsing file: {} ({} read, {} bad, {} inserted)",
            filename,
            stats.lines_read,
            stats.bad_lines,
            stats.inserted
        );
    }
}

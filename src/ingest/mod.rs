pub mod records;

pub use records::{Comment, ParsedRecord, RecordError, RecordKind, Submission};

use chrono::{DateTime, TimeZone, Utc};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;

use crate::db::Store;
use crate::decode::LineReader;
use crate::error::Result;

/// Counters accumulated while ingesting one archive file.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub lines_read: u64,
    pub bad_lines: u64,
    pub inserted: u64,
}

/// Snapshot handed to the progress sink at each reporting boundary.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    /// Creation time of the last record it could be extracted from.
    pub last_created: Option<DateTime<Utc>>,
    pub lines_read: u64,
    pub bad_lines: u64,
    pub bytes_processed: u64,
    pub file_size: u64,
    pub elapsed: Duration,
}

impl ProgressReport {
    pub fn percent(&self) -> f64 {
        if self.file_size == 0 {
            return 0.0;
        }
        (self.bytes_processed as f64 / self.file_size as f64) * 100.0
    }
}

/// Telemetry sink for one ingestion run.
///
/// Injected into the ingestor rather than reached through global state, so
/// its lifecycle is scoped to the run and tests can record reports.
pub trait ProgressSink {
    /// Called every `progress_interval` lines.
    fn progress(&mut self, report: &ProgressReport);
    /// Called once, after the final commit.
    fn complete(&mut self, report: &ProgressReport);
}

/// Production sink that writes human-readable progress lines to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn progress(&mut self, report: &ProgressReport) {
        let created = report
            .last_created
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        log::info!(
            "{} : {} read : {} bad : {} : {:.0}% : elapsed {} s",
            created,
            report.lines_read,
            report.bad_lines,
            report.bytes_processed,
            report.percent(),
            report.elapsed.as_secs()
        );
    }

    fn complete(&mut self, report: &ProgressReport) {
        log::info!(
            "Complete : {} read : {} bad : elapsed {} s",
            report.lines_read,
            report.bad_lines,
            report.elapsed.as_secs()
        );
    }
}

/// Ingest every line of one archive into the store.
///
/// Malformed lines (invalid JSON, missing identity, embedded NUL) are
/// counted and skipped, never fatal. Storage errors propagate and abort
/// the file. Commits happen every `progress_interval` lines and once
/// unconditionally at stream end, so a crash loses at most one interval
/// of records.
pub async fn ingest_lines<R, S>(
    lines: &mut LineReader<R>,
    kind: RecordKind,
    store: &mut Store,
    sink: &mut S,
    file_size: u64,
    progress_interval: u64,
) -> Result<IngestStats>
where
    R: AsyncRead + Unpin,
    S: ProgressSink,
{
    let start = Instant::now();
    let mut stats = IngestStats::default();
    let mut last_created: Option<DateTime<Utc>> = None;
    let mut bytes_processed: u64 = 0;

    while let Some((line, offset)) = lines.next_line().await? {
        stats.lines_read += 1;
        bytes_processed = offset;

        match ParsedRecord::parse(&line, kind) {
            Ok(record) => {
                if let Some(secs) = record.created_utc() {
                    if let Some(created) = Utc.timestamp_opt(secs, 0).single() {
                        last_created = Some(created);
                    }
                }
                let inserted = match &record {
                    ParsedRecord::Submission(s) => store.insert_submission(s)?,
                    ParsedRecord::Comment(c) => store.insert_comment(c)?,
                };
                if inserted {
                    stats.inserted += 1;
                }
            }
            Err(err) => {
                stats.bad_lines += 1;
                log::debug!("bad line {}: {}", stats.lines_read, err);
            }
        }

        if stats.lines_read % progress_interval == 0 {
            sink.progress(&ProgressReport {
                last_created,
                lines_read: stats.lines_read,
                bad_lines: stats.bad_lines,
                bytes_processed,
                file_size,
                elapsed: start.elapsed(),
            });
            store.commit()?;
        }
    }

    store.commit()?;
    sink.complete(&ProgressReport {
        last_created,
        lines_read: stats.lines_read,
        bad_lines: stats.bad_lines,
        bytes_processed: lines.position(),
        file_size,
        elapsed: start.elapsed(),
    });

    Ok(stats)
}

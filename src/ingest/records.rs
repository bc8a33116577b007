use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Which table a directory of archives feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Submission,
    Comment,
}

impl RecordKind {
    /// Subdirectory of the archive base holding files of this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            RecordKind::Submission => "submissions",
            RecordKind::Comment => "comments",
        }
    }

    /// Shared progress ledger filename for this kind.
    pub fn ledger_name(self) -> &'static str {
        match self {
            RecordKind::Submission => "submissions-progress.txt",
            RecordKind::Comment => "comments-progress.txt",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Reasons a line cannot become a stored record. Counted, never fatal.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record contains an embedded NUL byte")]
    Nul,
}

/// One submission (post) as found in a dump line.
///
/// `id` is the immutable natural identity; everything else is optional and
/// defaults to null when absent from the input.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created_utc: Option<i64>,
    pub author: Option<String>,
    pub archived: Option<bool>,
    pub subreddit: Option<String>,
    pub name: Option<String>,
    pub selftext: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// One comment as found in a dump line.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub created_utc: Option<i64>,
    pub author: Option<String>,
    pub archived: Option<bool>,
    pub subreddit: Option<String>,
    pub body: Option<String>,
    pub parent_id: Option<String>,
}

/// A parsed line, routed by kind.
#[derive(Debug, Clone)]
pub enum ParsedRecord {
    Submission(Submission),
    Comment(Comment),
}

impl ParsedRecord {
    /// Parse one raw line as a record of the given kind.
    ///
    /// Fails on invalid JSON, on a missing `id`, or on un-storable content
    /// (embedded NUL bytes). Unknown fields are ignored.
    pub fn parse(line: &str, kind: RecordKind) -> Result<Self, RecordError> {
        let record = match kind {
            RecordKind::Submission => ParsedRecord::Submission(serde_json::from_str(line)?),
            RecordKind::Comment => ParsedRecord::Comment(serde_json::from_str(line)?),
        };
        if record.contains_nul() {
            return Err(RecordError::Nul);
        }
        Ok(record)
    }

    /// Creation timestamp in epoch seconds, when present. Telemetry only.
    pub fn created_utc(&self) -> Option<i64> {
        match self {
            ParsedRecord::Submission(s) => s.created_utc,
            ParsedRecord::Comment(c) => c.created_utc,
        }
    }

    fn contains_nul(&self) -> bool {
        let fields: Vec<Option<&str>> = match self {
            ParsedRecord::Submission(s) => vec![
                Some(s.id.as_str()),
                s.author.as_deref(),
                s.subreddit.as_deref(),
                s.name.as_deref(),
                s.selftext.as_deref(),
                s.title.as_deref(),
                s.url.as_deref(),
            ],
            ParsedRecord::Comment(c) => vec![
                Some(c.id.as_str()),
                c.author.as_deref(),
                c.subreddit.as_deref(),
                c.body.as_deref(),
                c.parent_id.as_deref(),
            ],
        };
        fields.into_iter().flatten().any(|s| s.contains('\0'))
    }
}

/// Older dumps carry `created_utc` as a JSON number, newer ones as a
/// numeric string. Anything unparseable is treated as absent rather than
/// failing the record; the timestamp is used for progress logs only.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => {
            n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
        }
        Some(serde_json::Value::String(s)) => s.parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    })
}

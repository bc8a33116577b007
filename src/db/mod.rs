use rusqlite::{params, Connection};
use std::path::Path;

use crate::error::Result;
use crate::ingest::records::{Comment, Submission};

/// Open a database connection with pragmas suited to several worker
/// processes appending to one file.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL for concurrent readers while a worker writes, NORMAL sync for
    // speed, busy_timeout so parallel workers wait on the write lock
    // instead of erroring out immediately.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA busy_timeout = 5000; \
         PRAGMA temp_store = MEMORY; \
         PRAGMA cache_size = -65536;",
    )?;

    Ok(conn)
}

/// Create the submission and comment tables if they don't exist.
///
/// Each table pairs an auto-generated primary key with the unique natural
/// identity column `reddit_id`.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS submission (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            archived BOOLEAN,
            author TEXT,
            created_utc INTEGER,
            name TEXT UNIQUE,
            reddit_id TEXT UNIQUE,
            selftext TEXT,
            subreddit TEXT,
            title TEXT,
            url TEXT
        );
        CREATE TABLE IF NOT EXISTS comment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            archived BOOLEAN,
            author TEXT,
            body TEXT,
            created_utc INTEGER,
            parent_id TEXT,
            reddit_id TEXT UNIQUE,
            subreddit TEXT
        );",
    )?;
    Ok(())
}

/// Storage collaborator for the ingestor.
///
/// Holds one connection with an open transaction. Inserts never commit;
/// the commit boundary is driven by the caller via [`Store::commit`], which
/// is what bounds the work lost on a crash.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Wrap a connection and open the initial transaction. The schema must
    /// already exist (see [`init_schema`]).
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("BEGIN")?;
        Ok(Self { conn })
    }

    /// Commit pending work and start the next transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT; BEGIN")?;
        Ok(())
    }

    /// Insert a submission unless one with the same `reddit_id` exists.
    /// Returns whether a row was inserted. Does not commit.
    pub fn insert_submission(&mut self, submission: &Submission) -> Result<bool> {
        let exists = self
            .conn
            .prepare_cached("SELECT 1 FROM submission WHERE reddit_id = ?1")?
            .exists(params![submission.id])?;
        if exists {
            return Ok(false);
        }

        self.conn
            .prepare_cached(
                "INSERT INTO submission (
                    archived, author, created_utc, name, reddit_id,
                    selftext, subreddit, title, url
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?
            .execute(params![
                submission.archived,
                submission.author,
                submission.created_utc,
                submission.name,
                submission.id,
                submission.selftext,
                submission.subreddit,
                submission.title,
                submission.url,
            ])?;
        Ok(true)
    }

    /// Insert a comment unless one with the same `reddit_id` exists.
    /// Returns whether a row was inserted. Does not commit.
    pub fn insert_comment(&mut self, comment: &Comment) -> Result<bool> {
        let exists = self
            .conn
            .prepare_cached("SELECT 1 FROM comment WHERE reddit_id = ?1")?
            .exists(params![comment.id])?;
        if exists {
            return Ok(false);
        }

        self.conn
            .prepare_cached(
                "INSERT INTO comment (
                    archived, author, body, created_utc, parent_id,
                    reddit_id, subreddit
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?
            .execute(params![
                comment.archived,
                comment.author,
                comment.body,
                comment.created_utc,
                comment.parent_id,
                comment.id,
                comment.subreddit,
            ])?;
        Ok(true)
    }

    /// Row count for one table. Used by the stats reporting and tests.
    pub fn count(&self, table: &str) -> Result<i64> {
        // table name comes from a fixed internal set, never user input
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

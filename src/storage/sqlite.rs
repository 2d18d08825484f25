//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.
//! Content writes are queued in memory and committed in a single transaction
//! per flush.

use crate::model::{Backlog, Checkpoint, Item, Reply};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CheckpointStore, ContentStore, SessionLog, Statistics, StorageError, StorageResult,
};
use crate::storage::{
    FeedSummary, FlushReport, SessionCounts, SessionRecord, SessionStatus, DEFAULT_BATCH_SIZE,
};
use crate::ThreadlineError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

/// A queued content write
#[derive(Debug, Clone)]
enum PendingWrite {
    Item(Item),
    Reply(Reply),
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    pending: Vec<PendingWrite>,
    batch_size: usize,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ThreadlineError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ThreadlineError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ThreadlineError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            pending: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of queued writes after which a flush is requested
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of stored replies belonging to `item_id`
    pub fn count_replies_for(&self, item_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM replies WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StorageError::Corrupt {
            column,
            value: value.to_string(),
        })
}

fn parse_optional_timestamp(
    column: &'static str,
    value: Option<String>,
) -> StorageResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

fn insert_item(tx: &Transaction<'_>, item: &Item) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO items
         (id, feed, author, title, created_at, body, reply_count, score, upvote_ratio, over_18)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    stmt.execute(params![
        item.id,
        item.feed,
        item.author,
        item.title,
        format_timestamp(&item.created_at),
        item.body,
        item.reply_count,
        item.score,
        item.metadata.upvote_ratio,
        item.metadata.over_18,
    ])
}

fn item_exists(tx: &Transaction<'_>, item_id: &str) -> rusqlite::Result<bool> {
    let mut stmt = tx.prepare_cached("SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)")?;
    stmt.query_row(params![item_id], |row| row.get(0))
}

fn insert_reply(tx: &Transaction<'_>, reply: &Reply) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO replies
         (id, item_id, parent_id, author, created_at, body, depth, child_count, score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        reply.id,
        reply.item_id,
        reply.parent_id,
        reply.author,
        format_timestamp(&reply.created_at),
        reply.body,
        reply.depth,
        reply.child_count,
        reply.score,
    ])
}

impl ContentStore for SqliteStorage {
    fn upsert_item(&mut self, item: &Item) -> StorageResult<()> {
        self.pending.push(PendingWrite::Item(item.clone()));
        Ok(())
    }

    fn upsert_reply(&mut self, reply: &Reply) -> StorageResult<()> {
        self.pending.push(PendingWrite::Reply(reply.clone()));
        Ok(())
    }

    fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn has_item(&self, item_id: &str) -> StorageResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn needs_flush(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    fn flush(&mut self) -> StorageResult<FlushReport> {
        let mut report = FlushReport::default();
        if self.pending.is_empty() {
            return Ok(report);
        }

        // Dropping the transaction on error rolls it back; the queue stays intact
        let tx = self.conn.transaction()?;
        for write in &self.pending {
            match write {
                PendingWrite::Item(item) => {
                    if insert_item(&tx, item)? == 0 {
                        report.duplicates += 1;
                    } else {
                        report.items_written += 1;
                    }
                }
                PendingWrite::Reply(reply) => {
                    if !item_exists(&tx, &reply.item_id)? {
                        tracing::debug!(
                            "Dropping reply {} of unknown item {}",
                            reply.id,
                            reply.item_id
                        );
                        report.orphans_dropped += 1;
                        continue;
                    }
                    if insert_reply(&tx, reply)? == 0 {
                        report.duplicates += 1;
                    } else {
                        report.replies_written += 1;
                    }
                }
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Flushed {} writes ({} items, {} replies, {} duplicates, {} orphans)",
            self.pending.len(),
            report.items_written,
            report.replies_written,
            report.duplicates,
            report.orphans_dropped
        );
        self.pending.clear();

        Ok(report)
    }
}

/// Raw checkpoint columns: feed, newest, floor, ceiling
type CheckpointRow = (String, Option<String>, Option<String>, Option<String>);

fn checkpoint_from_row(row: &Row<'_>) -> rusqlite::Result<CheckpointRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_checkpoint((feed, newest, floor, ceiling): CheckpointRow) -> StorageResult<Checkpoint> {
    let mut checkpoint = Checkpoint::initial(&feed);
    if let Some(newest) = parse_optional_timestamp("newest_processed_at", newest)? {
        checkpoint.newest_processed_at = newest;
    }
    if let Some(ceiling) = parse_optional_timestamp("backlog_ceiling", ceiling)? {
        checkpoint.backlog = Some(Backlog {
            floor: parse_optional_timestamp("backlog_floor", floor)?,
            ceiling,
        });
    }
    Ok(checkpoint)
}

impl CheckpointStore for SqliteStorage {
    fn get_checkpoint(&self, feed: &str) -> StorageResult<Checkpoint> {
        let row = self
            .conn
            .query_row(
                "SELECT feed, newest_processed_at, backlog_floor, backlog_ceiling
                 FROM checkpoints WHERE feed = ?1",
                params![feed],
                checkpoint_from_row,
            )
            .optional()?;

        match row {
            Some(row) => build_checkpoint(row),
            None => Ok(Checkpoint::initial(feed)),
        }
    }

    fn set_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        // The initial instant is stored as NULL
        let newest = if checkpoint.newest_processed_at == DateTime::<Utc>::MIN_UTC {
            None
        } else {
            Some(format_timestamp(&checkpoint.newest_processed_at))
        };
        let floor = checkpoint
            .backlog
            .and_then(|b| b.floor)
            .map(|f| format_timestamp(&f));
        let ceiling = checkpoint.backlog.map(|b| format_timestamp(&b.ceiling));

        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints
             (feed, newest_processed_at, backlog_floor, backlog_ceiling, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.feed,
                newest,
                floor,
                ceiling,
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(())
    }

    fn list_checkpoints(&self) -> StorageResult<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT feed, newest_processed_at, backlog_floor, backlog_ceiling
             FROM checkpoints ORDER BY feed",
        )?;

        let rows = stmt
            .query_map([], checkpoint_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(build_checkpoint).collect()
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        feed: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(SessionStatus::Failed),
        counts: SessionCounts {
            items_processed: row.get::<_, i64>(6)? as u64,
            replies_persisted: row.get::<_, i64>(7)? as u64,
            items_failed: row.get::<_, i64>(8)? as u64,
        },
    })
}

const SESSION_COLUMNS: &str = "id, feed, started_at, finished_at, config_hash, status,
     items_processed, replies_persisted, items_failed";

impl SessionLog for SqliteStorage {
    fn create_session(&mut self, feed: &str, config_hash: &str) -> StorageResult<i64> {
        let now = format_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO crawl_sessions (feed, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![feed, now, config_hash, SessionStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        counts: &SessionCounts,
    ) -> StorageResult<()> {
        let now = format_timestamp(&Utc::now());
        let updated = self.conn.execute(
            "UPDATE crawl_sessions
             SET status = ?1, finished_at = ?2, items_processed = ?3,
                 replies_persisted = ?4, items_failed = ?5
             WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                counts.items_processed as i64,
                counts.replies_persisted as i64,
                counts.items_failed as i64,
                session_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_sessions WHERE id = ?1", SESSION_COLUMNS),
                params![session_id],
                session_from_row,
            )
            .optional()?
            .ok_or(StorageError::SessionNotFound(session_id))
    }

    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_sessions ORDER BY id DESC LIMIT ?1",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(params![limit as i64], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }
}

impl Statistics for SqliteStorage {
    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_replies(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM replies", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn feed_summaries(&self) -> StorageResult<Vec<FeedSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.feed, COUNT(DISTINCT i.id), COUNT(r.id)
             FROM items i LEFT JOIN replies r ON r.item_id = i.id
             GROUP BY i.feed ORDER BY i.feed",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(FeedSummary {
                    feed: row.get(0)?,
                    items: row.get::<_, i64>(1)? as u64,
                    replies: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemMetadata;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            feed: "rust".to_string(),
            author: "op".to_string(),
            title: format!("Title {}", id),
            created_at: t(1_700_000_000),
            body: "body".to_string(),
            reply_count: 1,
            score: 10,
            metadata: ItemMetadata {
                upvote_ratio: Some(0.9),
                over_18: false,
            },
        }
    }

    fn reply(id: &str, item_id: &str) -> Reply {
        Reply {
            id: id.to_string(),
            item_id: item_id.to_string(),
            parent_id: item_id.to_string(),
            author: "someone".to_string(),
            created_at: t(1_700_000_100),
            body: "reply".to_string(),
            depth: 0,
            child_count: 0,
            score: 1,
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_writes_are_buffered_until_flush() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.upsert_reply(&reply("r1", "a")).unwrap();

        assert_eq!(storage.pending_writes(), 2);
        assert_eq!(storage.count_items().unwrap(), 0);

        let report = storage.flush().unwrap();
        assert_eq!(report.items_written, 1);
        assert_eq!(report.replies_written, 1);
        assert_eq!(storage.pending_writes(), 0);
        assert_eq!(storage.count_items().unwrap(), 1);
        assert_eq!(storage.count_replies_for("a").unwrap(), 1);
    }

    #[test]
    fn test_first_write_wins() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.flush().unwrap();

        let mut changed = item("a");
        changed.title = "Changed".to_string();
        storage.upsert_item(&changed).unwrap();
        let report = storage.flush().unwrap();

        assert_eq!(report.items_written, 0);
        assert_eq!(report.duplicates, 1);
        let title: String = storage
            .conn
            .query_row("SELECT title FROM items WHERE id = 'a'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(title, "Title a");
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.flush().unwrap();

        assert_eq!(storage.flush().unwrap(), FlushReport::default());
        assert_eq!(storage.count_items().unwrap(), 1);
    }

    #[test]
    fn test_orphan_replies_are_dropped() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_reply(&reply("r1", "missing")).unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.upsert_reply(&reply("r2", "a")).unwrap();

        let report = storage.flush().unwrap();
        assert_eq!(report.orphans_dropped, 1);
        assert_eq!(report.replies_written, 1);
        assert_eq!(storage.count_replies().unwrap(), 1);
    }

    #[test]
    fn test_needs_flush_at_batch_size() {
        let mut storage = SqliteStorage::new_in_memory().unwrap().with_batch_size(2);
        storage.upsert_item(&item("a")).unwrap();
        assert!(!storage.needs_flush());
        storage.upsert_reply(&reply("r1", "a")).unwrap();
        assert!(storage.needs_flush());
        storage.flush().unwrap();
        assert!(!storage.needs_flush());
    }

    #[test]
    fn test_failed_flush_keeps_queue() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.conn.execute_batch("DROP TABLE replies; DROP TABLE items;").unwrap();

        assert!(storage.flush().is_err());
        assert_eq!(storage.pending_writes(), 1);

        initialize_schema(&storage.conn).unwrap();
        assert_eq!(storage.flush().unwrap().items_written, 1);
    }

    #[test]
    fn test_missing_checkpoint_is_initial() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let checkpoint = storage.get_checkpoint("rust").unwrap();
        assert!(checkpoint.is_initial());
        assert_eq!(checkpoint.feed, "rust");
    }

    #[test]
    fn test_checkpoint_roundtrip_with_backlog() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let checkpoint = Checkpoint {
            feed: "rust".to_string(),
            newest_processed_at: t(400),
            backlog: Some(Backlog {
                floor: None,
                ceiling: t(300),
            }),
        };
        storage.set_checkpoint(&checkpoint).unwrap();
        assert_eq!(storage.get_checkpoint("rust").unwrap(), checkpoint);

        let cleared = Checkpoint {
            backlog: None,
            ..checkpoint
        };
        storage.set_checkpoint(&cleared).unwrap();
        assert_eq!(storage.get_checkpoint("rust").unwrap(), cleared);
        assert_eq!(storage.list_checkpoints().unwrap().len(), 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.create_session("rust", "hash").unwrap();
        assert!(id > 0);
        assert_eq!(
            storage.get_session(id).unwrap().status,
            SessionStatus::Running
        );

        let counts = SessionCounts {
            items_processed: 5,
            replies_persisted: 12,
            items_failed: 1,
        };
        storage
            .finish_session(id, SessionStatus::Completed, &counts)
            .unwrap();

        let session = storage.get_session(id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.counts, counts);
        assert!(session.finished_at.is_some());
        assert_eq!(storage.recent_sessions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_finish_unknown_session() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_session(99, SessionStatus::Failed, &SessionCounts::default());
        assert!(matches!(result, Err(StorageError::SessionNotFound(99))));
    }

    #[test]
    fn test_feed_summaries() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_item(&item("a")).unwrap();
        storage.upsert_item(&item("b")).unwrap();
        storage.upsert_reply(&reply("r1", "a")).unwrap();
        storage.upsert_reply(&reply("r2", "a")).unwrap();
        storage.flush().unwrap();

        let summaries = storage.feed_summaries().unwrap();
        assert_eq!(
            summaries,
            vec![FeedSummary {
                feed: "rust".to_string(),
                items: 2,
                replies: 2
            }]
        );
    }
}

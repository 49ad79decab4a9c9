//! Durable upload queue.
//!
//! A directory holding a `SQLite` database of serialized submission entries.
//! Each committed insert is synced to stable storage before [`UploadQueue::enqueue`]
//! returns, and every item carries a BLAKE3 checksum of its payload that is
//! verified on read.
//!
//! Mutations are expected to happen under [`crate::lock::QueueLock`]; the
//! queue itself does not serialize writers from different processes.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::entry::SubmissionEntry;
use crate::error::{Error, Result};

/// File name of the queue database inside the queue directory.
pub const QUEUE_DB_NAME: &str = "queue.db";

/// Encoding version written with every item.
pub const ITEM_FORMAT_VERSION: i64 = 1;

/// How long a connection waits on `SQLite`'s own file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// An entry as stored on the queue.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueItem {
    /// FIFO position; strictly increasing.
    pub id: i64,
    /// When the item was committed.
    pub enqueued_at: DateTime<Utc>,
    /// The submission.
    pub entry: SubmissionEntry,
}

/// Persistent FIFO of submission entries.
#[derive(Debug)]
pub struct UploadQueue {
    /// Queue directory.
    dir: PathBuf,
    /// Path to the database file.
    db_path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl UploadQueue {
    /// Open or create a queue in `dir`.
    ///
    /// This creates and migrates the database, so callers sharing the queue
    /// with other processes must hold the queue lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or
    /// the schema cannot be initialized.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
                path: dir.clone(),
                source,
            })?;
        }

        let db_path = dir.join(QUEUE_DB_NAME);
        debug!("Opening queue at {}", db_path.display());
        let conn = Connection::open(&db_path).map_err(|source| Error::DatabaseOpen {
            path: db_path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Rollback journal: WAL needs shared memory, which network mounts lack.
        conn.execute_batch("PRAGMA journal_mode=DELETE; PRAGMA synchronous=FULL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Queue opened at {}", dir.display());
        Ok(Self { dir, db_path, conn })
    }

    /// Open an existing queue for inspection without the lock.
    ///
    /// Returns `None` if no queue has been created in `dir` yet. The
    /// connection is read-only, so any mutation through it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or was written by
    /// a newer schema version.
    pub fn open_read_only(dir: impl AsRef<Path>) -> Result<Option<Self>> {
        let dir = dir.as_ref().to_path_buf();
        let db_path = dir.join(QUEUE_DB_NAME);
        if !db_path.is_file() {
            debug!("No queue database at {}", db_path.display());
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|source| Error::DatabaseOpen {
                path: db_path.clone(),
                source,
            })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let version = migrations::get_schema_version(&conn)?;
        if version > migrations::CURRENT_VERSION {
            return Err(Error::DatabaseMigration {
                message: format!(
                    "queue schema version {version} is newer than supported version {}",
                    migrations::CURRENT_VERSION
                ),
            });
        }

        debug!("Opened queue {} read-only", db_path.display());
        Ok(Some(Self { dir, db_path, conn }))
    }

    /// The queue directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably append an entry, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueWrite`] if the item was not committed.
    pub fn enqueue(&self, entry: &SubmissionEntry) -> Result<i64> {
        if !entry.is_consistent() {
            return Err(Error::internal(format!(
                "entry {} has {} files but {} content types",
                entry.label(),
                entry.files.len(),
                entry.content_types.len()
            )));
        }

        let payload = entry.to_json()?;
        let checksum = checksum(&payload);
        let enqueued_at = Utc::now().to_rfc3339();

        self.conn
            .execute(
                r"
                INSERT INTO queue_items (enqueued_at, format_version, payload, checksum)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![enqueued_at, ITEM_FORMAT_VERSION, payload, checksum],
            )
            .map_err(|source| Error::QueueWrite {
                path: self.db_path.clone(),
                source,
            })?;

        let id = self.conn.last_insert_rowid();
        debug!("Enqueued {} as item {}", entry.label(), id);
        Ok(id)
    }

    /// The oldest item, without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueCorrupt`] if the item fails validation.
    pub fn peek(&self) -> Result<Option<QueueItem>> {
        let raw = self
            .conn
            .query_row(
                r"
                SELECT id, enqueued_at, format_version, payload, checksum
                FROM queue_items ORDER BY id ASC LIMIT 1
                ",
                [],
                RawItem::from_row,
            )
            .optional()?;
        raw.map(RawItem::validate).transpose()
    }

    /// Up to `limit` items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueCorrupt`] if any listed item fails validation.
    pub fn list(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, enqueued_at, format_version, payload, checksum
            FROM queue_items ORDER BY id ASC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let raw = stmt
            .query_map([limit_i64], RawItem::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawItem::validate).collect()
    }

    /// Remove and return the oldest item.
    ///
    /// A corrupt head item is left in place and reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueCorrupt`] for an invalid head item, or a
    /// database error if the removal could not be committed.
    pub fn dequeue(&self) -> Result<Option<QueueItem>> {
        let tx = self.conn.unchecked_transaction()?;
        let raw = tx
            .query_row(
                r"
                SELECT id, enqueued_at, format_version, payload, checksum
                FROM queue_items ORDER BY id ASC LIMIT 1
                ",
                [],
                RawItem::from_row,
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let item = raw.validate()?;
        tx.execute("DELETE FROM queue_items WHERE id = ?1", [item.id])?;
        tx.commit()?;

        debug!("Dequeued item {}", item.id);
        Ok(Some(item))
    }

    /// Delete an item by id, valid or not.
    ///
    /// Returns `true` if an item was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM queue_items WHERE id = ?1", [id])?;
        if affected > 0 {
            info!("Removed queue item {}", id);
        }
        Ok(affected > 0)
    }

    /// Number of items waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM queue_items", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the queue has no items.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<QueueStats> {
        let items = self.len()?;
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            r"
            SELECT
                (SELECT enqueued_at FROM queue_items ORDER BY id ASC LIMIT 1),
                (SELECT enqueued_at FROM queue_items ORDER BY id DESC LIMIT 1)
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let parse = |s: String| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        };
        let db_size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(QueueStats {
            items,
            oldest_enqueued: oldest.and_then(parse),
            newest_enqueued: newest.and_then(parse),
            db_size_bytes,
        })
    }
}

/// Statistics about the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    /// Items waiting.
    pub items: usize,
    /// Commit time of the oldest item.
    pub oldest_enqueued: Option<DateTime<Utc>>,
    /// Commit time of the newest item.
    pub newest_enqueued: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// A row as read, before validation.
struct RawItem {
    id: i64,
    enqueued_at: String,
    format_version: i64,
    payload: String,
    checksum: String,
}

impl RawItem {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            enqueued_at: row.get(1)?,
            format_version: row.get(2)?,
            payload: row.get(3)?,
            checksum: row.get(4)?,
        })
    }

    fn validate(self) -> Result<QueueItem> {
        let corrupt = |message: String| Error::QueueCorrupt {
            id: self.id,
            message,
        };

        if checksum(&self.payload) != self.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }
        if self.format_version > ITEM_FORMAT_VERSION {
            warn!(
                "Queue item {} has newer format version {}",
                self.id, self.format_version
            );
        }

        let entry = SubmissionEntry::from_json(&self.payload)
            .map_err(|e| corrupt(format!("undecodable payload: {e}")))?;
        let enqueued_at = DateTime::parse_from_rfc3339(&self.enqueued_at)
            .map_err(|e| corrupt(format!("bad timestamp {}: {e}", self.enqueued_at)))?
            .with_timezone(&Utc);

        Ok(QueueItem {
            id: self.id,
            enqueued_at,
            entry,
        })
    }
}

fn checksum(payload: &str) -> String {
    blake3::hash(payload.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;
    use crate::lock::QueueLock;
    use tempfile::TempDir;

    fn create_test_entry(stand: &str, files: usize) -> SubmissionEntry {
        SubmissionEntry {
            filetype: "flight_images".to_string(),
            client_id: "ACME".to_string(),
            project_id: "123456".to_string(),
            stand_id: stand.to_string(),
            stand_persistent_id: format!("pid-{stand}"),
            names: vec!["flight_images".to_string()],
            files: (0..files).map(|i| format!("/d/{stand}/{i}")).collect(),
            content_types: vec!["FLIGHT_IMAGE".to_string(); files],
        }
    }

    fn create_test_queue() -> (TempDir, UploadQueue) {
        let dir = TempDir::new().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue")).unwrap();
        (dir, queue)
    }

    #[test]
    fn test_open_creates_directory() {
        let (dir, queue) = create_test_queue();
        assert!(dir.path().join("queue").join(QUEUE_DB_NAME).exists());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_fifo_order() {
        let (_dir, queue) = create_test_queue();
        for stand in ["001", "002", "003"] {
            queue.enqueue(&create_test_entry(stand, 1)).unwrap();
        }

        let stands: Vec<String> = std::iter::from_fn(|| queue.dequeue().unwrap())
            .map(|item| item.entry.stand_id)
            .collect();
        assert_eq!(stands, vec!["001", "002", "003"]);
        assert!(queue.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_ids_keep_increasing_after_dequeue() {
        let (_dir, queue) = create_test_queue();
        let first = queue.enqueue(&create_test_entry("001", 1)).unwrap();
        queue.dequeue().unwrap();
        let second = queue.enqueue(&create_test_entry("002", 1)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let (_dir, queue) = create_test_queue();
        queue.enqueue(&create_test_entry("001", 2)).unwrap();

        let head = queue.peek().unwrap().unwrap();
        assert_eq!(head.entry.stand_id, "001");
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_round_trip_through_storage() {
        let (_dir, queue) = create_test_queue();
        for files in [0, 300] {
            let entry = create_test_entry("007", files);
            queue.enqueue(&entry).unwrap();
            assert_eq!(queue.dequeue().unwrap().unwrap().entry, entry);
        }
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let queue = UploadQueue::open(dir.path()).unwrap();
            queue.enqueue(&create_test_entry("001", 1)).unwrap();
            queue.enqueue(&create_test_entry("002", 1)).unwrap();
        }

        let reopened = UploadQueue::open(dir.path()).unwrap();
        let items = reopened.list(10).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].entry.stand_id, "001");
        assert_eq!(items[1].entry.stand_id, "002");
    }

    #[test]
    fn test_inconsistent_entry_rejected() {
        let (_dir, queue) = create_test_queue();
        let mut entry = create_test_entry("001", 2);
        entry.content_types.pop();

        assert!(queue.enqueue(&entry).is_err());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_tampered_payload_is_corrupt() {
        let (_dir, queue) = create_test_queue();
        let id = queue.enqueue(&create_test_entry("001", 1)).unwrap();
        queue
            .conn
            .execute(
                "UPDATE queue_items SET payload = replace(payload, '001', '002') WHERE id = ?1",
                [id],
            )
            .unwrap();

        let err = queue.dequeue().unwrap_err();
        assert!(matches!(err, Error::QueueCorrupt { id: bad, .. } if bad == id));
        // Left in place for inspection.
        assert_eq!(queue.len().unwrap(), 1);
        assert!(queue.remove(id).unwrap());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_open_read_only_missing_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");

        assert!(UploadQueue::open_read_only(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_open_read_only_sees_items() {
        let (dir, queue) = create_test_queue();
        queue.enqueue(&create_test_entry("001", 1)).unwrap();

        let reader = UploadQueue::open_read_only(dir.path().join("queue"))
            .unwrap()
            .unwrap();
        assert_eq!(reader.len().unwrap(), 1);
        assert_eq!(reader.peek().unwrap().unwrap().entry.stand_id, "001");
    }

    #[test]
    fn test_failed_insert_is_queue_write() {
        let (dir, queue) = create_test_queue();
        queue.enqueue(&create_test_entry("001", 1)).unwrap();

        let reader = UploadQueue::open_read_only(dir.path().join("queue"))
            .unwrap()
            .unwrap();
        let err = reader.enqueue(&create_test_entry("002", 1)).unwrap_err();

        assert!(matches!(err, Error::QueueWrite { .. }));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_list_limit() {
        let (_dir, queue) = create_test_queue();
        for i in 0..5 {
            queue.enqueue(&create_test_entry(&format!("{i:03}"), 1)).unwrap();
        }
        assert_eq!(queue.list(3).unwrap().len(), 3);
        assert_eq!(queue.list(0).unwrap().len(), 0);
    }

    #[test]
    fn test_stats() {
        let (_dir, queue) = create_test_queue();
        let empty = queue.stats().unwrap();
        assert_eq!(empty.items, 0);
        assert!(empty.oldest_enqueued.is_none());

        queue.enqueue(&create_test_entry("001", 1)).unwrap();
        queue.enqueue(&create_test_entry("002", 1)).unwrap();
        let stats = queue.stats().unwrap();
        assert_eq!(stats.items, 2);
        assert!(stats.oldest_enqueued.unwrap() <= stats.newest_enqueued.unwrap());
        assert!(stats.db_size_bytes > 0);
    }

    #[test]
    fn test_remove_nonexistent() {
        let (_dir, queue) = create_test_queue();
        assert!(!queue.remove(99_999).unwrap());
    }

    #[test]
    fn test_concurrent_producers() {
        let dir = TempDir::new().unwrap();
        let queue_dir = dir.path().join("queue");
        let lock_path = dir.path().join("queue.lock");
        UploadQueue::open(&queue_dir).unwrap();

        let sequence = Arc::new(AtomicUsize::new(0));
        let commits = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue_dir = queue_dir.clone();
                let lock = QueueLock::new(lock_path.clone(), Duration::from_secs(30));
                let sequence = Arc::clone(&sequence);
                let commits = Arc::clone(&commits);
                thread::spawn(move || {
                    // Separate connection and lock handle per producer.
                    let queue = UploadQueue::open(&queue_dir).unwrap();
                    let entry = create_test_entry(&format!("{i:03}"), i);
                    lock.with_lock(|| {
                        let id = queue.enqueue(&entry)?;
                        let seq = sequence.fetch_add(1, Ordering::SeqCst);
                        commits.lock().unwrap().push((seq, id));
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let queue = UploadQueue::open(&queue_dir).unwrap();
        let items = queue.list(100).unwrap();
        assert_eq!(items.len(), 8);

        let mut stands: Vec<_> = items.iter().map(|i| i.entry.stand_id.clone()).collect();
        stands.sort();
        stands.dedup();
        assert_eq!(stands.len(), 8);

        // Queue order matches the order the lock was held in.
        let mut commits = commits.lock().unwrap().clone();
        commits.sort_unstable();
        let ids_by_lock_order: Vec<i64> = commits.iter().map(|(_, id)| *id).collect();
        let ids_in_queue: Vec<i64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids_by_lock_order, ids_in_queue);
    }
}

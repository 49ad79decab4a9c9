//! `SQLite` schema definitions for the upload queue.

/// SQL statement to create the queue table.
///
/// `AUTOINCREMENT` keeps ids strictly increasing even after the newest rows
/// are dequeued, so id order is insertion order.
pub const CREATE_QUEUE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS queue_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enqueued_at TEXT NOT NULL,
    format_version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    checksum TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_QUEUE_TABLE, CREATE_METADATA_TABLE];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_queue_table_contains_required_columns() {
        assert!(CREATE_QUEUE_TABLE.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(CREATE_QUEUE_TABLE.contains("payload TEXT NOT NULL"));
        assert!(CREATE_QUEUE_TABLE.contains("checksum TEXT NOT NULL"));
        assert!(CREATE_QUEUE_TABLE.contains("format_version INTEGER NOT NULL"));
    }
}

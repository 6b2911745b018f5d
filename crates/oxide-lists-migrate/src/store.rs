//! Schema snapshot history.
//!
//! Every successful run appends one row to the history table holding the
//! serialized schema it left the database in. The planner diffs against the
//! most recent row.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use oxide_lists::field::{FieldDescriptor, FieldKind};
use oxide_lists::list::ListDescriptor;

use crate::error::{MigrateError, Result};
use crate::snapshot::{ListSchema, SchemaSnapshotRecord};

/// Key of the reserved list backing the history table.
pub const HISTORY_LIST: &str = "SchemaHistory";

/// Default table name of the history list.
pub const HISTORY_TABLE: &str = "schema_history";

/// Fields the history list must declare.
pub const HISTORY_COLUMNS: [&str; 3] = ["content", "createdAt", "active"];

/// Returns the declaration of the history list, for applications to register
/// alongside their own lists.
#[must_use]
pub fn history_list() -> ListDescriptor {
    ListDescriptor::new(HISTORY_LIST)
        .table_name(HISTORY_TABLE)
        .field(FieldDescriptor::new("content", FieldKind::Text).required())
        .field(FieldDescriptor::new("createdAt", FieldKind::DateTime).required())
        .field(FieldDescriptor::new("active", FieldKind::Checkbox).default_value(json!(true)))
}

/// Reads and appends schema snapshots.
///
/// Methods take a connection rather than a pool so that a save can share the
/// transaction of the modifications it records.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    table: String,
}

impl SnapshotStore {
    /// Creates a store over the given history table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Returns the history table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ensures the history table exists.
    pub async fn ensure_table(&self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
             \"content\" TEXT NOT NULL,\n  \
             \"createdAt\" TEXT NOT NULL,\n  \
             \"active\" INTEGER DEFAULT 1\n)",
            self.table
        );
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// Returns true if the history table exists.
    pub async fn exists(&self, conn: &mut SqliteConnection) -> Result<bool> {
        table_exists(conn, &self.table).await
    }

    /// Loads the most recent snapshot by creation time.
    ///
    /// Returns `None` when the table does not exist yet or holds no rows.
    pub async fn load_latest(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<SchemaSnapshotRecord>> {
        self.load_one(conn, "").await
    }

    /// Loads the most recent snapshot flagged active.
    pub async fn load_latest_active(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<SchemaSnapshotRecord>> {
        self.load_one(conn, "WHERE \"active\" = 1").await
    }

    async fn load_one(
        &self,
        conn: &mut SqliteConnection,
        filter: &str,
    ) -> Result<Option<SchemaSnapshotRecord>> {
        if !self.exists(conn).await? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT \"id\", \"content\", \"createdAt\", \"active\" FROM \"{}\" {} \
             ORDER BY \"createdAt\" DESC, \"id\" DESC LIMIT 1",
            self.table, filter
        );
        let row: Option<SnapshotRow> = sqlx::query_as(&sql).fetch_optional(&mut *conn).await?;

        row.map(into_record).transpose()
    }

    /// Loads every snapshot, oldest first.
    pub async fn list_all(&self, conn: &mut SqliteConnection) -> Result<Vec<SchemaSnapshotRecord>> {
        if !self.exists(conn).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT \"id\", \"content\", \"createdAt\", \"active\" FROM \"{}\" \
             ORDER BY \"createdAt\", \"id\"",
            self.table
        );
        let rows: Vec<SnapshotRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

        rows.into_iter().map(into_record).collect()
    }

    /// Fails with [`MigrateError::ConcurrentRun`] unless the latest stored
    /// snapshot is `baseline`.
    pub async fn check_baseline(
        &self,
        conn: &mut SqliteConnection,
        baseline: Option<i64>,
    ) -> Result<()> {
        let found = self.load_latest(conn).await?.map(|record| record.id);
        if found != baseline {
            return Err(MigrateError::ConcurrentRun {
                expected: baseline,
                found,
            });
        }
        Ok(())
    }

    /// Appends `content` as the new active snapshot.
    ///
    /// `baseline` is the id of the snapshot the plan was computed against.
    /// The save is refused when another snapshot has been stored since.
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        content: &[ListSchema],
        baseline: Option<i64>,
    ) -> Result<SchemaSnapshotRecord> {
        self.check_baseline(conn, baseline).await?;
        self.ensure_table(conn).await?;

        let deactivate = format!(
            "UPDATE \"{}\" SET \"active\" = 0 WHERE \"active\" <> 0",
            self.table
        );
        sqlx::query(&deactivate).execute(&mut *conn).await?;

        let created_at = Utc::now();
        let serialized = serde_json::to_string(content)?;
        let insert = format!(
            "INSERT INTO \"{}\" (\"content\", \"createdAt\", \"active\") VALUES (?, ?, 1)",
            self.table
        );
        let result = sqlx::query(&insert)
            .bind(&serialized)
            .bind(created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&mut *conn)
            .await?;

        let id = result.last_insert_rowid();
        debug!(table = %self.table, id, "Stored schema snapshot");

        Ok(SchemaSnapshotRecord {
            id,
            content: content.to_vec(),
            created_at,
            active: true,
        })
    }
}

type SnapshotRow = (i64, String, String, Option<bool>);

fn into_record((id, content, created_at, active): SnapshotRow) -> Result<SchemaSnapshotRecord> {
    Ok(SchemaSnapshotRecord {
        id,
        content: serde_json::from_str(&content)?,
        created_at: parse_timestamp(&created_at)?,
        active: active.unwrap_or(true),
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite datetime format fallback
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            MigrateError::Serialization(serde::de::Error::custom(format!(
                "invalid createdAt '{}': {}",
                value, e
            )))
        })
}

/// Returns true if `name` is an existing table.
pub async fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.is_some())
}

/// Returns true if `table` has a column named `column`.
pub async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> Result<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FieldSnapshot;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn schema(field: &str) -> Vec<ListSchema> {
        vec![ListSchema::new("Todo")
            .table("todos")
            .field(FieldSnapshot::new("Text", field))]
    }

    #[tokio::test]
    async fn test_load_latest_without_table() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);

        assert!(store.load_latest(&mut conn).await.unwrap().is_none());
        assert!(store.list_all(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_table_idempotent() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);

        store.ensure_table(&mut conn).await.unwrap();
        store.ensure_table(&mut conn).await.unwrap();
        assert!(store.exists(&mut conn).await.unwrap());
        assert!(store.load_latest(&mut conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);

        let saved = store.save(&mut conn, &schema("name"), None).await.unwrap();
        let loaded = store.load_latest(&mut conn).await.unwrap().unwrap();

        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.content, schema("name"));
        assert!(loaded.active);
    }

    #[tokio::test]
    async fn test_save_appends_and_moves_active_flag() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);

        let first = store.save(&mut conn, &schema("name"), None).await.unwrap();
        let second = store
            .save(&mut conn, &schema("fullName"), Some(first.id))
            .await
            .unwrap();

        let all = store.list_all(&mut conn).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, schema("name"));
        assert!(!all[0].active);
        assert!(all[1].active);

        let latest = store.load_latest(&mut conn).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        let active = store.load_latest_active(&mut conn).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
    }

    #[tokio::test]
    async fn test_save_rejects_stale_baseline() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);

        store.save(&mut conn, &schema("name"), None).await.unwrap();
        let result = store.save(&mut conn, &schema("other"), None).await;

        assert!(matches!(
            result,
            Err(MigrateError::ConcurrentRun {
                expected: None,
                found: Some(_)
            })
        ));
        assert_eq!(store.list_all(&mut conn).await.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-01T10:20:30.123456Z").unwrap();
        assert_eq!(rfc.timestamp(), 1_709_288_430);

        let sqlite = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(sqlite.timestamp(), 1_709_288_430);
    }

    #[tokio::test]
    async fn test_unreadable_timestamp_is_an_error() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let store = SnapshotStore::new(HISTORY_TABLE);
        store.ensure_table(&mut conn).await.unwrap();

        sqlx::query(
            "INSERT INTO \"schema_history\" (\"content\", \"createdAt\") VALUES ('[]', 'yesterday')",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let result = store.load_latest(&mut conn).await;
        assert!(matches!(result, Err(MigrateError::Serialization(_))));
    }
}

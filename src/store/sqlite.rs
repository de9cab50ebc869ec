//! SQLite-backed reading store.

use async_trait::async_trait;
use hvwatch_types::{ParamKind, ParamValue, ParameterSet};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{ReadingRow, ReadingStore, StoreError};

/// Table holding one row per (captured_at, slot, channel).
const TABLE: &str = "hv_readings";

/// Conservative floor for SQLite's per-statement bind variable limit.
/// Multi-row inserts are chunked to stay under it; all chunks share one
/// transaction and one commit.
const MAX_BIND_PARAMS: usize = 999;

/// A [`ReadingStore`] writing to SQLite through a connection pool.
///
/// The table is created on connect with a composite primary key on
/// (captured_at, slot, channel) and one column per tracked parameter, so
/// `INSERT OR IGNORE` gives the idempotent-retry semantics the committer
/// relies on. Parameter columns come from the engine's [`ParameterSet`]
/// (validated identifiers), flags as `INTEGER`, analog values as `REAL`.
///
/// # Example
///
/// ```rust,no_run
/// use hvwatch::store::SqliteStore;
/// use hvwatch_types::ParameterSet;
///
/// # tokio_test::block_on(async {
/// let store = SqliteStore::connect(
///     "sqlite://hvwatch.db?mode=rwc",
///     ParameterSet::default_set(),
/// )
/// .await?;
/// # Ok::<_, hvwatch::store::StoreError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    parameters: ParameterSet,
    insert_prefix: String,
    rows_per_chunk: usize,
}

impl SqliteStore {
    /// Connect to a database URL and ensure the schema exists.
    pub async fn connect(url: &str, parameters: ParameterSet) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        Self::with_pool(pool, parameters).await
    }

    /// An in-memory database, for tests and demos. Single connection:
    /// SQLite gives every `:memory:` connection its own database.
    pub async fn in_memory(parameters: ParameterSet) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, parameters).await
    }

    async fn with_pool(pool: SqlitePool, parameters: ParameterSet) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            insert_prefix: insert_prefix(&parameters),
            rows_per_chunk: rows_per_chunk(&parameters),
            parameters,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let columns: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let sql_type = match p.kind() {
                    ParamKind::Flag => "INTEGER",
                    ParamKind::Analog => "REAL",
                };
                format!("{} {}", p.column(), sql_type)
            })
            .collect();

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (\
                captured_at TEXT NOT NULL, \
                slot INTEGER NOT NULL, \
                channel INTEGER NOT NULL, \
                {}, \
                PRIMARY KEY (captured_at, slot, channel)\
            )",
            columns.join(", ")
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Total number of stored rows.
    pub async fn row_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn insert_prefix(parameters: &ParameterSet) -> String {
    let columns: Vec<&str> = parameters.iter().map(|p| p.column()).collect();
    format!(
        "INSERT OR IGNORE INTO {TABLE} (captured_at, slot, channel, {}) ",
        columns.join(", ")
    )
}

fn rows_per_chunk(parameters: &ParameterSet) -> usize {
    (MAX_BIND_PARAMS / (3 + parameters.len())).max(1)
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn insert_batch(&self, rows: &[ReadingRow]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        // One transaction, one commit, for the entire batch; a failure in
        // any chunk rolls the whole batch back.
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for chunk in rows.chunks(self.rows_per_chunk) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&self.insert_prefix);
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.captured_at);
                b.push_bind(row.slot as i64);
                b.push_bind(row.channel as i64);
                for value in &row.values {
                    match value {
                        ParamValue::Int(i) => {
                            b.push_bind(*i);
                        }
                        ParamValue::Float(f) => {
                            b.push_bind(*f);
                        }
                    }
                }
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!(rows = rows.len(), inserted, "batch written");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use hvwatch_types::Parameter;

    fn ts(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, second)
            .unwrap()
    }

    fn small_set() -> ParameterSet {
        ParameterSet::new(vec![
            Parameter::flag("Pw", "power"),
            Parameter::analog("VMon", "vmon"),
        ])
        .unwrap()
    }

    fn row(second: u32, slot: u16, channel: u16) -> ReadingRow {
        ReadingRow {
            captured_at: ts(second),
            slot,
            channel,
            values: vec![ParamValue::Int(1), ParamValue::Float(1499.5)],
        }
    }

    #[tokio::test]
    async fn inserts_and_counts_rows() {
        let store = SqliteStore::in_memory(small_set()).await.unwrap();
        let batch = vec![row(0, 1, 0), row(0, 1, 1), row(1, 1, 0)];

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 3);
        assert_eq!(store.row_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn resubmitting_a_batch_is_idempotent() {
        let store = SqliteStore::in_memory(small_set()).await.unwrap();
        let batch = vec![row(0, 4, 0), row(0, 4, 1)];

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 2);
        // Retry after an ambiguous failure: no duplicate-key errors, no
        // duplicate rows.
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 0);
        assert_eq!(store.row_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn large_batches_span_chunks_within_one_commit() {
        let store = SqliteStore::in_memory(small_set()).await.unwrap();
        // More rows than fit in one statement at this parameter count.
        let per_chunk = rows_per_chunk(&small_set());
        let batch: Vec<ReadingRow> =
            (0..(per_chunk * 2 + 10) as u16).map(|ch| row(0, 1, ch)).collect();

        assert_eq!(store.insert_batch(&batch).await.unwrap(), batch.len() as u64);
        assert_eq!(store.row_count().await.unwrap(), batch.len() as u64);
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_rows_behind() {
        let store = SqliteStore::in_memory(small_set()).await.unwrap();
        // Fill a whole first chunk with good rows, then poison the second
        // chunk with a wrong-arity row: the first chunk's statement has
        // already executed inside the transaction and must roll back with
        // the failure.
        let per_chunk = rows_per_chunk(&small_set());
        let mut batch: Vec<ReadingRow> =
            (0..per_chunk as u16).map(|ch| row(0, 1, ch)).collect();
        let mut bad = row(1, 1, 0);
        bad.values.pop();
        batch.push(bad);

        assert!(store.insert_batch(&batch).await.is_err());
        assert_eq!(store.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = SqliteStore::in_memory(small_set()).await.unwrap();
        assert_eq!(store.insert_batch(&[]).await.unwrap(), 0);
        assert_eq!(store.row_count().await.unwrap(), 0);
    }
}

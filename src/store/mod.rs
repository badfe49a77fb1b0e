//! Parameterized predicate execution against SQLite.

mod connection;
pub mod placeholder;
pub mod template;

pub use connection::ScopedConnection;
pub use template::{TableTemplate, TemplateError};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rusqlite::{Connection, ErrorCode, params_from_iter};
use tracing::debug;

use crate::config::StoreConfig;
use crate::record::{ResultRecord, Value};
use crate::translate::Predicate;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("store connection failed: {0}")]
    Connection(#[source] rusqlite::Error),

    #[error("statement rejected: {0}")]
    Statement(#[source] rusqlite::Error),

    #[error("parameter count mismatch: statement has {expected} placeholders, predicate has {actual} parameters")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("fetch failed: {0}")]
    Fetch(#[source] rusqlite::Error),

    #[error("query exceeded {0:?} timeout")]
    Timeout(Duration),

    #[error("result exceeds {0} rows")]
    TooManyRows(usize),

    #[error("store task failed: {0}")]
    Task(String),
}

impl ExecutionError {
    /// Lock contention and timeouts may clear up; everything else is deterministic.
    pub fn is_retriable(&self) -> bool {
        match self {
            ExecutionError::Timeout(_) => true,
            ExecutionError::Connection(e) | ExecutionError::Statement(e) | ExecutionError::Fetch(e) => {
                matches!(
                    e.sqlite_error_code(),
                    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
                )
            }
            _ => false,
        }
    }
}

/// Runs a translated predicate against the store.
/// Implemented by `QueryExecutor`; fakes are used in pipeline tests.
pub trait Execute {
    async fn execute(
        &self,
        template: &TableTemplate,
        predicate: &Predicate,
    ) -> Result<Vec<ResultRecord>, ExecutionError>;
}

/// Opens a fresh connection per call; no connection is shared between calls.
#[derive(Clone)]
pub struct QueryExecutor {
    config: Arc<StoreConfig>,
    live: Arc<AtomicUsize>,
}

impl QueryExecutor {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connections opened by this executor and not yet released.
    pub fn open_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Final statement text. Parameter values never appear in it.
    pub fn compose(template: &TableTemplate, predicate: &Predicate) -> String {
        template.render(&placeholder::to_sqlite(&predicate.where_clause))
    }
}

impl Execute for QueryExecutor {
    async fn execute(
        &self,
        template: &TableTemplate,
        predicate: &Predicate,
    ) -> Result<Vec<ResultRecord>, ExecutionError> {
        let sql = Self::compose(template, predicate);
        let params = predicate.parameters.clone();
        let config = Arc::clone(&self.config);
        let live = Arc::clone(&self.live);

        // The guard lives inside the blocking task, so it is released even if
        // this future is dropped before the task finishes.
        let records = tokio::task::spawn_blocking(move || {
            let conn = ScopedConnection::open(&config, live)?;
            conn.set_deadline(Instant::now() + config.query_timeout)?;
            run_query(&conn, &sql, &params, &config)
        })
        .await
        .map_err(|e| ExecutionError::Task(e.to_string()))??;

        debug!(rows = records.len(), params = predicate.parameters.len(), "query executed");
        Ok(records)
    }
}

fn run_query(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    config: &StoreConfig,
) -> Result<Vec<ResultRecord>, ExecutionError> {
    let classify = |e: rusqlite::Error, wrap: fn(rusqlite::Error) -> ExecutionError| {
        if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
            ExecutionError::Timeout(config.query_timeout)
        } else {
            wrap(e)
        }
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| classify(e, ExecutionError::Statement))?;

    let expected = stmt.parameter_count();
    if expected != params.len() {
        return Err(ExecutionError::ArityMismatch {
            expected,
            actual: params.len(),
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| classify(e, ExecutionError::Statement))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(|e| classify(e, ExecutionError::Fetch))? {
        if records.len() == config.max_rows {
            return Err(ExecutionError::TooManyRows(config.max_rows));
        }
        let mut record = ResultRecord::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| classify(e, ExecutionError::Fetch))?;
            record.insert(name.as_str(), Value::from(value));
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, StoreConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE products (
                    id INTEGER PRIMARY KEY,
                    product_code TEXT NOT NULL,
                    name TEXT NOT NULL,
                    rod_length INTEGER,
                    price REAL,
                    region TEXT,
                    in_stock INTEGER,
                    image BLOB
                );
                INSERT INTO products VALUES
                    (1, '13w42', 'Widget Pro', 120, 149.5, 'ca', 1, NULL),
                    (2, '13w42', 'Widget Mini', 40, 99.0, 'ny', 1, NULL),
                    (3, '88x10', 'Gadget', 250, 300.0, 'ca', 0, X'CAFE'),
                    (4, 'zz01', 'Widget Max', 200, 180.0, 'tx', 1, NULL);
                "#,
            )
            .unwrap();
        (dir, StoreConfig::new(path))
    }

    fn products() -> TableTemplate {
        TableTemplate::select_all("products").unwrap()
    }

    fn ids(records: &[ResultRecord]) -> Vec<i64> {
        records
            .iter()
            .map(|r| match r.get("id") {
                Some(Value::Integer(id)) => *id,
                other => panic!("unexpected id: {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn pyformat_predicate_returns_matching_rows() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("product_code = %s", vec![Value::Text("13w42".into())]);

        let records = executor.execute(&products(), &predicate).await.unwrap();

        assert_eq!(ids(&records), [1, 2]);
        assert_eq!(
            records[0].columns().collect::<Vec<_>>(),
            ["id", "product_code", "name", "rod_length", "price", "region", "in_stock", "image"]
        );
        assert_eq!(records[0].get("price"), Some(&Value::Real(149.5)));
        assert_eq!(records[0].get("image"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn range_predicate_binds_both_bounds() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new(
            "rod_length BETWEEN $1 AND $2",
            vec![Value::Integer(50), Value::Integer(200)],
        );

        let records = executor.execute(&products(), &predicate).await.unwrap();
        assert_eq!(ids(&records), [1, 4]);
    }

    #[tokio::test]
    async fn no_matches_is_empty_not_error() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("region = ?", vec![Value::Text("zz".into())]);

        let records = executor.execute(&products(), &predicate).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn too_few_parameters_is_arity_mismatch() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("price >= ? AND price < ?", vec![Value::Integer(100)]);

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(
            result,
            Err(ExecutionError::ArityMismatch { expected: 2, actual: 1 })
        ));
        assert_eq!(executor.open_connections(), 0);
    }

    #[tokio::test]
    async fn too_many_parameters_is_arity_mismatch() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new(
            "region = %s",
            vec![Value::Text("ca".into()), Value::Text("ny".into())],
        );

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(
            result,
            Err(ExecutionError::ArityMismatch { expected: 1, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn unknown_column_is_rejected_and_connection_released() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("colour = ?", vec![Value::Text("red".into())]);

        let err = executor.execute(&products(), &predicate).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Statement(_)), "got: {err:?}");
        assert!(err.to_string().contains("colour"), "got: {err}");
        assert_eq!(executor.open_connections(), 0);
    }

    #[tokio::test]
    async fn hostile_value_is_bound_not_interpolated() {
        let (dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let hostile = "x'; DROP TABLE products; --";
        let predicate = Predicate::new("name = ?", vec![Value::Text(hostile.into())]);

        let sql = QueryExecutor::compose(&products(), &predicate);
        assert!(!sql.contains("DROP"), "statement text leaked value: {sql}");

        let records = executor.execute(&products(), &predicate).await.unwrap();
        assert!(records.is_empty());

        let conn = Connection::open(dir.path().join("products.db")).unwrap();
        let n: i64 = conn
            .query_row("SELECT count(*) FROM products", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 4);
    }

    #[tokio::test]
    async fn stacked_statement_in_clause_is_rejected() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("1 = 1; DROP TABLE products", vec![]);

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(result, Err(ExecutionError::Statement(_))));
    }

    #[tokio::test]
    async fn mid_fetch_error_discards_partial_rows() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        // Rows 1 and 2 evaluate fine; row 3 overflows abs() while stepping.
        let predicate = Predicate::new(
            "CASE WHEN id = 3 THEN abs(-9223372036854775807 - ?) ELSE 1 END",
            vec![Value::Integer(1)],
        );

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(result, Err(ExecutionError::Fetch(_))), "got: {result:?}");
        assert_eq!(executor.open_connections(), 0);
    }

    #[tokio::test]
    async fn dollar_inside_column_name_is_not_a_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE prices (id INTEGER PRIMARY KEY, "price$1" INTEGER);
                INSERT INTO prices VALUES (1, 2), (2, 5);
                "#,
            )
            .unwrap();
        let executor = QueryExecutor::new(StoreConfig::new(path));
        let template = TableTemplate::select_all("prices").unwrap();
        let predicate = Predicate::new("price$1 = ?", vec![Value::Integer(2)]);

        assert_eq!(
            QueryExecutor::compose(&template, &predicate),
            r#"SELECT * FROM "prices" WHERE (price$1 = ?)"#
        );
        let records = executor.execute(&template, &predicate).await.unwrap();
        assert_eq!(ids(&records), [1]);
    }

    #[tokio::test]
    async fn missing_database_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = QueryExecutor::new(StoreConfig::new(dir.path().join("nope.db")));
        let predicate = Predicate::new("id = ?", vec![Value::Integer(1)]);

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(result, Err(ExecutionError::Connection(_))));
        assert_eq!(executor.open_connections(), 0);
    }

    #[tokio::test]
    async fn row_cap_fails_instead_of_truncating() {
        let (_dir, mut config) = fixture();
        config.max_rows = 2;
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new("in_stock = ?", vec![Value::Bool(true)]);

        let result = executor.execute(&products(), &predicate).await;
        assert!(matches!(result, Err(ExecutionError::TooManyRows(2))));
    }

    #[tokio::test]
    async fn slow_statement_times_out() {
        let (_dir, mut config) = fixture();
        config.query_timeout = Duration::from_millis(50);
        let executor = QueryExecutor::new(config);
        let predicate = Predicate::new(
            "(WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000) \
             SELECT count(*) FROM c) > ?",
            vec![Value::Integer(0)],
        );

        let err = executor.execute(&products(), &predicate).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)), "got: {err:?}");
        assert!(err.is_retriable());
        assert_eq!(executor.open_connections(), 0);
    }

    #[tokio::test]
    async fn blob_and_duplicate_columns() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let template =
            TableTemplate::new("SELECT id, image, name AS id FROM products WHERE {predicate}")
                .unwrap();
        let predicate = Predicate::new("product_code = ?", vec![Value::Text("88x10".into())]);

        let records = executor.execute(&template, &predicate).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[0].get("id"), Some(&Value::Text("Gadget".into())));
        assert_eq!(records[0].get("image"), Some(&Value::Blob(vec![0xCA, 0xFE])));
    }

    #[tokio::test]
    async fn concurrent_executions_are_independent() {
        let (_dir, config) = fixture();
        let executor = QueryExecutor::new(config);
        let template = products();
        let ca = Predicate::new("region = ?", vec![Value::Text("ca".into())]);
        let ny = Predicate::new("region = ?", vec![Value::Text("ny".into())]);

        let (a, b) = tokio::join!(
            executor.execute(&template, &ca),
            executor.execute(&template, &ny)
        );
        assert_eq!(ids(&a.unwrap()), [1, 3]);
        assert_eq!(ids(&b.unwrap()), [2]);
        assert_eq!(executor.open_connections(), 0);
    }

    #[test]
    fn busy_is_retriable_but_arity_is_not() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(ExecutionError::Fetch(busy).is_retriable());
        assert!(!ExecutionError::ArityMismatch { expected: 1, actual: 0 }.is_retriable());
    }
}

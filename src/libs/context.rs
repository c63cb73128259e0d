//! Execution contexts that built queries run against.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Column, PgPool, Postgres, Row, Transaction, TypeInfo};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::libs::config::DbConfig;
use crate::libs::error::{Error, Result};
use crate::libs::query_builder::{InsertQuery, JsonRow, SelectQuery, Statement};

/// Runs rendered statements.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>>;

    /// Returns the number of rows affected.
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// The pool a transaction can be started from.
    fn pool(&self) -> Option<&PgPool> {
        None
    }
}

fn bind_params(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(sqlx::types::Json(other)),
        };
    }
    query
}

fn column<'r, T>(row: &'r PgRow, index: usize, into: impl FnOnce(T) -> Value) -> sqlx::Result<Value>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    Ok(row.try_get::<Option<T>, _>(index)?.map_or(Value::Null, into))
}

/// A number when `f64` holds it, the decimal text otherwise.
fn numeric_to_json(v: BigDecimal) -> Value {
    let text = v.to_string();
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::String(text), Value::Number)
}

fn timestamp_to_json(v: DateTime<Utc>) -> Value {
    Value::from(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn bytea_to_json(v: Vec<u8>) -> Value {
    let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
    Value::from(format!("\\x{}", hex))
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> sqlx::Result<Value> {
    match type_name {
        "BOOL" => column(row, index, |v: bool| Value::from(v)),
        "INT2" => column(row, index, |v: i16| Value::from(v)),
        "INT4" => column(row, index, |v: i32| Value::from(v)),
        // Carried as a string so the value survives JSON number precision.
        "INT8" => column(row, index, |v: i64| Value::from(v.to_string())),
        "FLOAT4" => column(row, index, |v: f32| Value::from(f64::from(v))),
        "FLOAT8" => column(row, index, |v: f64| Value::from(v)),
        "NUMERIC" => column(row, index, numeric_to_json),
        "UUID" => column(row, index, |v: uuid::Uuid| Value::from(v.to_string())),
        "JSON" | "JSONB" => column(row, index, |v: Value| v),
        "DATE" => column(row, index, |v: chrono::NaiveDate| Value::from(v.to_string())),
        "TIME" => column(row, index, |v: chrono::NaiveTime| Value::from(v.to_string())),
        // Read as UTC so the value carries an offset.
        "TIMESTAMP" => column(row, index, |v: chrono::NaiveDateTime| {
            timestamp_to_json(v.and_utc())
        }),
        "TIMESTAMPTZ" => column(row, index, timestamp_to_json),
        "BYTEA" => column(row, index, bytea_to_json),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            column(row, index, |v: String| Value::from(v))
        }
        // Native enums and other text-like types.
        _ => Ok(row
            .try_get_unchecked::<Option<String>, _>(index)?
            .map_or(Value::Null, Value::from)),
    }
}

/// Converts a result row to a JSON object keyed by column name.
pub(crate) fn row_to_json(row: &PgRow) -> sqlx::Result<JsonRow> {
    let mut map = JsonRow::new();
    for col in row.columns() {
        let col_name = col.name();
        let type_name = col.type_info().name();
        let value = decode_column(row, col.ordinal(), type_name).inspect_err(|err| {
            warn!(column = col_name, ty = type_name, error = %err, "undecodable column");
        })?;
        map.insert(col_name.to_string(), value);
    }
    Ok(map)
}

#[async_trait]
impl Executor for PgPool {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>> {
        let rows = bind_params(statement).fetch_all(self).await?;
        Ok(rows.iter().map(row_to_json).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        Ok(bind_params(statement).execute(self).await?.rows_affected())
    }

    fn pool(&self) -> Option<&PgPool> {
        Some(self)
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>> {
        (**self).fetch_all(statement).await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        (**self).execute(statement).await
    }

    fn pool(&self) -> Option<&PgPool> {
        (**self).pool()
    }
}

/// Executor bound to one open transaction.
struct TransactionExecutor {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl TransactionExecutor {
    fn closed() -> Error {
        Error::invalid_state("transaction context used after its scope ended")
    }
}

#[async_trait]
impl Executor for TransactionExecutor {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::closed)?;
        let rows = bind_params(statement).fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_to_json).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::closed)?;
        Ok(bind_params(statement).execute(&mut **tx).await?.rows_affected())
    }
}

/// Handle to where queries run: a pool, a transaction, or any other [`Executor`].
///
/// Cloning is cheap and clones share the same executor.
#[derive(Clone)]
pub struct Context {
    executor: Arc<dyn Executor>,
}

impl Context {
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(pool)
    }

    pub async fn connect(config: &DbConfig) -> Result<Self> {
        Ok(Self::from_pool(config.connect().await?))
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// Whether both handles run on the same executor.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.executor, &other.executor)
    }

    pub fn select_from<T>(&self, table: &str, columns: &[&str]) -> SelectQuery<T> {
        SelectQuery::new(self.clone(), table, columns)
    }

    pub fn insert_into(&self, table: &str, record: JsonRow) -> InsertQuery {
        InsertQuery::new(self.clone(), table, record)
    }

    /// Runs `f` inside a transaction.
    ///
    /// `f` receives a context scoped to the transaction. The transaction is
    /// committed when `f` returns `Ok` and rolled back otherwise.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let pool = self.executor.pool().ok_or_else(|| {
            Error::invalid_state("transactions can only be started from a pool context")
        })?;
        let executor = Arc::new(TransactionExecutor {
            tx: Mutex::new(Some(pool.begin().await?)),
        });
        let scoped = Context {
            executor: executor.clone(),
        };

        let outcome = f(scoped).await;

        let tx = executor
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(TransactionExecutor::closed)?;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                tx.rollback().await?;
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("executor", &Arc::as_ptr(&self.executor))
            .finish()
    }
}

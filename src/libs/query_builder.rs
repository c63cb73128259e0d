use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::libs::context::Context;
use crate::libs::error::{Error, Result};
use crate::libs::field::Raw;

/// SQL type per column name, used to cast bound parameters.
pub type ColumnTypes = Arc<IndexMap<String, String>>;

/// A JSON object row, as produced by an [`Executor`](crate::Executor).
pub type JsonRow = Map<String, Value>;

/// Rendered SQL text along with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare {
        column: String,
        op: Op,
        value: Value,
    },
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    Raw(Raw),
}

/// Escapes `LIKE` wildcards with the default `\` escape character.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Conditions of a `WHERE` clause, joined with `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    clauses: Vec<Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn r#where(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.clauses.push(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.r#where(column, Op::Eq, value)
    }

    /// Matches rows where `column` contains `pattern`.
    ///
    /// `%` and `_` in `pattern` match themselves, not any text.
    pub fn like(mut self, column: &str, pattern: &str) -> Self {
        self.clauses.push(Condition::Like {
            column: column.to_string(),
            pattern: format!("%{}%", escape_like(pattern)),
            case_insensitive: false,
        });
        self
    }

    /// Case-insensitive [`Conditions::like`].
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.clauses.push(Condition::Like {
            column: column.to_string(),
            pattern: format!("%{}%", escape_like(pattern)),
            case_insensitive: true,
        });
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.clauses.push(Condition::Null {
            column: column.to_string(),
            negated: false,
        });
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.clauses.push(Condition::Null {
            column: column.to_string(),
            negated: true,
        });
        self
    }

    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn where_raw(mut self, raw: Raw) -> Self {
        self.clauses.push(Condition::Raw(raw));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

pub type ConditionsFn = Box<dyn FnOnce(Conditions) -> Conditions + Send>;

/// Row filter of a select.
pub enum Predicate {
    /// Column equals value, for every entry.
    Equals(Map<String, Value>),
    /// Arbitrary conditions, handed straight to [`Conditions`].
    Builder(ConditionsFn),
}

impl Predicate {
    /// Matches every row.
    pub fn all() -> Self {
        Predicate::Equals(Map::new())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(column.into(), value.into());
        Predicate::Equals(map)
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(Conditions) -> Conditions + Send + 'static,
    {
        Predicate::Builder(Box::new(f))
    }

    fn apply(self, conditions: Conditions) -> Conditions {
        match self {
            Predicate::Equals(map) => map
                .into_iter()
                .fold(conditions, |acc, (column, value)| acc.eq(&column, value)),
            Predicate::Builder(f) => f(conditions),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(map) => f.debug_tuple("Equals").field(map).finish(),
            Predicate::Builder(_) => f.write_str("Builder(..)"),
        }
    }
}

impl From<Map<String, Value>> for Predicate {
    fn from(map: Map<String, Value>) -> Self {
        Predicate::Equals(map)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Predicate
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        Predicate::Equals(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

struct Renderer<'a> {
    sql: String,
    params: Vec<Value>,
    column_types: &'a IndexMap<String, String>,
}

impl<'a> Renderer<'a> {
    fn new(column_types: &'a IndexMap<String, String>) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            column_types,
        }
    }

    fn param(&mut self, column: &str, value: Value) -> String {
        self.params.push(value);
        match self.column_types.get(column) {
            Some(ty) => format!("${}::{}", self.params.len(), ty),
            None => format!("${}", self.params.len()),
        }
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare {
                column,
                op: Op::Eq,
                value: Value::Null,
            } => format!("{} IS NULL", quote_ident(column)),
            Condition::Compare {
                column,
                op: Op::NotEq,
                value: Value::Null,
            } => format!("{} IS NOT NULL", quote_ident(column)),
            Condition::Compare { column, op, value } => {
                let placeholder = self.param(column, value.clone());
                format!("{} {} {}", quote_ident(column), op.as_sql(), placeholder)
            }
            Condition::Like {
                column,
                pattern,
                case_insensitive,
            } => {
                self.params.push(Value::String(pattern.clone()));
                let keyword = if *case_insensitive { "ILIKE" } else { "LIKE" };
                format!("{}::text {} ${}", quote_ident(column), keyword, self.params.len())
            }
            Condition::Null { column, negated } => {
                let check = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", quote_ident(column), check)
            }
            Condition::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            Condition::In { column, values } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| self.param(column, value.clone()))
                    .collect();
                format!("{} IN ({})", quote_ident(column), placeholders.join(", "))
            }
            Condition::Raw(raw) => format!("({})", raw),
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// A `SELECT` against one table, resolving to rows of `T`.
pub struct SelectQuery<T> {
    context: Context,
    table: String,
    columns: Vec<String>,
    conditions: Conditions,
    limit: Option<u64>,
    column_types: ColumnTypes,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SelectQuery<T> {
    /// An empty `columns` list selects `*`.
    pub fn new(context: Context, table: &str, columns: &[&str]) -> Self {
        Self {
            context,
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            conditions: Conditions::default(),
            limit: None,
            column_types: ColumnTypes::default(),
            _marker: PhantomData,
        }
    }

    pub fn r#where(mut self, predicate: impl Into<Predicate>) -> Self {
        self.conditions = predicate.into().apply(self.conditions);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn column_types(mut self, column_types: ColumnTypes) -> Self {
        self.column_types = column_types;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn to_statement(&self) -> Statement {
        let mut renderer = Renderer::new(&self.column_types);
        let selects = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", selects, quote_ident(&self.table));

        if !self.conditions.is_empty() {
            let conds: Vec<String> = self
                .conditions
                .clauses
                .iter()
                .map(|c| renderer.condition(c))
                .collect();
            sql += &format!(" WHERE {}", conds.join(" AND "));
        }
        if let Some(limit) = self.limit {
            sql += &format!(" LIMIT {}", limit);
        }

        renderer.sql = sql;
        renderer.finish()
    }
}

impl<T: DeserializeOwned> SelectQuery<T> {
    pub async fn fetch_all(&self) -> Result<Vec<T>> {
        let statement = self.to_statement();
        debug!(table = %self.table, sql = %statement.sql, "executing select");
        let rows = self.context.executor().fetch_all(&statement).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(Error::from))
            .collect()
    }

    /// First returned row, if any.
    pub async fn fetch_optional(&self) -> Result<Option<T>> {
        Ok(self.fetch_all().await?.into_iter().next())
    }
}

impl<T> fmt::Debug for SelectQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectQuery")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("conditions", &self.conditions)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// An `INSERT` of a single row.
#[derive(Debug)]
pub struct InsertQuery {
    context: Context,
    table: String,
    record: JsonRow,
    returning: Option<String>,
    column_types: ColumnTypes,
}

impl InsertQuery {
    pub fn new(context: Context, table: &str, record: JsonRow) -> Self {
        Self {
            context,
            table: table.to_string(),
            record,
            returning: None,
            column_types: ColumnTypes::default(),
        }
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    pub fn column_types(mut self, column_types: ColumnTypes) -> Self {
        self.column_types = column_types;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn record(&self) -> &JsonRow {
        &self.record
    }

    pub fn returning_column(&self) -> Option<&str> {
        self.returning.as_deref()
    }

    pub fn to_statement(&self) -> Statement {
        let mut renderer = Renderer::new(&self.column_types);
        let mut sql = format!("INSERT INTO {}", quote_ident(&self.table));

        if self.record.is_empty() {
            sql += " DEFAULT VALUES";
        } else {
            let mut cols = Vec::with_capacity(self.record.len());
            let mut placeholders = Vec::with_capacity(self.record.len());
            for (column, value) in &self.record {
                cols.push(quote_ident(column));
                placeholders.push(renderer.param(column, value.clone()));
            }
            sql += &format!(" ({}) VALUES ({})", cols.join(", "), placeholders.join(", "));
        }
        if let Some(column) = &self.returning {
            sql += &format!(" RETURNING {}", quote_ident(column));
        }

        renderer.sql = sql;
        renderer.finish()
    }

    /// Runs the insert, returning the number of rows written.
    pub async fn execute(&self) -> Result<u64> {
        let statement = self.to_statement();
        debug!(table = %self.table, sql = %statement.sql, "executing insert");
        self.context.executor().execute(&statement).await
    }

    /// Runs the insert and decodes the `RETURNING` rows.
    pub async fn fetch_returning<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let statement = self.to_statement();
        debug!(table = %self.table, sql = %statement.sql, "executing insert");
        let rows = self.context.executor().fetch_all(&statement).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::context::{Context, Executor};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Unreachable;

    #[async_trait]
    impl Executor for Unreachable {
        async fn fetch_all(&self, _: &Statement) -> Result<Vec<JsonRow>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _: &Statement) -> Result<u64> {
            Ok(0)
        }
    }

    fn context() -> Context {
        Context::new(Unreachable)
    }

    fn types() -> ColumnTypes {
        Arc::new(IndexMap::from([
            ("id".to_string(), "integer".to_string()),
            ("owner".to_string(), "uuid".to_string()),
        ]))
    }

    #[test]
    fn select_all_columns() {
        let query = SelectQuery::<JsonRow>::new(context(), "foo", &[]);
        assert_eq!(
            query.to_statement(),
            Statement {
                sql: "SELECT * FROM \"foo\"".into(),
                params: vec![],
            }
        );
    }

    #[test]
    fn select_with_equality_and_limit() {
        let query = SelectQuery::<JsonRow>::new(context(), "foo", &["id", "foo"])
            .column_types(types())
            .r#where([("id", json!(5)), ("note", json!("x"))])
            .limit(1);
        let statement = query.to_statement();
        assert_eq!(
            statement.sql,
            "SELECT \"id\", \"foo\" FROM \"foo\" WHERE \"id\" = $1::integer AND \"note\" = $2 LIMIT 1"
        );
        assert_eq!(statement.params, vec![json!(5), json!("x")]);
    }

    #[test]
    fn null_equality_renders_is_null() {
        let statement = SelectQuery::<JsonRow>::new(context(), "foo", &[])
            .r#where(Predicate::eq("bar_id", Value::Null))
            .to_statement();
        assert_eq!(statement.sql, "SELECT * FROM \"foo\" WHERE \"bar_id\" IS NULL");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn builder_callback_is_forwarded() {
        let statement = SelectQuery::<JsonRow>::new(context(), "foo", &[])
            .column_types(types())
            .r#where(Predicate::from_fn(|q| {
                q.r#where("id", Op::Gt, 10)
                    .ilike("name", "ada")
                    .where_not_null("owner")
                    .where_in("owner", ["a", "b"])
                    .where_raw(Raw::new("1 = 1"))
            }))
            .to_statement();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"foo\" WHERE \"id\" > $1::integer AND \"name\"::text ILIKE $2 \
             AND \"owner\" IS NOT NULL AND \"owner\" IN ($3::uuid, $4::uuid) AND (1 = 1)"
        );
        assert_eq!(statement.params, vec![json!(10), json!("%ada%"), json!("a"), json!("b")]);
    }

    #[test]
    fn like_patterns_match_wildcards_literally() {
        let statement = SelectQuery::<JsonRow>::new(context(), "foo", &[])
            .r#where(Predicate::from_fn(|q| q.like("name", "a_b").ilike("note", r"50%\off")))
            .to_statement();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"foo\" WHERE \"name\"::text LIKE $1 AND \"note\"::text ILIKE $2"
        );
        assert_eq!(statement.params, vec![json!(r"%a\_b%"), json!(r"%50\%\\off%")]);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let statement = SelectQuery::<JsonRow>::new(context(), "foo", &[])
            .r#where(Predicate::from_fn(|q| q.where_in("id", Vec::<i64>::new())))
            .to_statement();
        assert_eq!(statement.sql, "SELECT * FROM \"foo\" WHERE FALSE");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn insert_with_and_without_returning() {
        let record = json!({ "foo": 4, "owner": "2f1b" }).as_object().cloned().unwrap();
        let query = InsertQuery::new(context(), "foo", record).column_types(types());
        assert_eq!(query.returning_column(), None);
        assert_eq!(
            query.to_statement().sql,
            "INSERT INTO \"foo\" (\"foo\", \"owner\") VALUES ($1, $2::uuid)"
        );

        let query = query.returning("id");
        assert_eq!(query.returning_column(), Some("id"));
        let statement = query.to_statement();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"foo\" (\"foo\", \"owner\") VALUES ($1, $2::uuid) RETURNING \"id\""
        );
        assert_eq!(statement.params, vec![json!(4), json!("2f1b")]);
    }

    #[test]
    fn insert_empty_record_uses_defaults() {
        let statement = InsertQuery::new(context(), "foo", JsonRow::new()).to_statement();
        assert_eq!(statement.sql, "INSERT INTO \"foo\" DEFAULT VALUES");
    }
}

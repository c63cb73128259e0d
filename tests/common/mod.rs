#![allow(dead_code)]

use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use modelkit::{
    BaseModel, Context, Executor, Field, JsonRow, Model, Result, Statement, TimeOptions,
};

/// Records every statement and answers with canned rows.
#[derive(Default)]
pub struct RecordingExecutor {
    pub statements: Mutex<Vec<Statement>>,
    pub rows: Vec<JsonRow>,
}

impl RecordingExecutor {
    pub fn with_rows(rows: Vec<serde_json::Value>) -> Self {
        Self {
            statements: Mutex::default(),
            rows: rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
        }
    }

    pub fn recorded(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>> {
        self.statements.lock().unwrap().push(statement.clone());
        Ok(self.rows.clone())
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.statements.lock().unwrap().push(statement.clone());
        Ok(1)
    }
}

pub static BASE: LazyLock<BaseModel> =
    LazyLock::new(|| BaseModel::new(Context::new(RecordingExecutor::default())));

pub struct FooModel;
pub struct BarModel;
pub struct KitchenSinkModel;

pub static FOO: LazyLock<Model> = LazyLock::new(|| {
    BASE.model_for::<FooModel>()
        .field("id", Field::increments().not_in_new())
        .field("foo", Field::integer())
        .field(
            "bar_id",
            Field::unsigned_integer().references(|| BAR.clone(), "id"),
        )
        .build()
        .expect("foo model")
});

pub static BAR: LazyLock<Model> = LazyLock::new(|| {
    BASE.model_for::<BarModel>()
        .field("id", Field::increments().not_in_new())
        .field("name", Field::string().not_nullable())
        .build()
        .expect("bar model")
});

pub static KITCHEN_SINK: LazyLock<Model> = LazyLock::new(|| {
    BASE.model_for::<KitchenSinkModel>()
        .field("id", Field::increments().not_in_new())
        .field("nullable", Field::integer())
        .field("integer", Field::integer().not_nullable())
        .field("unsignedInteger", Field::unsigned_integer().not_nullable())
        .field("bigInteger", Field::big_integer().not_nullable())
        .field("text", Field::text().not_nullable())
        .field("string", Field::string().not_nullable())
        .field("string20", Field::string_with_length(20).not_nullable())
        .field("float", Field::float(None, None).not_nullable())
        .field("decimal", Field::decimal(None, None).not_nullable())
        .field("boolean", Field::boolean().not_nullable())
        .field("date", Field::date().not_nullable())
        .field("datetime", Field::datetime(TimeOptions::default()).not_nullable())
        .field("time", Field::time(None).not_nullable())
        .field(
            "timestamp",
            Field::timestamp(TimeOptions::default().use_tz(true)).not_nullable(),
        )
        .field(
            "enum",
            Field::r#enum(["foo", "bar", "baz", "frabnobz", "diganobz"]).not_nullable(),
        )
        .field("json", Field::json())
        .field("jsonb", Field::jsonb())
        .field("uuid", Field::uuid().not_nullable())
        .field(
            "fk",
            Field::unsigned_integer()
                .not_nullable()
                .references(|| BAR.clone(), "id"),
        )
        .build()
        .expect("kitchen sink model")
});

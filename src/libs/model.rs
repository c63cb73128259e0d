//! Table models: a table name bound to its fields and a query context.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::libs::context::Context;
use crate::libs::error::{Error, Result};
use crate::libs::field::Field;
use crate::libs::naming::{declared_name_of, derive_table_name};
use crate::libs::query_builder::{ColumnTypes, InsertQuery, Predicate, SelectQuery};
use crate::libs::schema::{self, Fields, RecordShape};

/// Shared settings for every model of an application, most notably the
/// context queries run against unless a model is rebound.
#[derive(Debug, Clone)]
pub struct BaseModel {
    context: Context,
}

impl BaseModel {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Starts a model declared as `declared_name`, e.g. `"RemoteServerModel"`.
    pub fn model(&self, declared_name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            declared_name: declared_name.into(),
            table_name: None,
            fields: Fields::new(),
            context: self.context.clone(),
        }
    }

    /// Starts a model declared by the type `M`.
    pub fn model_for<M: ?Sized>(&self) -> ModelBuilder {
        self.model(declared_name_of::<M>())
    }
}

pub struct ModelBuilder {
    declared_name: String,
    table_name: Option<String>,
    fields: Fields,
    context: Context,
}

impl ModelBuilder {
    /// Uses `name` instead of the name derived from the declaration.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Field)>,
        S: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(name, field)| (name.into(), field)));
        self
    }

    pub fn build(self) -> Result<Model> {
        let table_name = match self.table_name {
            Some(name) if name.is_empty() => {
                return Err(Error::configuration(format!(
                    "empty table name for `{}`",
                    self.declared_name
                )));
            }
            Some(name) => name,
            None => derive_table_name(&self.declared_name)?,
        };

        let column_types: IndexMap<String, String> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.kind().sql_type()))
            .collect();

        debug!(
            model = %self.declared_name,
            table = %table_name,
            fields = self.fields.len(),
            "defined model"
        );

        Ok(Model {
            meta: Arc::new(ModelMeta {
                table_name,
                fields: self.fields,
                column_types: Arc::new(column_types),
            }),
            context: self.context,
        })
    }
}

struct ModelMeta {
    table_name: String,
    fields: Fields,
    column_types: ColumnTypes,
}

/// A table's name and fields, bound to the context its queries run against.
///
/// Clones and [`Model::with_context`] copies share the same metadata.
#[derive(Clone)]
pub struct Model {
    meta: Arc<ModelMeta>,
    context: Context,
}

impl Model {
    pub fn table_name(&self) -> &str {
        &self.meta.table_name
    }

    pub fn fields(&self) -> &Fields {
        &self.meta.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.meta.fields.get(name)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// A copy of this model whose queries run against `context`.
    ///
    /// ```no_run
    /// # async fn demo(users: modelkit::Model) -> modelkit::Result<()> {
    /// let context = users.context().clone();
    /// context
    ///     .transaction(|trx| async move {
    ///         users
    ///             .with_context(trx)
    ///             .insert_one(&serde_json::json!({ "name": "Ada" }), None)?
    ///             .execute()
    ///             .await?;
    ///         Ok(())
    ///     })
    ///     .await
    /// # }
    /// ```
    pub fn with_context(&self, context: Context) -> Model {
        Model {
            meta: Arc::clone(&self.meta),
            context,
        }
    }

    /// Whether both models share the same field metadata.
    pub fn shares_metadata_with(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.meta, &other.meta)
    }

    pub fn record_shape(&self) -> RecordShape {
        RecordShape::full(self.fields())
    }

    pub fn new_record_shape(&self) -> RecordShape {
        RecordShape::new_record(self.fields())
    }

    pub fn record_schema(&self) -> Value {
        schema::record_schema(self.fields())
    }

    pub fn new_record_schema(&self) -> Value {
        schema::new_record_schema(self.fields())
    }

    /// Selects `select` (or every column) from rows matching `predicate`.
    pub fn find_where<T: DeserializeOwned>(
        &self,
        predicate: impl Into<Predicate>,
        select: Option<&[&str]>,
    ) -> SelectQuery<T> {
        let query = self
            .context
            .select_from::<T>(self.table_name(), select.unwrap_or(&[]))
            .column_types(self.meta.column_types.clone())
            .r#where(predicate);
        debug!(table = %self.table_name(), columns = ?query.columns(), "built select");
        query
    }

    /// Like [`Model::find_where`], asking for at most one row.
    pub fn find_one_where<T: DeserializeOwned>(
        &self,
        predicate: impl Into<Predicate>,
        select: Option<&[&str]>,
    ) -> SelectQuery<T> {
        self.find_where(predicate, select).limit(1)
    }

    /// Inserts a single new record.
    ///
    /// `record` must serialize to a JSON object whose keys are all columns of
    /// the new-record shape. Values are not checked against column kinds.
    pub fn insert_one<R: Serialize + ?Sized>(
        &self,
        record: &R,
        returning: Option<&str>,
    ) -> Result<InsertQuery> {
        let value = serde_json::to_value(record)?;
        let mut given = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::invalid_record(format!(
                    "a record for `{}` must be an object, got {}",
                    self.table_name(),
                    other
                )));
            }
        };

        let shape = self.new_record_shape();
        if let Some(unknown) = given.keys().find(|key| !shape.contains(key)) {
            return Err(Error::invalid_record(format!(
                "`{}` is not a column of a new `{}` record",
                unknown,
                self.table_name()
            )));
        }

        let mut ordered = serde_json::Map::with_capacity(given.len());
        for name in shape.names() {
            if let Some(value) = given.remove(name) {
                ordered.insert(name.to_string(), value);
            }
        }

        let mut query = self
            .context
            .insert_into(self.table_name(), ordered)
            .column_types(self.meta.column_types.clone());
        if let Some(column) = returning {
            query = query.returning(column);
        }
        debug!(table = %self.table_name(), returning = ?returning, "built insert");
        Ok(query)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table_name", &self.meta.table_name)
            .field("fields", &self.meta.fields)
            .field("context", &self.context)
            .finish()
    }
}

//! Column descriptors.
//!
//! A [`Field`] is created through one of the per-kind factories and then
//! refined with fluent modifiers:
//!
//! ```
//! use modelkit::Field;
//!
//! let id = Field::increments().not_in_new();
//! let name = Field::string().not_nullable().unique().comment("display name");
//! # assert!(id.is_not_nullable() && !id.in_new());
//! # assert!(name.is_unique());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::libs::model::Model;

/// A literal SQL fragment, passed through without escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw(String);

impl Raw {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeOptions {
    pub use_tz: Option<bool>,
    pub precision: Option<u32>,
}

impl TimeOptions {
    pub fn use_tz(mut self, use_tz: bool) -> Self {
        self.use_tz = Some(use_tz);
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumOptions {
    pub use_native: Option<bool>,
    pub enum_name: Option<String>,
}

impl EnumOptions {
    /// Backs the column with a named database enum type.
    pub fn native(enum_name: impl Into<String>) -> Self {
        Self {
            use_native: Some(true),
            enum_name: Some(enum_name.into()),
        }
    }
}

/// Storage kind of a column along with its kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Auto-incrementing integer identity.
    Increments,
    /// Auto-incrementing 64-bit identity, carried as a string.
    BigIncrements,
    Integer,
    /// 64-bit integer, carried as a string.
    BigInteger,
    Text,
    String {
        max_length: u32,
    },
    Float {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Boolean,
    Date,
    Datetime(TimeOptions),
    Time {
        precision: Option<u32>,
    },
    Timestamp(TimeOptions),
    Binary,
    Enum {
        values: Option<Vec<String>>,
        options: EnumOptions,
    },
    Json,
    Jsonb,
    Uuid,
}

impl ColumnKind {
    /// The PostgreSQL type a value of this kind is stored as.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnKind::Increments | ColumnKind::Integer => "integer".into(),
            ColumnKind::BigIncrements | ColumnKind::BigInteger => "bigint".into(),
            ColumnKind::Text => "text".into(),
            ColumnKind::String { max_length } => format!("varchar({max_length})"),
            ColumnKind::Float { .. } => "real".into(),
            ColumnKind::Decimal { .. } => "numeric".into(),
            ColumnKind::Boolean => "boolean".into(),
            ColumnKind::Date => "date".into(),
            ColumnKind::Datetime(opts) | ColumnKind::Timestamp(opts) => {
                if opts.use_tz.unwrap_or(false) {
                    "timestamptz".into()
                } else {
                    "timestamp".into()
                }
            }
            ColumnKind::Time { .. } => "time".into(),
            ColumnKind::Binary => "bytea".into(),
            ColumnKind::Enum { options, .. } => match (&options.use_native, &options.enum_name) {
                (Some(true), Some(name)) => format!("\"{}\"", name.replace('"', "\"\"")),
                _ => "text".into(),
            },
            ColumnKind::Json => "json".into(),
            ColumnKind::Jsonb => "jsonb".into(),
            ColumnKind::Uuid => "uuid".into(),
        }
    }

    pub fn is_auto_increment(&self) -> bool {
        matches!(self, ColumnKind::Increments | ColumnKind::BigIncrements)
    }
}

/// Column default, either a literal or a raw SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Raw(Raw),
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Integer(v.into())
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Integer(v)
    }
}

impl From<f64> for DefaultValue {
    fn from(v: f64) -> Self {
        DefaultValue::Float(v)
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::String(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::String(v)
    }
}

impl From<Raw> for DefaultValue {
    fn from(v: Raw) -> Self {
        DefaultValue::Raw(v)
    }
}

/// `ON DELETE` / `ON UPDATE` clause of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferentialAction {
    /// A plain command such as `CASCADE` or `SET NULL`.
    Command(String),
    Raw(Raw),
}

impl From<&str> for ReferentialAction {
    fn from(v: &str) -> Self {
        ReferentialAction::Command(v.to_string())
    }
}

impl From<String> for ReferentialAction {
    fn from(v: String) -> Self {
        ReferentialAction::Command(v)
    }
}

impl From<Raw> for ReferentialAction {
    fn from(v: Raw) -> Self {
        ReferentialAction::Raw(v)
    }
}

/// Deferred lookup of a referenced model.
pub type ModelLookup = Arc<dyn Fn() -> Model + Send + Sync>;

/// Reference from a column to a column of another model.
///
/// The target model is looked up only when [`ForeignKeyConstraint::model`]
/// is called, so two models may reference each other regardless of which
/// one is built first.
#[derive(Clone)]
pub struct ForeignKeyConstraint {
    lookup: ModelLookup,
    column: String,
    on_delete: Option<ReferentialAction>,
    on_update: Option<ReferentialAction>,
}

impl ForeignKeyConstraint {
    pub fn new(lookup: ModelLookup, column: impl Into<String>) -> Self {
        Self {
            lookup,
            column: column.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// Resolves the referenced model.
    pub fn model(&self) -> Model {
        (self.lookup)()
    }

    pub fn table_name(&self) -> String {
        self.model().table_name().to_string()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn on_delete(&self) -> Option<&ReferentialAction> {
        self.on_delete.as_ref()
    }

    pub fn on_update(&self) -> Option<&ReferentialAction> {
        self.on_update.as_ref()
    }
}

impl fmt::Debug for ForeignKeyConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignKeyConstraint")
            .field("column", &self.column)
            .field("on_delete", &self.on_delete)
            .field("on_update", &self.on_update)
            .finish_non_exhaustive()
    }
}

/// Describes one column of a model.
#[derive(Debug, Clone)]
pub struct Field {
    kind: ColumnKind,
    in_new: bool,
    unsigned: bool,
    comment: Option<String>,
    not_nullable: bool,
    default: Option<DefaultValue>,
    primary: bool,
    unique: bool,
    /// Name of the column before the last rename. Only meant to survive one migration.
    was_named: Option<String>,
    foreign_key: Option<ForeignKeyConstraint>,
}

impl Field {
    fn of(kind: ColumnKind) -> Self {
        let not_nullable = kind.is_auto_increment();
        Self {
            kind,
            in_new: true,
            unsigned: false,
            comment: None,
            not_nullable,
            default: None,
            primary: false,
            unique: false,
            was_named: None,
            foreign_key: None,
        }
    }

    // -------- Factories --------

    /// Auto-incrementing identity. Always not nullable.
    pub fn increments() -> Self {
        Self::of(ColumnKind::Increments)
    }

    /// 64-bit auto-incrementing identity. Always not nullable.
    pub fn big_increments() -> Self {
        Self::of(ColumnKind::BigIncrements)
    }

    pub fn integer() -> Self {
        Self::of(ColumnKind::Integer)
    }

    pub fn unsigned_integer() -> Self {
        Self::integer().unsigned()
    }

    pub fn big_integer() -> Self {
        Self::of(ColumnKind::BigInteger)
    }

    pub fn text() -> Self {
        Self::of(ColumnKind::Text)
    }

    /// `varchar(256)`.
    pub fn string() -> Self {
        Self::string_with_length(256)
    }

    pub fn string_with_length(max_length: u32) -> Self {
        Self::of(ColumnKind::String { max_length })
    }

    pub fn float(precision: impl Into<Option<u32>>, scale: impl Into<Option<u32>>) -> Self {
        Self::of(ColumnKind::Float {
            precision: precision.into(),
            scale: scale.into(),
        })
    }

    pub fn decimal(precision: impl Into<Option<u32>>, scale: impl Into<Option<u32>>) -> Self {
        Self::of(ColumnKind::Decimal {
            precision: precision.into(),
            scale: scale.into(),
        })
    }

    pub fn boolean() -> Self {
        Self::of(ColumnKind::Boolean)
    }

    pub fn date() -> Self {
        Self::of(ColumnKind::Date)
    }

    pub fn datetime(options: TimeOptions) -> Self {
        Self::of(ColumnKind::Datetime(options))
    }

    pub fn time(precision: impl Into<Option<u32>>) -> Self {
        Self::of(ColumnKind::Time {
            precision: precision.into(),
        })
    }

    pub fn timestamp(options: TimeOptions) -> Self {
        Self::of(ColumnKind::Timestamp(options))
    }

    pub fn binary() -> Self {
        Self::of(ColumnKind::Binary)
    }

    /// Enum column restricted to `values`.
    pub fn r#enum<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::enum_with(
            Some(values.into_iter().map(Into::into).collect()),
            EnumOptions::default(),
        )
    }

    pub fn enum_with(values: Option<Vec<String>>, options: EnumOptions) -> Self {
        Self::of(ColumnKind::Enum { values, options })
    }

    pub fn json() -> Self {
        Self::of(ColumnKind::Json)
    }

    pub fn jsonb() -> Self {
        Self::of(ColumnKind::Jsonb)
    }

    pub fn uuid() -> Self {
        Self::of(ColumnKind::Uuid)
    }

    // -------- Modifiers --------

    /// Sets whether the column is part of a new (not yet inserted) record.
    pub fn use_in_new(mut self, in_new: bool) -> Self {
        self.in_new = in_new;
        self
    }

    pub fn not_in_new(self) -> Self {
        self.use_in_new(false)
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Clears a comment set earlier in the chain.
    pub fn no_comment(mut self) -> Self {
        self.comment = None;
        self
    }

    pub fn not_nullable(mut self) -> Self {
        self.not_nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn was_named(mut self, old_name: impl Into<String>) -> Self {
        self.was_named = Some(old_name.into());
        self
    }

    /// References `column` of the model returned by `lookup`.
    ///
    /// ```
    /// use modelkit::Field;
    /// # use modelkit::Model;
    /// # fn bar_model() -> Model { unimplemented!() }
    ///
    /// let bar_id = Field::unsigned_integer()
    ///     .references(bar_model, "id")
    ///     .on_delete("CASCADE");
    /// # assert_eq!(bar_id.foreign_key().unwrap().column(), "id");
    /// ```
    pub fn references<F>(mut self, lookup: F, column: impl Into<String>) -> Self
    where
        F: Fn() -> Model + Send + Sync + 'static,
    {
        self.foreign_key = Some(ForeignKeyConstraint::new(Arc::new(lookup), column));
        self
    }

    /// No-op unless [`Field::references`] was called first.
    pub fn on_delete(mut self, action: impl Into<ReferentialAction>) -> Self {
        if let Some(fk) = self.foreign_key.as_mut() {
            fk.on_delete = Some(action.into());
        }
        self
    }

    /// No-op unless [`Field::references`] was called first.
    pub fn on_update(mut self, action: impl Into<ReferentialAction>) -> Self {
        if let Some(fk) = self.foreign_key.as_mut() {
            fk.on_update = Some(action.into());
        }
        self
    }

    // -------- Accessors --------

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn in_new(&self) -> bool {
        self.in_new
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn is_not_nullable(&self) -> bool {
        self.not_nullable
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn previous_name(&self) -> Option<&str> {
        self.was_named.as_deref()
    }

    pub fn foreign_key(&self) -> Option<&ForeignKeyConstraint> {
        self.foreign_key.as_ref()
    }
}

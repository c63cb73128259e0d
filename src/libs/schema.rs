//! Record shapes and JSON Schema documents derived from a model's fields.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::libs::field::{ColumnKind, Field};

/// Named columns of a model, in declaration order.
pub type Fields = IndexMap<String, Field>;

/// Value domain of one column in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    /// 64-bit integer transported as a string.
    BigInteger,
    Number,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Bytes,
    Enum(Option<Vec<String>>),
    Json,
    Uuid,
}

impl From<&ColumnKind> for ValueType {
    fn from(kind: &ColumnKind) -> Self {
        match kind {
            ColumnKind::Increments | ColumnKind::Integer => ValueType::Integer,
            ColumnKind::BigIncrements | ColumnKind::BigInteger => ValueType::BigInteger,
            ColumnKind::Float { .. } | ColumnKind::Decimal { .. } => ValueType::Number,
            ColumnKind::Text | ColumnKind::String { .. } => ValueType::String,
            ColumnKind::Boolean => ValueType::Boolean,
            ColumnKind::Date => ValueType::Date,
            ColumnKind::Datetime(_) | ColumnKind::Timestamp(_) => ValueType::DateTime,
            ColumnKind::Time { .. } => ValueType::Time,
            ColumnKind::Binary => ValueType::Bytes,
            ColumnKind::Enum { values, .. } => ValueType::Enum(values.clone()),
            ColumnKind::Json | ColumnKind::Jsonb => ValueType::Json,
            ColumnKind::Uuid => ValueType::Uuid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDomain {
    pub ty: ValueType,
    /// Whether `null` is part of the domain.
    pub nullable: bool,
}

impl From<&Field> for ValueDomain {
    fn from(field: &Field) -> Self {
        Self {
            ty: field.kind().into(),
            nullable: !field.is_not_nullable(),
        }
    }
}

/// Column name to value domain, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    columns: IndexMap<String, ValueDomain>,
}

impl RecordShape {
    /// Shape of a stored record: every field.
    pub fn full(fields: &Fields) -> Self {
        Self::collect(fields, |_| true)
    }

    /// Shape of a record about to be inserted: fields used in new records.
    pub fn new_record(fields: &Fields) -> Self {
        Self::collect(fields, Field::in_new)
    }

    fn collect(fields: &Fields, keep: impl Fn(&Field) -> bool) -> Self {
        let columns = fields
            .iter()
            .filter(|(_, field)| keep(field))
            .map(|(name, field)| (name.clone(), ValueDomain::from(field)))
            .collect();
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&ValueDomain> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueDomain)> {
        self.columns.iter().map(|(name, domain)| (name.as_str(), domain))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn kind_to_json_schema(field: &Field) -> Value {
    match field.kind() {
        ColumnKind::String { max_length } => json!({ "type": "string", "maxLength": max_length }),
        // Kept as strings so 64-bit values survive JSON number precision.
        ColumnKind::Text | ColumnKind::BigInteger | ColumnKind::BigIncrements => {
            json!({ "type": "string" })
        }
        ColumnKind::Increments => json!({ "type": "integer", "minimum": 0 }),
        ColumnKind::Integer if field.is_unsigned() => json!({ "type": "integer", "minimum": 0 }),
        ColumnKind::Integer => json!({ "type": "integer" }),
        ColumnKind::Float { .. } | ColumnKind::Decimal { .. } => json!({ "type": "number" }),
        ColumnKind::Boolean => json!({ "type": "boolean" }),
        ColumnKind::Date => json!({ "type": "string", "format": "date" }),
        ColumnKind::Datetime(_) | ColumnKind::Timestamp(_) => {
            json!({ "type": "string", "format": "date-time" })
        }
        ColumnKind::Time { .. } => json!({ "type": "string", "format": "time" }),
        ColumnKind::Binary => json!({ "type": "string" }),
        ColumnKind::Enum {
            values: Some(values),
            ..
        } => json!({ "type": "string", "enum": values }),
        ColumnKind::Enum { values: None, .. } => json!({ "type": "string" }),
        ColumnKind::Json | ColumnKind::Jsonb => json!({ "type": "object" }),
        ColumnKind::Uuid => json!({ "type": "string", "format": "uuid" }),
    }
}

/// JSON Schema fragment for a single column.
///
/// Nullable columns are wrapped as `oneOf: [fragment, {type: "null"}]`.
pub fn field_to_json_schema(field: &Field) -> Value {
    let fragment = kind_to_json_schema(field);
    if field.is_not_nullable() {
        fragment
    } else {
        json!({ "oneOf": [fragment, { "type": "null" }] })
    }
}

fn object_schema<'a>(fields: impl Iterator<Item = (&'a String, &'a Field)>) -> Value {
    let mut required = Vec::new();
    let mut properties = Map::new();
    for (name, field) in fields {
        required.push(Value::String(name.clone()));
        properties.insert(name.clone(), field_to_json_schema(field));
    }
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

/// JSON Schema of a stored record.
pub fn record_schema(fields: &Fields) -> Value {
    object_schema(fields.iter())
}

/// JSON Schema of a record about to be inserted.
pub fn new_record_schema(fields: &Fields) -> Value {
    object_schema(fields.iter().filter(|(_, field)| field.in_new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::field::{EnumOptions, TimeOptions};
    use pretty_assertions::assert_eq;

    fn every_kind() -> Vec<Field> {
        vec![
            Field::increments(),
            Field::big_increments(),
            Field::integer(),
            Field::unsigned_integer(),
            Field::big_integer(),
            Field::text(),
            Field::string(),
            Field::float(None, None),
            Field::decimal(8, 2),
            Field::boolean(),
            Field::date(),
            Field::datetime(TimeOptions::default()),
            Field::time(None),
            Field::timestamp(TimeOptions::default().use_tz(true)),
            Field::binary(),
            Field::r#enum(["a"]),
            Field::enum_with(None, EnumOptions::default()),
            Field::json(),
            Field::jsonb(),
            Field::uuid(),
        ]
    }

    fn is_null_alternative(v: &Value) -> bool {
        v == &json!({ "type": "null" })
    }

    #[test]
    fn not_nullable_fields_have_no_null_alternative() {
        for field in every_kind() {
            let schema = field_to_json_schema(&field.not_nullable());
            assert!(schema.get("oneOf").is_none(), "{schema}");
            assert_ne!(schema["type"], json!("null"));
        }
    }

    #[test]
    fn nullable_fields_have_exactly_one_null_alternative() {
        for field in every_kind().into_iter().filter(|f| !f.is_not_nullable()) {
            let expected_base = kind_to_json_schema(&field);
            let schema = field_to_json_schema(&field);
            let alternatives = schema["oneOf"].as_array().expect("oneOf array");
            assert_eq!(alternatives.len(), 2);
            assert_eq!(alternatives[0], expected_base);
            assert_eq!(alternatives.iter().filter(|v| is_null_alternative(v)).count(), 1);
        }
    }

    #[test]
    fn kind_fragments() {
        let cases = [
            (Field::string_with_length(20), json!({ "type": "string", "maxLength": 20 })),
            (Field::text(), json!({ "type": "string" })),
            (Field::big_integer(), json!({ "type": "string" })),
            (Field::big_increments(), json!({ "type": "string" })),
            (Field::increments(), json!({ "type": "integer", "minimum": 0 })),
            (Field::unsigned_integer(), json!({ "type": "integer", "minimum": 0 })),
            (Field::integer(), json!({ "type": "integer" })),
            (Field::decimal(None, None), json!({ "type": "number" })),
            (Field::date(), json!({ "type": "string", "format": "date" })),
            (
                Field::timestamp(TimeOptions::default()),
                json!({ "type": "string", "format": "date-time" }),
            ),
            (Field::time(3), json!({ "type": "string", "format": "time" })),
            (Field::binary(), json!({ "type": "string" })),
            (
                Field::r#enum(["x", "y"]),
                json!({ "type": "string", "enum": ["x", "y"] }),
            ),
            (
                Field::enum_with(None, EnumOptions::native("mood")),
                json!({ "type": "string" }),
            ),
            (Field::jsonb(), json!({ "type": "object" })),
            (Field::uuid(), json!({ "type": "string", "format": "uuid" })),
        ];
        for (field, expected) in cases {
            assert_eq!(field_to_json_schema(&field.not_nullable()), expected);
        }
    }

    #[test]
    fn descriptive_modifiers_are_not_emitted() {
        let plain = Field::integer().not_nullable();
        let decorated = Field::integer()
            .not_nullable()
            .primary()
            .unique()
            .comment("the answer")
            .default(42);
        assert_eq!(field_to_json_schema(&plain), field_to_json_schema(&decorated));
    }

    fn sample_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), Field::increments().not_in_new());
        fields.insert("foo".into(), Field::integer());
        fields.insert("name".into(), Field::string().not_nullable());
        fields
    }

    #[test]
    fn record_schema_lists_every_field_in_order() {
        let schema = record_schema(&sample_fields());
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["required"], json!(["id", "foo", "name"]));
        let keys: Vec<&String> = schema["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["id", "foo", "name"]);
    }

    #[test]
    fn new_record_schema_skips_fields_not_in_new() {
        let schema = new_record_schema(&sample_fields());
        assert_eq!(schema["required"], json!(["foo", "name"]));
        assert!(schema["properties"].get("id").is_none());
        assert_eq!(schema["properties"]["name"], json!({ "type": "string", "maxLength": 256 }));
    }

    #[test]
    fn record_shapes() {
        let fields = sample_fields();
        let full = RecordShape::full(&fields);
        assert_eq!(full.names().collect::<Vec<_>>(), ["id", "foo", "name"]);
        assert_eq!(
            full.get("foo"),
            Some(&ValueDomain {
                ty: ValueType::Integer,
                nullable: true
            })
        );
        assert!(!full.get("id").unwrap().nullable);

        let new = RecordShape::new_record(&fields);
        assert_eq!(new.len(), 2);
        assert!(!new.contains("id"));
    }
}

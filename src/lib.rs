//! Declarative table models over sqlx.
//!
//! A model is a table name plus a set of typed [`Field`]s. From that
//! description the crate derives the shape of stored and new records, JSON
//! Schema documents for both, and select/insert queries scoped to the table.
//!
//! ```
//! use modelkit::{BaseModel, Context, DbConfig, Field, Predicate};
//! # #[tokio::main]
//! # async fn main() -> modelkit::Result<()> {
//!
//! let pool = DbConfig::new("postgres://postgres@localhost/app").connect_lazy()?;
//! let base = BaseModel::new(Context::from_pool(pool));
//!
//! let servers = base
//!     .model("RemoteServerModel")
//!     .field("id", Field::increments().not_in_new())
//!     .field("host", Field::string().not_nullable())
//!     .build()?;
//!
//! assert_eq!(servers.table_name(), "remote_server");
//! assert_eq!(servers.new_record_schema()["required"], serde_json::json!(["host"]));
//!
//! let query = servers.find_one_where::<serde_json::Value>(Predicate::eq("host", "a"), Some(&["id"]));
//! assert_eq!(
//!     query.to_statement().sql,
//!     "SELECT \"id\" FROM \"remote_server\" WHERE \"host\" = $1::varchar(256) LIMIT 1"
//! );
//! # Ok(())
//! # }
//! ```

pub mod libs;

pub use libs::*;

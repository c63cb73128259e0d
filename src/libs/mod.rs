pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod model;
pub mod naming;
pub mod query_builder;
pub mod schema;

// Re-export them for easier access from the crate root
pub use config::*;
pub use context::*;
pub use error::*;
pub use field::*;
pub use model::*;
pub use naming::*;
pub use query_builder::*;
pub use schema::*;

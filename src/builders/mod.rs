//! Fluent builders for documents, schemas and connection strings

pub mod connection;
pub mod document;
pub mod schema;
pub mod update;

pub use connection::ConnectionStringBuilder;
pub use document::DocumentBuilder;
pub use schema::{SchemaBuilder, SchemaFieldBuilder};

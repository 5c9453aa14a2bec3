//! Core abstractions: models, documents, caching and expiry

pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod log;
pub mod merge;
pub mod model;
pub mod schema;

// Re-export main types for cleaner imports
pub use cache::Cache;
pub use config::{ClientOptions, StorageConfig};
pub use document::Document;
pub use engine::{EditOptions, Engine, RawRecord};
pub use error::{Error, Result};
pub use expiry::{ExpireListener, ExpiryManager};
pub use model::Model;
pub use schema::{FieldType, Schema, SchemaField, SchemaOptions, TtlField};

//! Persistence engine abstraction

use crate::core::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Key holding a record's unique id.
pub const ID_KEY: &str = "_id";
/// Key holding a record's revision counter.
pub const REVISION_KEY: &str = "__v";

/// A record as stored by an engine: `_id`, `__v` and the custom fields.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditOptions {
    /// Return the post-update record instead of the pre-update one.
    pub new: bool,
}

impl EditOptions {
    pub fn returning_new() -> Self {
        EditOptions { new: true }
    }
}

/// One collection of a document store.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn create(&self, record: RawRecord) -> Result<RawRecord>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RawRecord>>;

    async fn find_one(&self, query: &RawRecord) -> Result<Option<RawRecord>>;

    async fn find(&self, query: &RawRecord) -> Result<Vec<RawRecord>>;

    async fn find_by_id_and_update(
        &self,
        id: &str,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>>;

    async fn find_one_and_update(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>>;

    async fn update_many(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Vec<RawRecord>>;

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<RawRecord>>;

    async fn find_one_and_delete(&self, query: &RawRecord) -> Result<Option<RawRecord>>;

    async fn delete_many(&self, query: &RawRecord) -> Result<Vec<RawRecord>>;
}

//! Collection façade binding an engine to a document cache and an expiry manager.

use crate::core::cache::Cache;
use crate::core::document::Document;
use crate::core::engine::{EditOptions, Engine, ID_KEY, RawRecord, REVISION_KEY};
use crate::core::error::{Error, Result};
use crate::core::expiry::ExpiryManager;
use crate::core::merge::deep_merge;
use crate::core::schema::{Schema, TtlField};
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub(crate) struct ModelInner {
    name: String,
    engine: Arc<dyn Engine>,
    make_cache: bool,
    cache: Arc<Cache<String, Document>>,
    ttl_field: Option<TtlField>,
    expiry: ExpiryManager,
}

/// How a change affects the TTL-bearing field.
enum TtlChange {
    Set,
    Unset,
}

/// CRUD access to one collection.
///
/// When caching is enabled every document returned by `create`, `get`, `find`
/// and `find_many` lands in the cache. `edit`, `find_and_edit` and `edit_many`
/// only update the cache when [`EditOptions::new`] is set, so a pre-update
/// snapshot never overwrites a cached entry. Deletes evict the affected ids.
///
/// Cloning is cheap; clones share the same cache and expiry manager.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Must be called inside a Tokio runtime when the schema has a TTL field,
    /// otherwise the expiry clock is not started.
    pub fn new(
        name: impl Into<String>,
        engine: Arc<dyn Engine>,
        schema: &Schema,
        make_cache: bool,
    ) -> Self {
        let cache = Arc::new(Cache::new());
        let ttl_field = schema.ttl_field();
        let expiry = ExpiryManager::new(Arc::clone(&cache), ttl_field.as_ref().map(|t| t.seconds));

        Model {
            inner: Arc::new(ModelInner {
                name: name.into(),
                engine,
                make_cache,
                cache,
                ttl_field,
                expiry,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ModelInner>) -> Self {
        Model { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn make_cache(&self) -> bool {
        self.inner.make_cache
    }

    /// TTL of the schema's TTL field, in seconds.
    pub fn ttl(&self) -> Option<u64> {
        self.inner.ttl_field.as_ref().map(|t| t.seconds)
    }

    pub fn ttl_field(&self) -> Option<&TtlField> {
        self.inner.ttl_field.as_ref()
    }

    pub fn cache(&self) -> &Cache<String, Document> {
        &self.inner.cache
    }

    pub fn expiry(&self) -> &ExpiryManager {
        &self.inner.expiry
    }

    pub fn on_expire<F>(&self, listener: F)
    where
        F: Fn(&str, Option<&Document>) + Send + Sync + 'static,
    {
        self.inner.expiry.on_expire(listener);
    }

    /// Stops the expiry clock. Idempotent.
    pub fn destroy(&self) {
        self.inner.expiry.destroy();
    }

    /// Inserts a new document. `data` is a field mapping, optionally carrying an
    /// `_id`; a random id is assigned otherwise.
    #[instrument(name = "ModelCreate", skip_all, fields(collection = %self.inner.name))]
    pub async fn create(&self, data: impl Into<Value> + Send) -> Result<Document> {
        let mut record = require_object(data.into(), "document")?;
        record.remove(REVISION_KEY);
        let id = match record.get(ID_KEY) {
            None | Some(Value::Null) => {
                let id = Uuid::new_v4().simple().to_string();
                record.insert(ID_KEY.to_string(), Value::String(id.clone()));
                id
            }
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(_) => return Err(Error::invalid(ID_KEY, "a non-empty string")),
        };

        // Optimistic insert, undone below if the write fails.
        let previous = if self.inner.make_cache {
            let mut optimistic = record.clone();
            optimistic.insert(REVISION_KEY.to_string(), Value::from(0));
            let document = self.wrap(optimistic)?;
            Some(self.inner.cache.put(id.clone(), document).await)
        } else {
            None
        };

        let created = match self.inner.engine.create(record).await {
            Ok(raw) => self.wrap(raw),
            Err(err) => Err(err),
        };
        let document = match created {
            Ok(document) => document,
            Err(err) => {
                match previous {
                    Some(Some(previous)) => {
                        self.inner.cache.put(id, previous).await;
                    }
                    Some(None) => {
                        self.inner.cache.remove(&id).await;
                    }
                    None => {}
                }
                debug!(error = %err, "Create failed, optimistic cache entry rolled back");
                return Err(err);
            }
        };

        self.remember(&document).await;
        if self.carries_ttl(&document) {
            self.inner.expiry.register(document.id()).await;
        }
        Ok(document)
    }

    pub async fn get_all(&self) -> Result<Vec<Document>> {
        self.find_many(Value::Object(RawRecord::new())).await
    }

    #[instrument(name = "ModelGet", skip(self), fields(collection = %self.inner.name))]
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        require_id(id)?;
        let raw = self.inner.engine.find_by_id(id).await?;
        self.resolve(raw).await
    }

    #[instrument(name = "ModelFind", skip_all, fields(collection = %self.inner.name))]
    pub async fn find(&self, query: Value) -> Result<Option<Document>> {
        let query = require_object(query, "query")?;
        let raw = self.inner.engine.find_one(&query).await?;
        self.resolve(raw).await
    }

    /// Documents matching `query`, in engine order.
    #[instrument(name = "ModelFindMany", skip_all, fields(collection = %self.inner.name))]
    pub async fn find_many(&self, query: Value) -> Result<Vec<Document>> {
        let query = require_object(query, "query")?;
        let raws = self.inner.engine.find(&query).await?;
        let documents = self.wrap_all(raws)?;
        for document in &documents {
            self.remember(document).await;
        }
        Ok(documents)
    }

    /// Applies `change` to the document with `id`. Returns the pre-update
    /// document, or the post-update one when `options.new` is set.
    #[instrument(name = "ModelEdit", skip(self, change), fields(collection = %self.inner.name))]
    pub async fn edit(
        &self,
        id: &str,
        change: Value,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        require_id(id)?;
        let change = require_object(change, "change")?;
        let raw = self
            .inner
            .engine
            .find_by_id_and_update(id, &change, options)
            .await?;
        self.resolve_edit(raw, &change, options).await
    }

    #[instrument(name = "ModelFindAndEdit", skip_all, fields(collection = %self.inner.name))]
    pub async fn find_and_edit(
        &self,
        query: Value,
        change: Value,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        let query = require_object(query, "query")?;
        let change = require_object(change, "change")?;
        let raw = self
            .inner
            .engine
            .find_one_and_update(&query, &change, options)
            .await?;
        self.resolve_edit(raw, &change, options).await
    }

    #[instrument(name = "ModelEditMany", skip_all, fields(collection = %self.inner.name))]
    pub async fn edit_many(
        &self,
        query: Value,
        change: Value,
        options: EditOptions,
    ) -> Result<Vec<Document>> {
        let query = require_object(query, "query")?;
        let change = require_object(change, "change")?;
        let raws = self
            .inner
            .engine
            .update_many(&query, &change, options)
            .await?;
        let documents = self.wrap_all(raws)?;
        for document in &documents {
            self.after_edit(document, &change, options).await;
        }
        Ok(documents)
    }

    #[instrument(name = "ModelDelete", skip(self), fields(collection = %self.inner.name))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        require_id(id)?;
        if let Some(raw) = self.inner.engine.find_by_id_and_delete(id).await? {
            self.forget(&self.wrap(raw)?).await;
        }
        Ok(())
    }

    #[instrument(name = "ModelFindAndDelete", skip_all, fields(collection = %self.inner.name))]
    pub async fn find_and_delete(&self, query: Value) -> Result<()> {
        let query = require_object(query, "query")?;
        if let Some(raw) = self.inner.engine.find_one_and_delete(&query).await? {
            self.forget(&self.wrap(raw)?).await;
        }
        Ok(())
    }

    #[instrument(name = "ModelDeleteMany", skip_all, fields(collection = %self.inner.name))]
    pub async fn delete_many(&self, query: Value) -> Result<()> {
        let query = require_object(query, "query")?;
        let raws = self.inner.engine.delete_many(&query).await?;
        for document in self.wrap_all(raws)? {
            self.forget(&document).await;
        }
        Ok(())
    }

    /// Like [`Model::edit`], but nested objects in `change` are merged into the
    /// current values instead of replacing them. Costs an extra read.
    ///
    /// The cache always ends up holding the post-update document, whatever
    /// `options.new` asks to be returned.
    pub async fn update(
        &self,
        id: &str,
        change: Value,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        require_id(id)?;
        let change = require_patch(change)?;
        let Some(raw) = self.inner.engine.find_by_id(id).await? else {
            return Ok(None);
        };
        self.merge_into(self.wrap(raw)?, &change, options).await
    }

    pub async fn find_and_update(
        &self,
        query: Value,
        change: Value,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        let query = require_object(query, "query")?;
        let change = require_patch(change)?;
        let Some(raw) = self.inner.engine.find_one(&query).await? else {
            return Ok(None);
        };
        self.merge_into(self.wrap(raw)?, &change, options).await
    }

    /// Merges `change` into every document matching `query` and returns all of
    /// the edited documents.
    pub async fn update_many(
        &self,
        query: Value,
        change: Value,
        options: EditOptions,
    ) -> Result<Vec<Document>> {
        let query = require_object(query, "query")?;
        let change = require_patch(change)?;
        let current = self.wrap_all(self.inner.engine.find(&query).await?)?;
        let edits = current
            .into_iter()
            .map(|document| self.merge_into(document, &change, options));
        Ok(try_join_all(edits).await?.into_iter().flatten().collect())
    }

    // Caches the post-update record regardless of `options.new`.
    async fn merge_into(
        &self,
        current: Document,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        let merged = merged_change(&current, change);
        let raw = self
            .inner
            .engine
            .find_by_id_and_update(current.id(), &merged, EditOptions::returning_new())
            .await?;
        let Some(updated) = self
            .resolve_edit(raw, &merged, EditOptions::returning_new())
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(if options.new { updated } else { current }))
    }

    fn wrap(&self, raw: RawRecord) -> Result<Document> {
        Ok(Document::from_raw(raw)?.attach(&self.inner))
    }

    fn wrap_all(&self, raws: Vec<RawRecord>) -> Result<Vec<Document>> {
        raws.into_iter().map(|raw| self.wrap(raw)).collect()
    }

    async fn resolve(&self, raw: Option<RawRecord>) -> Result<Option<Document>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let document = self.wrap(raw)?;
        self.remember(&document).await;
        Ok(Some(document))
    }

    async fn resolve_edit(
        &self,
        raw: Option<RawRecord>,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<Document>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let document = self.wrap(raw)?;
        self.after_edit(&document, change, options).await;
        Ok(Some(document))
    }

    async fn after_edit(&self, document: &Document, change: &RawRecord, options: EditOptions) {
        if options.new {
            self.remember(document).await;
        }
        let Some(ttl) = &self.inner.ttl_field else {
            return;
        };
        match ttl_change(change, &ttl.name) {
            Some(TtlChange::Set) => self.inner.expiry.refresh(document.id()).await,
            Some(TtlChange::Unset) => {
                self.inner.expiry.remove(document.id()).await;
            }
            None => {}
        }
    }

    async fn remember(&self, document: &Document) {
        if self.inner.make_cache {
            self.inner
                .cache
                .put(document.id().to_string(), document.clone())
                .await;
        }
    }

    async fn forget(&self, document: &Document) {
        self.inner.cache.remove(&document.id().to_string()).await;
        self.inner.expiry.remove(document.id()).await;
    }

    fn carries_ttl(&self, document: &Document) -> bool {
        self.inner
            .ttl_field
            .as_ref()
            .and_then(|ttl| document.field(&ttl.name))
            .is_some_and(|value| !value.is_null())
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::invalid("id", "a non-empty string"));
    }
    Ok(())
}

fn require_object(value: Value, name: &'static str) -> Result<RawRecord> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::invalid(name, "a field mapping")),
    }
}

/// A change for the merging updates: a field mapping without operators.
fn require_patch(change: Value) -> Result<RawRecord> {
    let change = require_object(change, "change")?;
    if change.keys().any(|key| key.starts_with('$')) {
        return Err(Error::invalid(
            "change",
            "a field mapping without update operators",
        ));
    }
    Ok(change)
}

/// For every top-level key of `change`, the current value with `change` merged in.
fn merged_change(current: &Document, change: &RawRecord) -> RawRecord {
    change
        .iter()
        .map(|(key, patch)| {
            let mut value = current.field(key).cloned().unwrap_or(Value::Null);
            deep_merge(&mut value, patch);
            (key.clone(), value)
        })
        .collect()
}

fn ttl_change(change: &RawRecord, field: &str) -> Option<TtlChange> {
    let assigned = change.get(field).or_else(|| {
        change
            .get("$set")
            .and_then(Value::as_object)
            .and_then(|set| set.get(field))
    });
    if let Some(value) = assigned {
        return Some(if value.is_null() {
            TtlChange::Unset
        } else {
            TtlChange::Set
        });
    }
    let touched = |op: &str| {
        change
            .get(op)
            .and_then(Value::as_object)
            .is_some_and(|fields| fields.contains_key(field))
    };
    if touched("$unset") {
        return Some(TtlChange::Unset);
    }
    // Epoch-millis DATE values can be pushed forward with $inc
    (touched("$inc") || touched("$push")).then_some(TtlChange::Set)
}

use crate::core::engine::{EditOptions, Engine, RawRecord};
use crate::core::error::{Error, Result};
use crate::core::schema::Schema;
use crate::store::ops::{has_id, matches, new_record, record_id, updated_record};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection keeping records in insertion order.
pub struct MemoryEngine {
    schema: Schema,
    records: Arc<Mutex<Vec<RawRecord>>>,
}

impl MemoryEngine {
    /// Creates a new empty collection enforcing `schema`
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Replaces the record at `index`, returning the pre- or post-update record.
    fn update_at(
        &self,
        records: &mut [RawRecord],
        index: usize,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<RawRecord> {
        let next = updated_record(&self.schema, &records[index], change)?;
        let previous = std::mem::replace(&mut records[index], next);
        Ok(if options.new {
            records[index].clone()
        } else {
            previous
        })
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn create(&self, record: RawRecord) -> Result<RawRecord> {
        let record = new_record(&self.schema, record)?;
        let id = record_id(&record)?;

        let mut records = self.records.lock().await;
        if records.iter().any(|r| has_id(r, id)) {
            return Err(Error::Engine(format!("duplicate key: _id '{id}'")));
        }
        records.push(record.clone());
        debug!("Engine CREATE for id: {}", id);
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RawRecord>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| has_id(r, id)).cloned())
    }

    async fn find_one(&self, query: &RawRecord) -> Result<Option<RawRecord>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| matches(r, query)).cloned())
    }

    async fn find(&self, query: &RawRecord) -> Result<Vec<RawRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| matches(r, query))
            .cloned()
            .collect())
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>> {
        let mut records = self.records.lock().await;
        let Some(index) = records.iter().position(|r| has_id(r, id)) else {
            return Ok(None);
        };
        self.update_at(&mut records, index, change, options).map(Some)
    }

    async fn find_one_and_update(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>> {
        let mut records = self.records.lock().await;
        let Some(index) = records.iter().position(|r| matches(r, query)) else {
            return Ok(None);
        };
        self.update_at(&mut records, index, change, options).map(Some)
    }

    async fn update_many(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Vec<RawRecord>> {
        let mut records = self.records.lock().await;
        // Every update is computed before any is stored, so a rejected change
        // leaves the collection untouched.
        let updates = records
            .iter()
            .enumerate()
            .filter(|(_, r)| matches(r, query))
            .map(|(index, r)| Ok((index, updated_record(&self.schema, r, change)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(updates
            .into_iter()
            .map(|(index, next)| {
                let previous = std::mem::replace(&mut records[index], next);
                if options.new {
                    records[index].clone()
                } else {
                    previous
                }
            })
            .collect())
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<RawRecord>> {
        let mut records = self.records.lock().await;
        Ok(records
            .iter()
            .position(|r| has_id(r, id))
            .map(|index| records.remove(index)))
    }

    async fn find_one_and_delete(&self, query: &RawRecord) -> Result<Option<RawRecord>> {
        let mut records = self.records.lock().await;
        Ok(records
            .iter()
            .position(|r| matches(r, query))
            .map(|index| records.remove(index)))
    }

    async fn delete_many(&self, query: &RawRecord) -> Result<Vec<RawRecord>> {
        let mut records = self.records.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *records)
            .into_iter()
            .partition(|r| matches(r, query));
        *records = kept;
        Ok(removed)
    }
}

use crate::core::engine::{EditOptions, Engine, RawRecord};
use crate::core::error::{Error, Result};
use crate::core::schema::Schema;
use crate::store::ops::{matches, new_record, record_id, updated_record};
use async_trait::async_trait;
use fjall::PartitionHandle;
use tokio::sync::Mutex;
use tracing::debug;

/// A collection persisted in one fjall partition. Records are stored as JSON
/// keyed by their id, so scans come back in id order.
pub struct DiskEngine {
    schema: Schema,
    partition: PartitionHandle,
    // Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl DiskEngine {
    pub fn new(schema: Schema, partition: PartitionHandle) -> Self {
        Self {
            schema,
            partition,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self, id: &str) -> Result<Option<RawRecord>> {
        match self.partition.get(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store(&self, record: &RawRecord) -> Result<()> {
        let id = record_id(record)?;
        self.partition.insert(id, serde_json::to_vec(record)?)?;
        debug!("Engine PUT for id: {}", id);
        Ok(())
    }

    fn erase(&self, record: &RawRecord) -> Result<()> {
        let id = record_id(record)?;
        self.partition.remove(id)?;
        debug!("Engine REMOVE for id: {}", id);
        Ok(())
    }

    fn scan(&self, query: &RawRecord, limit: Option<usize>) -> Result<Vec<RawRecord>> {
        let mut found = Vec::new();
        for entry in self.partition.iter() {
            let (_, bytes) = entry?;
            let record: RawRecord = serde_json::from_slice(&bytes)?;
            if matches(&record, query) {
                found.push(record);
                if limit.is_some_and(|limit| found.len() >= limit) {
                    break;
                }
            }
        }
        Ok(found)
    }

    fn first(&self, query: &RawRecord) -> Result<Option<RawRecord>> {
        Ok(self.scan(query, Some(1))?.pop())
    }

    fn update(
        &self,
        current: RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<RawRecord> {
        let next = updated_record(&self.schema, &current, change)?;
        self.store(&next)?;
        Ok(if options.new { next } else { current })
    }
}

#[async_trait]
impl Engine for DiskEngine {
    async fn create(&self, record: RawRecord) -> Result<RawRecord> {
        let record = new_record(&self.schema, record)?;
        let id = record_id(&record)?;

        let _guard = self.write_lock.lock().await;
        if self.partition.contains_key(id)? {
            return Err(Error::Engine(format!("duplicate key: _id '{id}'")));
        }
        self.store(&record)?;
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RawRecord>> {
        self.load(id)
    }

    async fn find_one(&self, query: &RawRecord) -> Result<Option<RawRecord>> {
        self.first(query)
    }

    async fn find(&self, query: &RawRecord) -> Result<Vec<RawRecord>> {
        self.scan(query, None)
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        self.load(id)?
            .map(|current| self.update(current, change, options))
            .transpose()
    }

    async fn find_one_and_update(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Option<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        self.first(query)?
            .map(|current| self.update(current, change, options))
            .transpose()
    }

    async fn update_many(
        &self,
        query: &RawRecord,
        change: &RawRecord,
        options: EditOptions,
    ) -> Result<Vec<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        let updates = self
            .scan(query, None)?
            .into_iter()
            .map(|current| {
                let next = updated_record(&self.schema, &current, change)?;
                Ok((current, next))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(updates.len());
        for (current, next) in updates {
            self.store(&next)?;
            results.push(if options.new { next } else { current });
        }
        Ok(results)
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        let found = self.load(id)?;
        if let Some(record) = &found {
            self.erase(record)?;
        }
        Ok(found)
    }

    async fn find_one_and_delete(&self, query: &RawRecord) -> Result<Option<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        let found = self.first(query)?;
        if let Some(record) = &found {
            self.erase(record)?;
        }
        Ok(found)
    }

    async fn delete_many(&self, query: &RawRecord) -> Result<Vec<RawRecord>> {
        let _guard = self.write_lock.lock().await;
        let removed = self.scan(query, None)?;
        for record in &removed {
            self.erase(record)?;
        }
        Ok(removed)
    }
}

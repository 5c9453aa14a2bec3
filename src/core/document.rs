//! The in-memory representation of one persisted record.

use crate::builders::document::DocumentBuilder;
use crate::core::engine::{ID_KEY, RawRecord, REVISION_KEY};
use crate::core::error::{Error, Result};
use crate::core::model::{Model, ModelInner};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

/// A record of a collection: an immutable id, the engine-assigned revision and
/// the custom fields declared by the schema.
///
/// Custom fields are only reachable through [`Document::field`] and
/// [`Document::fields`], so they can never shadow `id` or `revision`.
#[derive(Clone)]
pub struct Document {
    id: String,
    revision: u64,
    fields: RawRecord,
    model: Weak<ModelInner>,
}

impl Document {
    /// Builds a detached document from a raw engine record.
    pub fn from_raw(mut raw: RawRecord) -> Result<Self> {
        let id = match raw.remove(ID_KEY) {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => {
                return Err(Error::Engine(format!(
                    "record is missing a string '{ID_KEY}'"
                )));
            }
        };
        let revision = match raw.remove(REVISION_KEY) {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_u64().ok_or_else(|| {
                Error::Engine(format!("record '{id}' has a non-numeric '{REVISION_KEY}'"))
            })?,
        };

        Ok(Document {
            id,
            revision,
            fields: raw,
            model: Weak::new(),
        })
    }

    pub(crate) fn attach(mut self, model: &Arc<ModelInner>) -> Self {
        self.model = Arc::downgrade(model);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn fields(&self) -> &RawRecord {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// `{ _id, __v, ...fields }`
    pub fn to_json(&self) -> Value {
        let mut json = RawRecord::new();
        json.insert(ID_KEY.to_string(), Value::String(self.id.clone()));
        json.insert(REVISION_KEY.to_string(), Value::from(self.revision));
        json.extend(self.fields.clone());
        Value::Object(json)
    }

    /// Projects the document onto a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    pub async fn delete(&self) -> Result<()> {
        self.model()?.delete(&self.id).await
    }

    /// Inserts a field-identical copy of this document under `id`.
    pub async fn insert_copy(&self, id: &str) -> Result<Document> {
        if id.is_empty() {
            return Err(Error::invalid("id", "a non-empty string"));
        }
        if id == self.id {
            return Err(Error::DuplicateId(id.to_string()));
        }
        let model = self.model()?;
        model
            .create(DocumentBuilder::from(self).set_id(id))
            .await
    }

    fn model(&self) -> Result<Model> {
        self.model
            .upgrade()
            .map(Model::from_inner)
            .ok_or(Error::Detached)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.revision == other.revision && self.fields == other.fields
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("revision", &self.revision)
            .field("fields", &self.fields)
            .finish()
    }
}

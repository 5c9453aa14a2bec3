use crate::core::document::Document;
use crate::core::engine::{ID_KEY, RawRecord};
use serde_json::Value;

/// Builds record data accepted by [`crate::Model::create`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentBuilder {
    pub id: Option<String>,
    pub fields: RawRecord,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn add_fields<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(name, value)| (name.into(), value)));
        self
    }

    /// `{ _id, ...fields }`; `_id` is omitted when unset.
    pub fn to_json(&self) -> Value {
        let mut json = RawRecord::new();
        if let Some(id) = &self.id {
            json.insert(ID_KEY.to_string(), Value::String(id.clone()));
        }
        json.extend(self.fields.clone());
        Value::Object(json)
    }
}

impl From<&Document> for DocumentBuilder {
    fn from(document: &Document) -> Self {
        DocumentBuilder {
            id: Some(document.id().to_string()),
            fields: document.fields().clone(),
        }
    }
}

impl From<DocumentBuilder> for Value {
    fn from(builder: DocumentBuilder) -> Self {
        builder.to_json()
    }
}

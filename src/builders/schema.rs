use crate::core::error::{Error, Result};
use crate::core::schema::{FieldType, Schema, SchemaField, SchemaOptions};
use serde_json::{Map, Value, json};

/// Builds one field of a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaFieldBuilder {
    pub name: Option<String>,
    pub field_type: Option<FieldType>,
    pub required: bool,
    pub default: Option<Value>,
    pub ttl: Option<u64>,
}

impl SchemaFieldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn set_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks this field as the TTL field, expiring after `seconds`.
    pub fn set_ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "type": self.field_type.map(|t| t.to_string()),
            "required": self.required,
            "default": self.default,
            "ttl": self.ttl,
        })
    }

    pub fn build(&self) -> Result<SchemaField> {
        let name = self
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::invalid("field name", "a non-empty string"))?;
        Ok(SchemaField {
            name,
            field_type: self.field_type.unwrap_or_default(),
            required: self.required,
            default: self.default.clone(),
            ttl: self.ttl,
        })
    }
}

/// Builds a [`Schema`] field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaBuilder {
    pub fields: Vec<SchemaFieldBuilder>,
    pub options: SchemaOptions,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field<F>(mut self, input: F) -> Self
    where
        F: FnOnce(SchemaFieldBuilder) -> SchemaFieldBuilder,
    {
        self.fields.push(input(SchemaFieldBuilder::new()));
        self
    }

    pub fn set_options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    /// `{ fields: { <name>: { type, required, default, ttl } }, options }`
    pub fn to_json(&self) -> Value {
        let fields = self
            .fields
            .iter()
            .filter_map(|field| {
                let Value::Object(mut json) = field.to_json() else {
                    return None;
                };
                let name = json.remove("name")?.as_str()?.to_string();
                Some((name, Value::Object(json)))
            })
            .collect::<Map<String, Value>>();

        json!({
            "fields": fields,
            "options": { "strict": self.options.strict },
        })
    }

    pub fn to_schema(&self) -> Result<Schema> {
        let fields = self
            .fields
            .iter()
            .map(SchemaFieldBuilder::build)
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(fields, self.options.clone()))
    }
}

impl TryFrom<SchemaBuilder> for Schema {
    type Error = Error;

    fn try_from(builder: SchemaBuilder) -> Result<Self> {
        builder.to_schema()
    }
}

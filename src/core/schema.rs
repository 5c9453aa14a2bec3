//! Schema descriptors consumed by models and engines.

use crate::core::engine::{ID_KEY, RawRecord, REVISION_KEY};
use crate::core::error::{Error, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Number,
    Date,
    Buffer,
    Boolean,
    #[default]
    Mixed,
    ObjectId,
    Array,
    Decimal128,
    Map,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FieldType::String => "STRING",
                FieldType::Number => "NUMBER",
                FieldType::Date => "DATE",
                FieldType::Buffer => "BUFFER",
                FieldType::Boolean => "BOOLEAN",
                FieldType::Mixed => "MIXED",
                FieldType::ObjectId => "OBJECTID",
                FieldType::Array => "ARRAY",
                FieldType::Decimal128 => "DECIMAL128",
                FieldType::Map => "MAP",
            }
        )
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "STRING" => Ok(FieldType::String),
            "NUMBER" => Ok(FieldType::Number),
            "DATE" => Ok(FieldType::Date),
            "BUFFER" => Ok(FieldType::Buffer),
            "BOOLEAN" => Ok(FieldType::Boolean),
            "MIXED" => Ok(FieldType::Mixed),
            "OBJECTID" => Ok(FieldType::ObjectId),
            "ARRAY" => Ok(FieldType::Array),
            "DECIMAL128" => Ok(FieldType::Decimal128),
            "MAP" => Ok(FieldType::Map),
            _ => Err(Error::invalid("field type", "a known field type")),
        }
    }
}

impl FieldType {
    /// Whether `value` can be stored in a field of this type. `null` is always
    /// accepted; presence is checked separately through `required`.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::String | FieldType::ObjectId => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Date => match value {
                Value::Number(_) => true,
                Value::String(s) => DateTime::parse_from_rfc3339(s).is_ok(),
                _ => false,
            },
            FieldType::Buffer => match value {
                Value::String(_) => true,
                Value::Array(items) => items
                    .iter()
                    .all(|b| b.as_u64().is_some_and(|b| b <= u64::from(u8::MAX))),
                _ => false,
            },
            FieldType::Boolean => value.is_boolean(),
            FieldType::Mixed => true,
            FieldType::Array => value.is_array(),
            FieldType::Decimal128 => match value {
                Value::Number(_) => true,
                Value::String(s) => s.parse::<f64>().is_ok(),
                _ => false,
            },
            FieldType::Map => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Seconds after which documents carrying this field are considered expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Drop fields the schema does not declare.
    pub strict: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        SchemaOptions { strict: true }
    }
}

/// The TTL-bearing field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlField {
    pub name: String,
    pub seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
    #[serde(default)]
    pub options: SchemaOptions,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>, options: SchemaOptions) -> Self {
        Schema { fields, options }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The first field with a positive `ttl`. A `ttl` of 0 never expires.
    pub fn ttl_field(&self) -> Option<TtlField> {
        self.fields.iter().find_map(|f| {
            f.ttl.filter(|seconds| *seconds > 0).map(|seconds| TtlField {
                name: f.name.clone(),
                seconds,
            })
        })
    }

    /// Fills defaults for absent fields and, in strict mode, drops undeclared ones.
    pub fn prepare(&self, record: &mut RawRecord) {
        for field in &self.fields {
            let Some(default) = &field.default else {
                continue;
            };
            if record.get(&field.name).is_none_or(Value::is_null) {
                record.insert(field.name.clone(), default.clone());
            }
        }
        if self.options.strict {
            record.retain(|key, _| {
                key == ID_KEY || key == REVISION_KEY || self.field(key).is_some()
            });
        }
    }

    pub fn validate(&self, record: &RawRecord) -> Result<()> {
        for field in &self.fields {
            match record.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(Error::Validation(format!(
                        "\"{}\" is required",
                        field.name
                    )));
                }
                Some(value) if !field.field_type.accepts(value) => {
                    return Err(Error::Validation(format!(
                        "\"{}\" must be of type {}",
                        field.name, field.field_type
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

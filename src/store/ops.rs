//! Record-level semantics shared by the bundled engines: query matching,
//! update operators, schema enforcement and revision bookkeeping.

use crate::core::engine::{ID_KEY, RawRecord, REVISION_KEY};
use crate::core::error::{Error, Result};
use crate::core::schema::Schema;
use serde_json::{Number, Value};
use uuid::Uuid;

pub fn get_path<'a>(record: &'a RawRecord, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn get_path_mut<'a>(record: &'a mut RawRecord, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = record.get_mut(segments.next()?)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

fn set_path(record: &mut RawRecord, path: &str, value: Value) -> Result<()> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut current = record;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let entry = current
            .entry(segment)
            .or_insert_with(|| Value::Object(RawRecord::new()));
        if entry.is_null() {
            *entry = Value::Object(RawRecord::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(Error::Validation(format!(
                    "cannot set '{path}': '{segment}' is not an object"
                )));
            }
        };
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

fn unset_path(record: &mut RawRecord, path: &str) {
    match path.rsplit_once('.') {
        Some((parents, leaf)) => {
            if let Some(Value::Object(parent)) = get_path_mut(record, parents) {
                parent.remove(leaf);
            }
        }
        None => {
            record.remove(path);
        }
    }
}

pub fn has_id(record: &RawRecord, id: &str) -> bool {
    record.get(ID_KEY).and_then(Value::as_str) == Some(id)
}

pub fn record_id(record: &RawRecord) -> Result<&str> {
    record
        .get(ID_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Engine(format!("record is missing a string '{ID_KEY}'")))
}

/// Every key of `query` must match. Dotted keys address nested objects and a
/// scalar matches an array that contains it.
pub fn matches(record: &RawRecord, query: &RawRecord) -> bool {
    query
        .iter()
        .all(|(path, expected)| match get_path(record, path) {
            Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
}

fn add(current: &Value, amount: &Value) -> Option<Value> {
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        return a.checked_add(b).map(Value::from);
    }
    let sum = current.as_f64()? + amount.as_f64()?;
    Number::from_f64(sum).map(Value::Number)
}

fn operands<'a>(operator: &str, value: &'a Value) -> Result<&'a RawRecord> {
    value
        .as_object()
        .ok_or_else(|| Error::Validation(format!("'{operator}' expects a field mapping")))
}

fn guard_id(record: &RawRecord, path: &str, value: Option<&Value>) -> Result<bool> {
    if path != ID_KEY {
        return Ok(true);
    }
    if value.is_some_and(|v| record.get(ID_KEY) == Some(v)) {
        return Ok(false);
    }
    Err(Error::Engine(format!("field '{ID_KEY}' is immutable")))
}

/// Applies `change` in place. Plain keys replace fields; `$set`, `$unset`,
/// `$inc`, `$push` and `$pull` are understood.
pub fn apply_change(record: &mut RawRecord, change: &RawRecord) -> Result<()> {
    for (key, value) in change {
        match key.as_str() {
            REVISION_KEY => {}
            "$set" => {
                for (path, value) in operands(key, value)? {
                    if guard_id(record, path, Some(value))? {
                        set_path(record, path, value.clone())?;
                    }
                }
            }
            "$unset" => {
                for path in operands(key, value)?.keys() {
                    if guard_id(record, path, None)? {
                        unset_path(record, path);
                    }
                }
            }
            "$inc" => {
                for (path, amount) in operands(key, value)? {
                    guard_id(record, path, None)?;
                    let current = get_path(record, path)
                        .filter(|v| !v.is_null())
                        .cloned()
                        .unwrap_or(Value::from(0));
                    let sum = add(&current, amount).ok_or_else(|| {
                        Error::Validation(format!("cannot increment non-numeric field '{path}'"))
                    })?;
                    set_path(record, path, sum)?;
                }
            }
            "$push" => {
                for (path, item) in operands(key, value)? {
                    guard_id(record, path, None)?;
                    match get_path_mut(record, path) {
                        Some(Value::Array(items)) => items.push(item.clone()),
                        Some(Value::Null) | None => {
                            set_path(record, path, Value::Array(vec![item.clone()]))?
                        }
                        Some(_) => {
                            return Err(Error::Validation(format!(
                                "cannot push onto non-array field '{path}'"
                            )));
                        }
                    }
                }
            }
            "$pull" => {
                for (path, item) in operands(key, value)? {
                    if let Some(Value::Array(items)) = get_path_mut(record, path) {
                        items.retain(|existing| existing != item);
                    }
                }
            }
            operator if operator.starts_with('$') => {
                return Err(Error::Engine(format!(
                    "unsupported update operator '{operator}'"
                )));
            }
            path => {
                if guard_id(record, path, Some(value))? {
                    set_path(record, path, value.clone())?;
                }
            }
        }
    }
    Ok(())
}

/// Prepares a record for insertion: id, defaults, strict filtering, validation
/// and an initial revision of zero.
pub fn new_record(schema: &Schema, mut record: RawRecord) -> Result<RawRecord> {
    if record.get(ID_KEY).is_none_or(Value::is_null) {
        record.insert(
            ID_KEY.to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
    }
    record_id(&record)?;
    schema.prepare(&mut record);
    record.insert(REVISION_KEY.to_string(), Value::from(0));
    schema.validate(&record)?;
    Ok(record)
}

/// The result of applying `change` to `current`, validated and with its
/// revision bumped by one.
pub fn updated_record(
    schema: &Schema,
    current: &RawRecord,
    change: &RawRecord,
) -> Result<RawRecord> {
    let mut next = current.clone();
    apply_change(&mut next, change)?;
    schema.prepare(&mut next);
    schema.validate(&next)?;
    let revision = current
        .get(REVISION_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(0)
        + 1;
    next.insert(REVISION_KEY.to_string(), Value::from(revision));
    Ok(next)
}

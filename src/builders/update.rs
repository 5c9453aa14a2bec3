//! Update-operator helpers for `edit`, `find_and_edit` and `edit_many`.
//!
//! ```ignore
//! model.edit("some-id", combine([push("tags", "new"), increment("visits", 1)]), EditOptions::default())
//! ```
//!
//! Field names may be dotted paths into nested objects.

use crate::core::merge::deep_merge;
use serde_json::{Value, json};

/// Adds `amount` to a numeric field.
pub fn increment(field: &str, amount: impl Into<Value>) -> Value {
    json!({ "$inc": { field: amount.into() } })
}

/// Appends `value` to an array field.
pub fn push(field: &str, value: impl Into<Value>) -> Value {
    json!({ "$push": { field: value.into() } })
}

/// Removes every element equal to `value` from an array field.
pub fn pull(field: &str, value: impl Into<Value>) -> Value {
    json!({ "$pull": { field: value.into() } })
}

pub fn set(field: &str, value: impl Into<Value>) -> Value {
    json!({ "$set": { field: value.into() } })
}

pub fn unset(field: &str) -> Value {
    json!({ "$unset": { field: "" } })
}

/// Deep-merges several changes into one.
pub fn combine(changes: impl IntoIterator<Item = Value>) -> Value {
    changes.into_iter().fold(json!({}), |mut acc, change| {
        deep_merge(&mut acc, &change);
        acc
    })
}

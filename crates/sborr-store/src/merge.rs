//! List merge rules for push events and local mutations.
//!
//! Local lists are a best-effort mirror of the backend tables. The only
//! uniqueness rule is "insert if the id is not already present"; everything
//! else is last write wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use sborr_core::{Record, Result};

/// Prepend `record` unless an entry with its id exists. Returns whether it was added.
pub fn apply_insert<T: Record>(list: &mut Vec<T>, record: T) -> bool {
    if list.iter().any(|r| r.record_id() == record.record_id()) {
        return false;
    }
    list.insert(0, record);
    true
}

/// Replace the entry with the record's id, or prepend it when absent.
pub fn upsert_front<T: Record>(list: &mut Vec<T>, record: T) {
    match list.iter_mut().find(|r| r.record_id() == record.record_id()) {
        Some(existing) => *existing = record,
        None => list.insert(0, record),
    }
}

/// Replace the entry with the record's id. Returns whether one matched.
pub fn apply_replace<T: Record>(list: &mut [T], record: T) -> bool {
    match list.iter_mut().find(|r| r.record_id() == record.record_id()) {
        Some(existing) => {
            *existing = record;
            true
        }
        None => false,
    }
}

/// Shallow-merge a changed row into the entry with the same id.
///
/// Keys in `patch` overwrite the entry's fields; fields the patch does not
/// carry keep their local values. Returns whether an entry matched.
pub fn apply_update<T>(list: &mut [T], id: Uuid, patch: &JsonValue) -> Result<bool>
where
    T: Record + Serialize + DeserializeOwned,
{
    let Some(existing) = list.iter_mut().find(|r| r.record_id() == id) else {
        return Ok(false);
    };
    let mut merged = serde_json::to_value(&*existing)?;
    shallow_merge(&mut merged, patch);
    *existing = serde_json::from_value(merged)?;
    Ok(true)
}

/// Drop the entry with the given id. Returns whether one was removed.
pub fn apply_delete<T: Record>(list: &mut Vec<T>, id: Uuid) -> bool {
    let before = list.len();
    list.retain(|r| r.record_id() != id);
    list.len() != before
}

/// Overlay the top-level keys of `patch` onto `base`.
pub fn shallow_merge(base: &mut JsonValue, patch: &JsonValue) {
    if let (JsonValue::Object(base), JsonValue::Object(patch)) = (base, patch) {
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
    }
}
